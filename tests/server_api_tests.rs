// HTTP surface tests: requests driven through the router with oneshot,
// no socket bound. Streaming bodies are exercised in the pipeline flow
// tests; here we cover the plain JSON endpoints and the pre-stream
// rejections.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use blueprint_lib::config::AppConfig;
use blueprint_lib::models::{IntentType, Journey};
use blueprint_lib::server::{build_router, ServerAppState};
use blueprint_lib::shutdown::ShutdownState;
use blueprint_lib::storage::journeys;

fn test_state(temp: &TempDir) -> ServerAppState {
    let config = AppConfig {
        data_dir: temp.path().to_path_buf(),
        ..AppConfig::default()
    };
    ServerAppState::new(config, ShutdownState::new())
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = to_bytes(body, 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_version_endpoint() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(Request::get("/api/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["release_url"].as_str().unwrap().contains("releases/tag"));
}

#[tokio::test]
async fn test_list_journeys_empty() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(Request::get("/journeys").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_list_and_get_journeys() {
    let temp = TempDir::new().unwrap();
    let journey = Journey::new(IntentType::Explore, "the crm market");
    journeys::create_journey(temp.path(), &journey).unwrap();

    let app = build_router(test_state(&temp));
    let response = app
        .clone()
        .oneshot(Request::get("/journeys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], journey.id.as_str());

    let response = app
        .oneshot(
            Request::get(format!("/journeys/{}", journey.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["journey"]["id"], journey.id.as_str());
    assert_eq!(json["steps"], serde_json::json!([]));
}

#[tokio::test]
async fn test_get_unknown_journey_is_404() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(
            Request::get("/journeys/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_research_rejects_empty_prompt() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(post_json("/research", r#"{"prompt": "   "}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["error"], "Prompt cannot be empty");
}

#[tokio::test]
async fn test_selection_on_unknown_journey_is_404() {
    let temp = TempDir::new().unwrap();
    let app = build_router(test_state(&temp));

    let response = app
        .oneshot(post_json(
            "/research/ghost/selection",
            r#"{"stepType": "clarify", "answers": []}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_selection_without_awaiting_step_is_409() {
    let temp = TempDir::new().unwrap();
    let journey = Journey::new(IntentType::Build, "a note app");
    journeys::create_journey(temp.path(), &journey).unwrap();

    let app = build_router(test_state(&temp));
    let response = app
        .oneshot(post_json(
            &format!("/research/{}/selection", journey.id),
            r#"{"stepType": "clarify", "answers": []}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response.into_body()).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("no step awaiting selection"));
}
