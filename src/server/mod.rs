//! HTTP/SSE server for the research pipeline
//!
//! Exposes two streaming endpoints (initial research prompt and selection
//! continuation) plus plain JSON reads over persisted journeys.

pub mod routes;
pub mod state;

pub use state::ServerAppState;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue,
    },
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Version information for the server
#[derive(serde::Serialize)]
struct VersionInfo {
    version: String,
    release_url: String,
}

/// Build the application router. Separated from `run_server` so tests can
/// drive it without binding a socket.
pub fn build_router(state: ServerAppState) -> Router {
    // CORS must be the outermost layer so preflight OPTIONS requests are
    // answered before anything else. Explicit headers instead of Any to
    // avoid browser deprecation warnings.
    let cors = match &state.config.cors_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods(Any)
                .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]),
    };

    Router::new()
        .route("/research", post(routes::research_routes::research_handler))
        .route(
            "/research/:journey_id/selection",
            post(routes::research_routes::selection_handler),
        )
        .route("/journeys", get(routes::journey_routes::list_journeys_handler))
        .route(
            "/journeys/:journey_id",
            get(routes::journey_routes::get_journey_handler),
        )
        .route("/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP/SSE server until shutdown is requested
pub async fn run_server(state: ServerAppState) -> Result<(), String> {
    let port = state.config.port;
    let bind = state.config.bind_address.clone();
    let cors_display = match &state.config.cors_origins {
        Some(origins) if !origins.is_empty() => origins.join(", "),
        _ => "*".to_string(),
    };
    let provider_chain = state
        .config
        .providers
        .iter()
        .map(|p| p.id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");

    let shutdown_state = state.shutdown_state.clone();
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Blueprint Research Server                 ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                                                               ║");
    println!("║  Server URL: http://{}:{:<24}  ║", bind, port);
    println!("║                                                               ║");
    println!("║  Providers: {:<48}  ║", provider_chain);
    println!("║  CORS Origins: {:<45}║", cors_display);
    println!("║                                                               ║");
    println!("║  Endpoints:                                                   ║");
    println!("║    POST /research                      - Start research (SSE) ║");
    println!("║    POST /research/:id/selection        - Continue (SSE)       ║");
    println!("║    GET  /journeys                      - List journeys        ║");
    println!("║    GET  /journeys/:id                  - Journey detail       ║");
    println!("║    GET  /api/version                   - Server version       ║");
    println!("║    GET  /health                        - Health check         ║");
    println!("║                                                               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("Server listening on http://{}", addr);

    // Shutdown signal polls the shared flag set by the signal handlers
    let shutdown_signal = async move {
        loop {
            if shutdown_state.is_shutdown_requested() {
                log::info!("Shutdown signal received, stopping server...");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Version endpoint - returns server version and release URL
async fn version_handler() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        release_url: format!(
            "https://github.com/blueprint-research/blueprint-server/releases/tag/v{}",
            env!("CARGO_PKG_VERSION")
        ),
    })
}
