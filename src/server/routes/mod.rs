//! HTTP route handlers
//!
//! - research_routes: the two SSE streaming endpoints (initial prompt and
//!   selection continuation)
//! - journey_routes: plain JSON reads over persisted journeys

pub mod journey_routes;
pub mod research_routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::ServerAppState;

/// JSON error body shared by every route rejection
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
