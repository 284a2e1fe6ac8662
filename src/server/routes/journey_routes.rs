//! JSON read endpoints over persisted journeys

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{error_response, ServerAppState};
use crate::storage::journeys;

/// `GET /journeys` — all journeys, most recent first
pub async fn list_journeys_handler(State(state): State<ServerAppState>) -> Response {
    match journeys::list_journeys(state.driver.data_dir()) {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            log::error!("Failed to list journeys: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list journeys")
        }
    }
}

/// `GET /journeys/:journey_id` — one journey with its full step history
pub async fn get_journey_handler(
    State(state): State<ServerAppState>,
    Path(journey_id): Path<String>,
) -> Response {
    if !journeys::journey_exists(state.driver.data_dir(), &journey_id) {
        return error_response(
            StatusCode::NOT_FOUND,
            &format!("Journey '{}' not found", journey_id),
        );
    }
    match journeys::read_journey(state.driver.data_dir(), &journey_id) {
        Ok(file) => Json(file).into_response(),
        Err(e) => {
            log::error!("Failed to read journey '{}': {}", journey_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read journey")
        }
    }
}
