//! SSE streaming endpoints for the research pipeline
//!
//! Both endpoints follow the same shape: validate the request while a plain
//! HTTP response is still possible, claim the run slot, then hand a channel
//! to the driver on a spawned task and return the receiving side as an SSE
//! stream. Conflicts and unknown journeys never open a stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::{error_response, ServerAppState};
use crate::events::ResearchEvent;
use crate::models::{ResearchRequest, SelectionRequest};
use crate::pipeline::SelectionRejection;

/// Events buffered between the driver and a slow client
const STREAM_BUFFER: usize = 32;

/// `POST /research` — classify a prompt and drive it to its first
/// suspension (or inline answer)
pub async fn research_handler(
    State(state): State<ServerAppState>,
    Json(request): Json<ResearchRequest>,
) -> Response {
    let prompt = request.prompt.trim().to_string();
    if prompt.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Prompt cannot be empty");
    }

    let Some(token) = state.driver.try_begin_prompt(&prompt) else {
        return error_response(
            StatusCode::CONFLICT,
            "An identical research request is already running",
        );
    };

    log::info!("Starting research stream for prompt ({} chars)", prompt.len());
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let driver = Arc::clone(&state.driver);
    tokio::spawn(async move {
        let _token = token;
        driver.run_research(prompt, tx).await;
    });

    sse_response(rx)
}

/// `POST /research/:journey_id/selection` — apply a selection to the
/// journey's awaiting step and drive it to its next suspension
pub async fn selection_handler(
    State(state): State<ServerAppState>,
    Path(journey_id): Path<String>,
    Json(request): Json<SelectionRequest>,
) -> Response {
    match state.driver.prepare_selection(&journey_id, request.step_type) {
        Ok(()) => {}
        Err(SelectionRejection::NotFound(message)) => {
            return error_response(StatusCode::NOT_FOUND, &message);
        }
        Err(SelectionRejection::Conflict(message)) => {
            return error_response(StatusCode::CONFLICT, &message);
        }
    }

    let Some(token) = state.driver.try_begin_journey(&journey_id) else {
        return error_response(
            StatusCode::CONFLICT,
            &format!("Journey '{}' already has a stream running", journey_id),
        );
    };

    log::info!(
        "Continuing journey {} with a '{}' selection",
        journey_id,
        request.step_type
    );
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let driver = Arc::clone(&state.driver);
    tokio::spawn(async move {
        let _token = token;
        driver.run_selection(journey_id, request, tx).await;
    });

    sse_response(rx)
}

/// Wrap a driver event channel as an SSE response. Each event is one data
/// frame carrying the JSON payload; the SSE event name mirrors the payload
/// type tag.
fn sse_response(rx: mpsc::Receiver<ResearchEvent>) -> Response {
    let stream = ReceiverStream::new(rx).map(|event| -> Result<Event, Infallible> {
        let name = event.event_type();
        match Event::default().event(name).json_data(&event) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                // Serialization of our own event types cannot ordinarily
                // fail; degrade to a bare comment frame rather than killing
                // the stream mid-journey
                log::error!("Failed to serialize '{}' event: {}", name, e);
                Ok(Event::default().comment("event serialization failed"))
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}
