//! Progress events pushed by the job engine.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use dlsync_core::JobUpdate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::metrics::EVENTS_RECEIVED;
use crate::state::AppState;

use super::jobs::ErrorResponse;

/// A single update or a batch of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventsBody {
    Batch(Vec<JobUpdate>),
    Single(JobUpdate),
}

impl EventsBody {
    fn into_updates(self) -> Vec<JobUpdate> {
        match self {
            EventsBody::Batch(updates) => updates,
            EventsBody::Single(update) => vec![update],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub accepted: usize,
}

/// Queue engine updates for aggregation.
///
/// Updates are accepted before they reach the job table; unknown job IDs are
/// dropped when the aggregator flushes.
pub async fn post_events(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EventsBody>,
) -> impl IntoResponse {
    let updates = body.into_updates();

    if updates.iter().any(|u| u.id.trim().is_empty()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "every update needs a job id".to_string(),
            }),
        )
            .into_response();
    }

    let accepted = updates.len();
    EVENTS_RECEIVED.inc_by(accepted as u64);
    debug!(count = accepted, "Received job events");
    state.manager().ingest_batch(updates);

    (StatusCode::ACCEPTED, Json(EventsResponse { accepted })).into_response()
}
