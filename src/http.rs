//! Plain request/response routes. Thin wrappers over engine state, no
//! state of their own.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::metrics::collect_snapshot;
use crate::rates::derive;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

/// Single snapshot: the latest published sample, or a one-off collection
/// when no tick has completed yet (rates are zero in that case, there is
/// no previous snapshot to diff against).
pub async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(sample) = state.latest_sample() {
        return Json(serde_json::to_value(&*sample).unwrap_or_default()).into_response();
    }
    match collect_snapshot(&state).await {
        Ok(snapshot) => Json(
            serde_json::to_value(derive(None, &snapshot)).unwrap_or_default(),
        )
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "failed to read system counters",
                "details": e.to_string(),
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
    }
}

/// The four rolling history buffers plus the last known full sample, for
/// viewers pre-populating charts.
pub async fn history(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.history.lock().await;
    Json(serde_json::to_value(store.snapshot()).unwrap_or_default())
}
