//! Chat endpoint.

use axum::Json;
use axum::extract::State;

use crate::dispatch::{AskRequest, AskResponse};
use crate::server::AppState;

/// POST /ask
///
/// Always answers 200 once the body parses; provider and configuration
/// failures are reported in the `response` field.
pub async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Json<AskResponse> {
    Json(state.dispatcher.dispatch(&req).await)
}
