use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::{AppState, store::StorePath};

use super::ApiError;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // a cheap read proves the store answers
    let reachable = match StorePath::root("health") {
        Ok(p) => state.store.read(&p).await.map(|_| ()),
        Err(e) => Err(e),
    };

    match reachable {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", "No such route.")
}
