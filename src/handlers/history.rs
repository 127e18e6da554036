//! 투표 기록 조회 핸들러

use crate::error::StoreError;
use crate::session::Poll;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Poll {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::AlreadyExists(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "History request failed");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// 전체 투표 기록 (최신순)
pub async fn list_polls(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Poll>>, ApiError> {
    let polls = state.store.list().await?;
    Ok(Json(polls.iter().map(Poll::public_view).collect()))
}

pub async fn list_active_polls(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Poll>>, ApiError> {
    let polls = state.store.list_active().await?;
    Ok(Json(polls.iter().map(Poll::public_view).collect()))
}

pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Poll>, ApiError> {
    match state.store.get(&poll_id).await? {
        Some(poll) => Ok(Json(poll.public_view())),
        None => Err(ApiError::NotFound(poll_id)),
    }
}
