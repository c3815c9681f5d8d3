use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    config::Config,
    error::AppError,
    models::moderation::{ModerationParams, ModerationQuery},
    store::{CommentStore, PgStore},
};

/// Lists comments across all targets, newest first.
/// Admin only.
pub async fn list_comments(
    State(store): State<Arc<PgStore>>,
    State(config): State<Config>,
    Query(params): Query<ModerationParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = ModerationQuery::from_params(&params, config.moderation_page_size);

    let page = store.moderation_page(&query).await.map_err(|e| {
        tracing::error!("Failed to list comments: {}", e);
        AppError::from(e)
    })?;

    Ok(Json(page))
}

/// Deletes any comment by ID, with its replies.
/// Admin only.
pub async fn delete_comment(
    State(store): State<Arc<PgStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let rows = store.delete(id, None).await.map_err(|e| {
        tracing::error!("Failed to delete comment: {}", e);
        AppError::from(e)
    })?;

    tracing::info!(comment_id = id, rows, "comment removed by moderator");

    Ok(StatusCode::NO_CONTENT)
}
