use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    config::Config,
    engine::load_thread,
    error::AppError,
    models::{
        comment::{CreateCommentRequest, NewComment},
        vote::VoteRequest,
    },
    store::{CommentStore, PgStore, VoteLedger},
    utils::jwt::{Claims, MaybeClaims},
};

/// Get the first page of a target's thread.
/// Anonymous viewers get every vote state as `none`.
pub async fn get_thread(
    State(store): State<Arc<PgStore>>,
    State(config): State<Config>,
    Extension(MaybeClaims(claims)): Extension<MaybeClaims>,
    Path(target_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = claims.as_ref().map(Claims::viewer_id).transpose()?;

    let thread = load_thread(store.as_ref(), &target_id, viewer_id, config.thread_page_size)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load thread {}: {}", target_id, e);
            AppError::from(e)
        })?;

    Ok(Json(thread))
}

/// Create a comment or a reply.
/// Replies must target a top-level comment on the same target.
pub async fn create_comment(
    State(store): State<Arc<PgStore>>,
    Extension(claims): Extension<Claims>,
    Path(target_id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let author_id = claims.viewer_id()?;

    // Bodies are plain text and stored as typed, minus surrounding whitespace.
    let body = payload.body.trim().to_string();

    let comment = store
        .insert(NewComment {
            target_id,
            parent_id: payload.parent_id,
            author_id,
            body,
        })
        .await?;

    tracing::info!(comment_id = comment.id, author_id, "comment created");

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Delete the caller's own comment (replies cascade).
/// Deleting a missing or foreign comment affects nothing and still succeeds.
pub async fn delete_comment(
    State(store): State<Arc<PgStore>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let author_id = claims.viewer_id()?;

    let rows = store.delete(id, Some(author_id)).await?;
    if rows == 0 {
        tracing::debug!(comment_id = id, author_id, "delete matched no owned comment");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Cast a vote. Repeating the current value removes it.
pub async fn vote_comment(
    State(store): State<Arc<PgStore>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = claims.viewer_id()?;

    let outcome = store.cast(viewer_id, id, payload.value).await?;

    Ok(Json(outcome))
}
