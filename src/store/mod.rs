//! Persistence contracts consumed by the thread engine and the HTTP handlers.
//!
//! The store is authoritative for comments, profiles and votes. Implementations
//! keep `Comment::like_count` equal to the number of `Like` records on the
//! comment, whichever client issued the votes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{
    comment::{Comment, NewComment},
    moderation::{ModerationEntry, ModerationQuery, Page},
    profile::AuthorProfile,
    vote::{ViewerVoteState, VoteOutcome, VoteValue},
};

pub use memory::{DelayedOp, MemoryStore};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid parent comment: {0}")]
    InvalidParent(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("row"),
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Comment rows and the counter they carry.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// First page of top-level comments on a target, newest first.
    async fn top_level(&self, target_id: &str, limit: i64) -> StoreResult<Vec<Comment>>;

    /// Replies to one top-level comment, oldest first.
    async fn replies(&self, parent_id: i64) -> StoreResult<Vec<Comment>>;

    async fn comment(&self, id: i64) -> StoreResult<Option<Comment>>;

    /// Inserts a comment. A parent must exist on the same target and be top-level.
    async fn insert(&self, new: NewComment) -> StoreResult<Comment>;

    /// Deletes a comment and, for a top-level comment, all its replies.
    ///
    /// With `author_id` set, only a comment owned by that author is affected.
    /// Returns the number of comments removed; `0` is not an error.
    async fn delete(&self, id: i64, author_id: Option<i64>) -> StoreResult<u64>;

    /// Adds `delta` to the cached counter directly, floored at zero.
    /// Used only when the vote ledger cannot be reached.
    async fn adjust_like_count(&self, id: i64, delta: i32) -> StoreResult<i32>;

    /// Flattened cross-target listing, newest first.
    async fn moderation_page(&self, query: &ModerationQuery) -> StoreResult<Page<ModerationEntry>>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, viewer_id: i64) -> StoreResult<Option<AuthorProfile>>;
}

/// Authoritative per-(viewer, comment) vote records.
#[async_trait]
pub trait VoteLedger: Send + Sync {
    async fn vote_state(&self, viewer_id: i64, comment_id: i64) -> StoreResult<ViewerVoteState>;

    /// Compare-and-swap keyed by the requested value: no record inserts,
    /// the opposite value updates, the same value removes the record.
    async fn cast(
        &self,
        viewer_id: i64,
        comment_id: i64,
        value: VoteValue,
    ) -> StoreResult<VoteOutcome>;
}

/// Everything a thread session talks to.
pub trait Backend: CommentStore + ProfileDirectory + VoteLedger {}

impl<T> Backend for T where T: CommentStore + ProfileDirectory + VoteLedger {}
