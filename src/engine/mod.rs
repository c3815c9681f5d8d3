//! Client-side thread state: loading, optimistic writes and reconciliation.

pub mod counter;
pub mod loader;
pub mod moderation;
pub mod notify;
pub mod session;
mod tree;

use crate::store::StoreError;

pub use loader::load_thread;
pub use moderation::ModerationView;
pub use notify::{Notice, Notifier, RecordingNotifier};
pub use session::ThreadSession;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("viewer is not signed in")]
    Unauthenticated,

    #[error("comment body is empty")]
    EmptyBody,

    #[error("thread is not loaded")]
    NotLoaded,

    #[error("comment {0} is not in this thread")]
    UnknownComment(i64),

    #[error("comment {0} is a reply and cannot be replied to")]
    NestedReply(i64),

    #[error("comment {0} belongs to another author")]
    NotOwner(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for errors raised before any remote call.
    pub fn is_validation(&self) -> bool {
        !matches!(self, EngineError::Store(_))
    }
}
