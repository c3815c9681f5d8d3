use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{profile::AuthorProfile, vote::ViewerVoteState};

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub target_id: String,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub body: String,
    pub like_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Insert form for a comment. The store assigns id, timestamps and `like_count = 0`.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub target_id: String,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub body: String,
}

/// DTO for creating a new comment or reply.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(
        length(
            min = 1,
            max = 2000,
            message = "Comment must be between 1 and 2000 characters"
        ),
        custom(function = validate_not_blank)
    )]
    pub body: String,

    /// Optional: the ID of the top-level comment being replied to.
    pub parent_id: Option<i64>,
}

/// Rejects bodies made only of whitespace.
fn validate_not_blank(body: &str) -> Result<(), validator::ValidationError> {
    if body.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Comment cannot be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Identifies a node in a rendered thread.
/// Optimistic replies carry a client-generated key until the store confirms them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CommentKey {
    Saved(i64),
    Pending(Uuid),
}

impl CommentKey {
    pub fn saved(self) -> Option<i64> {
        match self {
            CommentKey::Saved(id) => Some(id),
            CommentKey::Pending(_) => None,
        }
    }
}

/// A comment as rendered for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    pub key: CommentKey,
    pub target_id: String,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub body: String,
    pub like_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub author_profile: Option<AuthorProfile>,
    pub vote_state: ViewerVoteState,

    /// Populated only on top-level nodes, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Wraps a stored comment with its hydrated display data.
    pub fn hydrate(
        comment: Comment,
        author_profile: Option<AuthorProfile>,
        vote_state: ViewerVoteState,
    ) -> Self {
        Self {
            key: CommentKey::Saved(comment.id),
            target_id: comment.target_id,
            parent_id: comment.parent_id,
            author_id: comment.author_id,
            body: comment.body,
            like_count: comment.like_count,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            author_profile,
            vote_state,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.key.saved()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// The full comment tree for one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub target_id: String,

    /// Newest first.
    pub comments: Vec<CommentNode>,
}
