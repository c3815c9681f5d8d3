// src/models/profile.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Read-only display data for a comment author.
/// Owned by the profile service; this crate never writes the 'profiles' table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub viewer_id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// The identity acting through a thread session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,

    /// Cached profile used to render the viewer's own optimistic replies.
    pub profile: Option<AuthorProfile>,
}

impl Viewer {
    pub fn new(id: i64, profile: Option<AuthorProfile>) -> Self {
        Self { id, profile }
    }
}
