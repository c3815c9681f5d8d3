use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Query parameters for the moderation listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationParams {
    /// 1-based page number (default: 1).
    pub page: Option<i64>,

    /// Items per page (default from config, max 100).
    pub per_page: Option<i64>,

    /// Case-insensitive substring matched against body, username and display name.
    pub q: Option<String>,
}

/// Normalized moderation query handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationQuery {
    pub page: i64,
    pub per_page: i64,
    pub search: Option<String>,
}

impl ModerationQuery {
    pub fn from_params(params: &ModerationParams, default_per_page: i64) -> Self {
        let search = params
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_owned);

        Self {
            page: params.page.unwrap_or(1).max(1),
            per_page: params.per_page.unwrap_or(default_per_page).clamp(1, 100),
            search,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// One row of the flattened cross-target listing.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ModerationEntry {
    pub id: i64,
    pub target_id: String,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub author_username: Option<String>,
    pub body: String,
    pub like_count: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
