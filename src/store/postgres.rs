//! Postgres backend. Schema lives in `migrations/`; the like counter is
//! maintained by the `comment_votes_tally` trigger.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{CommentStore, ProfileDirectory, StoreError, StoreResult, VoteLedger};
use crate::{
    engine::counter::{CastResolution, resolve_cast},
    models::{
        comment::{Comment, NewComment},
        moderation::{ModerationEntry, ModerationQuery, Page},
        profile::AuthorProfile,
        vote::{ViewerVoteState, VoteOutcome, VoteValue},
    },
};

/// Attempts before a racing first vote gives up.
const CAST_ATTEMPTS: usize = 3;

const COMMENT_COLUMNS: &str =
    "id, target_id, parent_id, author_id, body, like_count, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stored_vote(
        tx: &mut Transaction<'_, Postgres>,
        viewer_id: i64,
        comment_id: i64,
    ) -> StoreResult<Option<VoteValue>> {
        let raw: Option<i16> = sqlx::query_scalar(
            "SELECT value FROM comment_votes WHERE viewer_id = $1 AND comment_id = $2 FOR UPDATE",
        )
        .bind(viewer_id)
        .bind(comment_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(raw.and_then(VoteValue::from_i16))
    }

    /// One compare-and-swap attempt. `Ok(None)` means a concurrent insert won the race.
    async fn try_cast(&self, viewer_id: i64, comment_id: i64, value: VoteValue) -> StoreResult<Option<VoteOutcome>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound("comment"));
        }

        let existing = Self::stored_vote(&mut tx, viewer_id, comment_id).await?;
        let resolution = resolve_cast(existing, value);
        match resolution {
            CastResolution::Insert(v) => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO comment_votes (viewer_id, comment_id, value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (viewer_id, comment_id) DO NOTHING
                    "#,
                )
                .bind(viewer_id)
                .bind(comment_id)
                .bind(v.as_i16())
                .execute(&mut *tx)
                .await
                .map_err(map_foreign_key)?;
                if inserted.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Ok(None);
                }
            }
            CastResolution::Update(v) => {
                sqlx::query("UPDATE comment_votes SET value = $3 WHERE viewer_id = $1 AND comment_id = $2")
                    .bind(viewer_id)
                    .bind(comment_id)
                    .bind(v.as_i16())
                    .execute(&mut *tx)
                    .await?;
            }
            CastResolution::Remove => {
                sqlx::query("DELETE FROM comment_votes WHERE viewer_id = $1 AND comment_id = $2")
                    .bind(viewer_id)
                    .bind(comment_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let like_count: i32 = sqlx::query_scalar("SELECT like_count FROM comments WHERE id = $1")
            .bind(comment_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(VoteOutcome {
            comment_id,
            like_count,
            state: resolution.resulting().into(),
        }))
    }
}

/// A vote racing a comment delete hits the foreign key.
fn map_foreign_key(err: sqlx::Error) -> StoreError {
    let is_fk = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503");
    if is_fk {
        StoreError::NotFound("comment")
    } else {
        StoreError::from(err)
    }
}

/// Escapes LIKE metacharacters and wraps the needle for substring matching.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl CommentStore for PgStore {
    async fn top_level(&self, target_id: &str, limit: i64) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE target_id = $1 AND parent_id IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(target_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replies(&self, parent_id: i64) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, Comment>(&format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE parent_id = $1
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        let row = sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, new: NewComment) -> StoreResult<Comment> {
        let mut tx = self.pool.begin().await?;

        if let Some(pid) = new.parent_id {
            let parent = sqlx::query_as::<_, (String, Option<i64>)>(
                "SELECT target_id, parent_id FROM comments WHERE id = $1",
            )
            .bind(pid)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("parent comment"))?;

            if parent.0 != new.target_id {
                return Err(StoreError::InvalidParent(
                    "parent belongs to another target".to_string(),
                ));
            }
            if parent.1.is_some() {
                return Err(StoreError::InvalidParent(
                    "replies cannot be nested".to_string(),
                ));
            }
        }

        let comment = sqlx::query_as::<_, Comment>(&format!(
            r#"
            INSERT INTO comments (target_id, parent_id, author_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(&new.target_id)
        .bind(new.parent_id)
        .bind(new.author_id)
        .bind(&new.body)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert comment: {:?}", e);
            StoreError::from(e)
        })?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn delete(&self, id: i64, author_id: Option<i64>) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let replies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        // Replies go with their parent through ON DELETE CASCADE.
        let result = sqlx::query(
            "DELETE FROM comments WHERE id = $1 AND ($2::BIGINT IS NULL OR author_id = $2)",
        )
        .bind(id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Ok(0);
        }
        Ok(result.rows_affected() + replies.max(0) as u64)
    }

    async fn adjust_like_count(&self, id: i64, delta: i32) -> StoreResult<i32> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE comments SET like_count = GREATEST(0, like_count + $2) WHERE id = $1 RETURNING like_count",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("comment"))
    }

    async fn moderation_page(&self, query: &ModerationQuery) -> StoreResult<Page<ModerationEntry>> {
        let pattern = query.search.as_deref().map(like_pattern);

        let filter = r#"
            FROM comments c
            LEFT JOIN profiles p ON p.viewer_id = c.author_id
            WHERE ($1::TEXT IS NULL
                OR c.body ILIKE $1
                OR p.username ILIKE $1
                OR p.display_name ILIKE $1)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, ModerationEntry>(&format!(
            r#"
            SELECT
                c.id, c.target_id, c.parent_id, c.author_id,
                p.username AS author_username,
                c.body, c.like_count, c.created_at
            {filter}
            ORDER BY c.created_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(pattern.as_deref())
        .bind(query.per_page)
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }
}

#[async_trait]
impl ProfileDirectory for PgStore {
    async fn profile(&self, viewer_id: i64) -> StoreResult<Option<AuthorProfile>> {
        let profile = sqlx::query_as::<_, AuthorProfile>(
            "SELECT viewer_id, username, display_name, avatar_url FROM profiles WHERE viewer_id = $1",
        )
        .bind(viewer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[async_trait]
impl VoteLedger for PgStore {
    async fn vote_state(&self, viewer_id: i64, comment_id: i64) -> StoreResult<ViewerVoteState> {
        let raw: Option<i16> = sqlx::query_scalar(
            "SELECT value FROM comment_votes WHERE viewer_id = $1 AND comment_id = $2",
        )
        .bind(viewer_id)
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(raw.and_then(VoteValue::from_i16).into())
    }

    async fn cast(&self, viewer_id: i64, comment_id: i64, value: VoteValue) -> StoreResult<VoteOutcome> {
        for attempt in 1..=CAST_ATTEMPTS {
            if let Some(outcome) = self.try_cast(viewer_id, comment_id, value).await? {
                return Ok(outcome);
            }
            tracing::debug!(viewer_id, comment_id, attempt, "vote insert raced, retrying");
        }
        Err(StoreError::Conflict(
            "vote ledger contention did not settle".to_string(),
        ))
    }
}
