//! In-process backend implementing the full store contract.
//!
//! Used by the engine tests and by embedders that don't run Postgres. Each
//! auxiliary read can be switched to fail so degraded paths can be exercised,
//! and latency can be queued per operation: reads answer with data taken
//! before the delay, writes commit after it.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{CommentStore, ProfileDirectory, StoreError, StoreResult, VoteLedger};
use crate::{
    engine::counter::{apply_delta, resolve_cast, tally_delta},
    models::{
        comment::{Comment, NewComment},
        moderation::{ModerationEntry, ModerationQuery, Page},
        profile::AuthorProfile,
        vote::{ViewerVoteState, VoteOutcome, VoteValue},
    },
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    last_ts: Option<DateTime<Utc>>,
    comments: BTreeMap<i64, Comment>,
    votes: HashMap<(i64, i64), VoteValue>,
    profiles: HashMap<i64, AuthorProfile>,
}

impl Inner {
    /// Strictly increasing timestamps so ordering is total.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_ts {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_ts = Some(ts);
        ts
    }

    fn apply_cast(&mut self, viewer_id: i64, comment_id: i64, value: VoteValue) -> StoreResult<VoteOutcome> {
        if !self.comments.contains_key(&comment_id) {
            return Err(StoreError::NotFound("comment"));
        }
        let key = (viewer_id, comment_id);
        let before = self.votes.get(&key).copied();
        let after = resolve_cast(before, value).resulting();
        match after {
            Some(v) => self.votes.insert(key, v),
            None => self.votes.remove(&key),
        };

        let comment = self
            .comments
            .get_mut(&comment_id)
            .ok_or(StoreError::NotFound("comment"))?;
        comment.like_count = apply_delta(comment.like_count, tally_delta(before, after));

        Ok(VoteOutcome {
            comment_id,
            like_count: comment.like_count,
            state: after.into(),
        })
    }
}

/// Operations that accept queued latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayedOp {
    TopLevel,
    Insert,
    Cast,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    delays: Mutex<HashMap<DelayedOp, VecDeque<Duration>>>,
    fail_top_level: AtomicBool,
    fail_profiles: AtomicBool,
    fail_vote_state: AtomicBool,
    fail_writes: AtomicBool,
    fail_listing: AtomicBool,
    ledger_down: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contract calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn add_profile(&self, profile: AuthorProfile) {
        self.inner.lock().await.profiles.insert(profile.viewer_id, profile);
    }

    /// Inserts a comment without counting a call or applying failure switches.
    pub async fn seed_comment(&self, target_id: &str, parent_id: Option<i64>, author_id: i64, body: &str) -> Comment {
        let mut inner = self.inner.lock().await;
        insert_row(
            &mut inner,
            NewComment {
                target_id: target_id.to_string(),
                parent_id,
                author_id,
                body: body.to_string(),
            },
        )
    }

    pub async fn seed_vote(&self, viewer_id: i64, comment_id: i64, value: VoteValue) -> StoreResult<VoteOutcome> {
        self.inner.lock().await.apply_cast(viewer_id, comment_id, value)
    }

    pub async fn comment_count(&self) -> usize {
        self.inner.lock().await.comments.len()
    }

    /// Delays the next call of `op` by `delay`.
    pub async fn queue_delay(&self, op: DelayedOp, delay: Duration) {
        self.delays.lock().await.entry(op).or_default().push_back(delay);
    }

    /// Changes a comment's author behind the engine's back.
    pub async fn reassign_author(&self, comment_id: i64, author_id: i64) {
        if let Some(comment) = self.inner.lock().await.comments.get_mut(&comment_id) {
            comment.author_id = author_id;
        }
    }

    async fn latency(&self, op: DelayedOp) {
        let delay = self
            .delays
            .lock()
            .await
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_top_level(&self, fail: bool) {
        self.fail_top_level.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profiles(&self, fail: bool) {
        self.fail_profiles.store(fail, Ordering::SeqCst);
    }

    pub fn fail_vote_state(&self, fail: bool) {
        self.fail_vote_state.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Makes every ledger call report the ledger as unreachable.
    pub fn set_ledger_down(&self, down: bool) {
        self.ledger_down.store(down, Ordering::SeqCst);
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{what} offline")));
        }
        Ok(())
    }
}

fn insert_row(inner: &mut Inner, new: NewComment) -> Comment {
    inner.next_id += 1;
    let ts = inner.tick();
    let comment = Comment {
        id: inner.next_id,
        target_id: new.target_id,
        parent_id: new.parent_id,
        author_id: new.author_id,
        body: new.body,
        like_count: 0,
        created_at: ts,
        updated_at: ts,
    };
    inner.comments.insert(comment.id, comment.clone());
    comment
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn top_level(&self, target_id: &str, limit: i64) -> StoreResult<Vec<Comment>> {
        self.record_call();
        Self::check(&self.fail_top_level, "comments")?;

        let mut rows: Vec<Comment> = {
            let inner = self.inner.lock().await;
            inner
                .comments
                .values()
                .filter(|c| c.target_id == target_id && c.parent_id.is_none())
                .cloned()
                .collect()
        };
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));

        self.latency(DelayedOp::TopLevel).await;
        Ok(rows)
    }

    async fn replies(&self, parent_id: i64) -> StoreResult<Vec<Comment>> {
        self.record_call();
        let inner = self.inner.lock().await;
        let mut rows: Vec<Comment> = inner
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        self.record_call();
        Ok(self.inner.lock().await.comments.get(&id).cloned())
    }

    async fn insert(&self, new: NewComment) -> StoreResult<Comment> {
        self.record_call();
        self.latency(DelayedOp::Insert).await;
        Self::check(&self.fail_writes, "writes")?;

        let mut inner = self.inner.lock().await;
        if let Some(parent_id) = new.parent_id {
            let parent = inner
                .comments
                .get(&parent_id)
                .ok_or(StoreError::NotFound("parent comment"))?;
            if parent.target_id != new.target_id {
                return Err(StoreError::InvalidParent("parent belongs to another target".into()));
            }
            if !parent.is_top_level() {
                return Err(StoreError::InvalidParent("replies cannot be nested".into()));
            }
        }
        Ok(insert_row(&mut inner, new))
    }

    async fn delete(&self, id: i64, author_id: Option<i64>) -> StoreResult<u64> {
        self.record_call();
        Self::check(&self.fail_writes, "writes")?;

        let mut inner = self.inner.lock().await;
        let owned = inner
            .comments
            .get(&id)
            .is_some_and(|c| author_id.is_none_or(|author| c.author_id == author));
        if !owned {
            return Ok(0);
        }

        let doomed: Vec<i64> = inner
            .comments
            .values()
            .filter(|c| c.id == id || c.parent_id == Some(id))
            .map(|c| c.id)
            .collect();
        for comment_id in &doomed {
            inner.comments.remove(comment_id);
        }
        inner.votes.retain(|(_, comment_id), _| !doomed.contains(comment_id));
        Ok(doomed.len() as u64)
    }

    async fn adjust_like_count(&self, id: i64, delta: i32) -> StoreResult<i32> {
        self.record_call();
        Self::check(&self.fail_writes, "writes")?;

        let mut inner = self.inner.lock().await;
        let comment = inner.comments.get_mut(&id).ok_or(StoreError::NotFound("comment"))?;
        comment.like_count = apply_delta(comment.like_count, delta);
        Ok(comment.like_count)
    }

    async fn moderation_page(&self, query: &ModerationQuery) -> StoreResult<Page<ModerationEntry>> {
        self.record_call();
        Self::check(&self.fail_listing, "moderation listing")?;
        let inner = self.inner.lock().await;
        let needle = query.search.as_deref().map(str::to_lowercase);

        let mut matching: Vec<ModerationEntry> = inner
            .comments
            .values()
            .filter_map(|c| {
                let profile = inner.profiles.get(&c.author_id);
                if let Some(needle) = &needle {
                    let hit = c.body.to_lowercase().contains(needle.as_str())
                        || profile.is_some_and(|p| {
                            p.username.to_lowercase().contains(needle.as_str())
                                || p
                                    .display_name
                                    .as_deref()
                                    .is_some_and(|d| d.to_lowercase().contains(needle.as_str()))
                        });
                    if !hit {
                        return None;
                    }
                }
                Some(ModerationEntry {
                    id: c.id,
                    target_id: c.target_id.clone(),
                    parent_id: c.parent_id,
                    author_id: c.author_id,
                    author_username: profile.map(|p| p.username.clone()),
                    body: c.body.clone(),
                    like_count: c.like_count,
                    created_at: c.created_at,
                })
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(0))
            .take(usize::try_from(query.per_page).unwrap_or(0))
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page,
            per_page: query.per_page,
        })
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn profile(&self, viewer_id: i64) -> StoreResult<Option<AuthorProfile>> {
        self.record_call();
        Self::check(&self.fail_profiles, "profiles")?;
        Ok(self.inner.lock().await.profiles.get(&viewer_id).cloned())
    }
}

#[async_trait]
impl VoteLedger for MemoryStore {
    async fn vote_state(&self, viewer_id: i64, comment_id: i64) -> StoreResult<ViewerVoteState> {
        self.record_call();
        Self::check(&self.ledger_down, "vote ledger")?;
        Self::check(&self.fail_vote_state, "vote ledger")?;
        let inner = self.inner.lock().await;
        Ok(inner.votes.get(&(viewer_id, comment_id)).copied().into())
    }

    async fn cast(&self, viewer_id: i64, comment_id: i64, value: VoteValue) -> StoreResult<VoteOutcome> {
        self.record_call();
        self.latency(DelayedOp::Cast).await;
        Self::check(&self.ledger_down, "vote ledger")?;
        self.inner.lock().await.apply_cast(viewer_id, comment_id, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_vote_toggles_off() {
        let store = MemoryStore::new();
        let c = store.seed_comment("v1", None, 1, "hi").await;

        let first = store.cast(2, c.id, VoteValue::Like).await.unwrap();
        assert_eq!(first.like_count, 1);
        assert_eq!(first.state, ViewerVoteState::Liked);

        let second = store.cast(2, c.id, VoteValue::Like).await.unwrap();
        assert_eq!(second.like_count, 0);
        assert_eq!(second.state, ViewerVoteState::None);
    }

    #[tokio::test]
    async fn scoped_delete_ignores_foreign_comments() {
        let store = MemoryStore::new();
        let top = store.seed_comment("v1", None, 1, "top").await;
        store.seed_comment("v1", Some(top.id), 2, "reply").await;

        assert_eq!(store.delete(top.id, Some(2)).await.unwrap(), 0);
        assert_eq!(store.delete(top.id, Some(1)).await.unwrap(), 2);
        assert_eq!(store.delete(top.id, Some(1)).await.unwrap(), 0);
        assert_eq!(store.comment_count().await, 0);
    }

    #[tokio::test]
    async fn nested_reply_is_rejected() {
        let store = MemoryStore::new();
        let top = store.seed_comment("v1", None, 1, "top").await;
        let reply = store.seed_comment("v1", Some(top.id), 2, "reply").await;

        let err = store
            .insert(NewComment {
                target_id: "v1".into(),
                parent_id: Some(reply.id),
                author_id: 3,
                body: "deeper".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
    }
}
