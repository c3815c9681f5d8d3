//! Mutation engine for one target's thread.
//!
//! Every write runs in two phases: the in-memory tree is transformed under the
//! session lock, the lock is released, and the remote call runs. When the call
//! settles the engine either reconciles with the store or rolls back what it
//! can identify.
//!
//! Reads carry tickets from a single counter. A thread load is applied only if
//! no newer load started after it, and a load never overwrites per-comment
//! state that is fresher than its own ticket.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    EngineError,
    counter::{next_like_count, optimistic_state},
    loader::load_thread,
    notify::{Notice, Notifier},
};
use crate::{
    models::{
        comment::{CommentKey, CommentNode, NewComment, Thread},
        profile::Viewer,
        vote::{ViewerVoteState, VoteValue},
    },
    store::{Backend, StoreError},
};

/// Freshness of state whose remote call has not settled yet.
const IN_FLIGHT: u64 = u64::MAX;

#[derive(Default)]
struct SessionState {
    thread: Option<Thread>,
    next_ticket: u64,
    latest_load: u64,
    applied_load: u64,
    dirty: bool,

    /// Optimistic replies awaiting the store, re-attached across reloads.
    pending: HashMap<Uuid, CommentNode>,
    /// Replies the store confirmed, with the ticket taken at confirmation.
    confirmed: HashMap<i64, (u64, CommentNode)>,
    /// Deleted comments, with the ticket taken once the delete committed.
    removed: HashMap<i64, u64>,
    /// Ticket of the last reconciled vote state per comment.
    vote_fresh: HashMap<i64, u64>,
    votes_in_flight: HashMap<i64, u32>,
}

impl SessionState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn vote_freshness(&self, id: i64) -> u64 {
        if self.votes_in_flight.get(&id).is_some_and(|n| *n > 0) {
            return IN_FLIGHT;
        }
        self.vote_fresh.get(&id).copied().unwrap_or(0)
    }

    fn apply_load(&mut self, ticket: u64, mut fresh: Thread) {
        for (&id, &at) in &self.removed {
            if at > ticket {
                fresh.remove(CommentKey::Saved(id));
            }
        }

        if let Some(old) = self.thread.take() {
            fresh.for_each_mut(|node| {
                let Some(id) = node.id() else { return };
                if self.vote_freshness(id) > ticket {
                    if let Some(prev) = old.get(id) {
                        node.like_count = prev.like_count;
                        node.vote_state = prev.vote_state;
                    }
                }
            });
        }

        for (&id, (at, node)) in &self.confirmed {
            if *at > ticket && fresh.get(id).is_none() && !self.removed.contains_key(&id) {
                if let Some(parent_id) = node.parent_id {
                    fresh.push_reply(parent_id, node.clone());
                }
            }
        }
        for node in self.pending.values() {
            if let Some(parent_id) = node.parent_id {
                fresh.push_reply(parent_id, node.clone());
            }
        }

        self.removed.retain(|_, at| *at > ticket);
        self.confirmed.retain(|_, (at, _)| *at > ticket);
        self.vote_fresh.retain(|_, at| *at > ticket);

        self.thread = Some(fresh);
        self.applied_load = ticket;
        self.dirty = false;
    }
}

/// Thread state for one target as seen by one viewer.
pub struct ThreadSession<B: ?Sized> {
    backend: Arc<B>,
    notifier: Arc<dyn Notifier>,
    viewer: Option<Viewer>,
    target_id: String,
    page_size: i64,
    state: Mutex<SessionState>,
}

impl<B> ThreadSession<B>
where
    B: Backend + ?Sized,
{
    pub fn new(
        backend: Arc<B>,
        notifier: Arc<dyn Notifier>,
        viewer: Option<Viewer>,
        target_id: impl Into<String>,
        page_size: i64,
    ) -> Self {
        Self {
            backend,
            notifier,
            viewer,
            target_id: target_id.into(),
            page_size,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    /// Snapshot of the rendered thread. `None` before the first load and after a failed one.
    pub async fn thread(&self) -> Option<Thread> {
        self.state.lock().await.thread.clone()
    }

    /// Set when a write failed in a way only a reload can repair.
    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Whether the delete affordance should be offered for a comment.
    pub async fn can_delete(&self, comment_id: i64) -> bool {
        let Some(viewer) = &self.viewer else {
            return false;
        };
        let state = self.state.lock().await;
        state
            .thread
            .as_ref()
            .and_then(|t| t.get(comment_id))
            .is_some_and(|c| c.author_id == viewer.id)
    }

    /// Loads (or reloads) the thread from the store; this is full reconciliation.
    pub async fn reload(&self) -> Result<(), EngineError> {
        let ticket = {
            let mut state = self.state.lock().await;
            let ticket = state.ticket();
            state.latest_load = ticket;
            ticket
        };

        let result = load_thread(
            &*self.backend,
            &self.target_id,
            self.viewer.as_ref().map(|v| v.id),
            self.page_size,
        )
        .await;

        let mut state = self.state.lock().await;
        if ticket != state.latest_load {
            tracing::debug!(ticket, latest = state.latest_load, "discarding stale thread load");
            return Ok(());
        }

        match result {
            Ok(thread) => {
                state.apply_load(ticket, thread);
                Ok(())
            }
            Err(e) => {
                tracing::error!(target_id = %self.target_id, "failed to load comments: {}", e);
                state.thread = None;
                drop(state);
                self.notifier.notify(Notice::FailedToLoadComments);
                Err(e.into())
            }
        }
    }

    pub async fn create_top_level(&self, body: &str) -> Result<(), EngineError> {
        let viewer = self.require_viewer(Notice::SignInToComment)?;
        let body = self.require_body(body)?;

        let inserted = self
            .backend
            .insert(NewComment {
                target_id: self.target_id.clone(),
                parent_id: None,
                author_id: viewer.id,
                body,
            })
            .await;

        match inserted {
            Ok(comment) => {
                tracing::info!(comment_id = comment.id, target_id = %self.target_id, "comment created");
                self.reload().await
            }
            Err(e) => {
                tracing::error!(target_id = %self.target_id, "failed to create comment: {}", e);
                self.notifier.notify(Notice::FailedToPostComment);
                Err(e.into())
            }
        }
    }

    /// Adds a reply optimistically and returns the key it ends up under.
    pub async fn create_reply(&self, parent_id: i64, body: &str) -> Result<CommentKey, EngineError> {
        let viewer = self.require_viewer(Notice::SignInToComment)?;
        let body = self.require_body(body)?;

        let temp = Uuid::new_v4();
        {
            let mut state = self.state.lock().await;
            let thread = state.thread.as_mut().ok_or(EngineError::NotLoaded)?;
            match thread.get(parent_id).map(CommentNode::is_top_level) {
                None => {
                    self.notifier.notify(Notice::UnknownComment);
                    return Err(EngineError::UnknownComment(parent_id));
                }
                Some(false) => {
                    self.notifier.notify(Notice::ReplyNotAllowed);
                    return Err(EngineError::NestedReply(parent_id));
                }
                Some(true) => {}
            }

            // Pending replies always render last under their parent.
            let now = thread
                .get(parent_id)
                .and_then(|p| p.replies.last())
                .map_or_else(Utc::now, |last| last.created_at.max(Utc::now()));
            let node = CommentNode {
                key: CommentKey::Pending(temp),
                target_id: self.target_id.clone(),
                parent_id: Some(parent_id),
                author_id: viewer.id,
                body: body.clone(),
                like_count: 0,
                created_at: now,
                updated_at: now,
                author_profile: viewer.profile.clone(),
                vote_state: ViewerVoteState::None,
                replies: Vec::new(),
            };
            thread.push_reply(parent_id, node.clone());
            state.pending.insert(temp, node);
        }

        let inserted = self
            .backend
            .insert(NewComment {
                target_id: self.target_id.clone(),
                parent_id: Some(parent_id),
                author_id: viewer.id,
                body,
            })
            .await;

        let mut state = self.state.lock().await;
        state.pending.remove(&temp);
        match inserted {
            Ok(comment) => {
                let id = comment.id;
                let node = CommentNode::hydrate(comment, viewer.profile.clone(), ViewerVoteState::None);
                if let Some(thread) = state.thread.as_mut() {
                    if !thread.replace_pending(temp, node.clone()) && thread.get(id).is_none() {
                        thread.push_reply(parent_id, node.clone());
                    }
                }
                let ticket = state.ticket();
                state.confirmed.insert(id, (ticket, node));
                tracing::info!(comment_id = id, parent_id, "reply created");
                Ok(CommentKey::Saved(id))
            }
            Err(e) => {
                // Only the node inserted above is rolled back.
                if let Some(thread) = state.thread.as_mut() {
                    thread.remove(CommentKey::Pending(temp));
                }
                drop(state);
                tracing::error!(parent_id, "failed to create reply: {}", e);
                self.notifier.notify(Notice::FailedToPostComment);
                Err(e.into())
            }
        }
    }

    /// Removes an owned comment immediately, then deletes it remotely.
    /// Returns the number of nodes removed from the tree.
    pub async fn delete_comment(&self, comment_id: i64) -> Result<usize, EngineError> {
        let viewer = self.require_viewer(Notice::SignInToComment)?;

        let removed = {
            let mut state = self.state.lock().await;
            let thread = state.thread.as_mut().ok_or(EngineError::NotLoaded)?;
            let author_id = match thread.get(comment_id) {
                Some(node) => node.author_id,
                None => {
                    self.notifier.notify(Notice::UnknownComment);
                    return Err(EngineError::UnknownComment(comment_id));
                }
            };
            if author_id != viewer.id {
                self.notifier.notify(Notice::NotYourComment);
                return Err(EngineError::NotOwner(comment_id));
            }
            let removed = thread.remove(CommentKey::Saved(comment_id));
            state.removed.insert(comment_id, IN_FLIGHT);
            // A deleted reply, or any reply under a deleted parent, is never re-attached.
            state
                .confirmed
                .retain(|&id, (_, node)| id != comment_id && node.parent_id != Some(comment_id));
            removed
        };

        match self.backend.delete(comment_id, Some(viewer.id)).await {
            Ok(0) => {
                // Not ours server-side, or already gone: let the store decide.
                self.state.lock().await.removed.remove(&comment_id);
                tracing::warn!(comment_id, "delete affected no rows, reconciling");
                self.reload().await?;
                Ok(removed)
            }
            Ok(rows) => {
                let mut state = self.state.lock().await;
                let ticket = state.ticket();
                state.removed.insert(comment_id, ticket);
                tracing::info!(comment_id, rows, "comment deleted");
                Ok(removed)
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().await;
                    state.removed.remove(&comment_id);
                    state.dirty = true;
                }
                tracing::error!(comment_id, "failed to delete comment: {}", e);
                self.notifier.notify(Notice::FailedToDeleteComment);
                Err(e.into())
            }
        }
    }

    /// Votes optimistically, commits to the ledger, then reconciles the comment.
    pub async fn vote(&self, comment_id: i64, liking: bool) -> Result<(), EngineError> {
        let viewer = self.require_viewer(Notice::SignInToVote)?;
        let action = VoteValue::from_liking(liking);

        let delta = {
            let mut state = self.state.lock().await;
            let thread = state.thread.as_mut().ok_or(EngineError::NotLoaded)?;
            let Some(node) = thread.get_mut(comment_id) else {
                self.notifier.notify(Notice::UnknownComment);
                return Err(EngineError::UnknownComment(comment_id));
            };
            let before = node.like_count;
            node.like_count = next_like_count(node.vote_state, action, before);
            node.vote_state = optimistic_state(action);
            let delta = node.like_count - before;
            *state.votes_in_flight.entry(comment_id).or_default() += 1;
            delta
        };

        let committed = match self.backend.cast(viewer.id, comment_id, action).await {
            Ok(outcome) => {
                tracing::debug!(comment_id, like_count = outcome.like_count, "vote committed");
                Ok(())
            }
            Err(StoreError::Unavailable(reason)) => {
                tracing::warn!(
                    comment_id,
                    delta,
                    "vote ledger unavailable, adjusting counter directly: {}",
                    reason
                );
                self.backend
                    .adjust_like_count(comment_id, delta)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        };

        {
            let mut state = self.state.lock().await;
            if let Some(n) = state.votes_in_flight.get_mut(&comment_id) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    state.votes_in_flight.remove(&comment_id);
                }
            }
            if committed.is_err() {
                state.dirty = true;
            }
        }

        match committed {
            Ok(()) => {
                self.reconcile_comment(comment_id).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!(comment_id, "failed to vote: {}", e);
                self.notifier.notify(Notice::FailedToVote);
                Err(e.into())
            }
        }
    }

    /// Overwrites one comment's counter and vote state with store truth.
    async fn reconcile_comment(&self, comment_id: i64) {
        let ticket = self.state.lock().await.ticket();

        let viewer_id = self.viewer.as_ref().map(|v| v.id);
        let (comment, vote_state) = futures::join!(self.backend.comment(comment_id), async {
            match viewer_id {
                Some(viewer_id) => Some(self.backend.vote_state(viewer_id, comment_id).await),
                None => None,
            }
        });

        let mut state = self.state.lock().await;
        let comment = match comment {
            Ok(comment) => comment,
            Err(e) => {
                tracing::warn!(comment_id, "reconciliation read failed: {}", e);
                state.dirty = true;
                return;
            }
        };

        let stale = state.vote_freshness(comment_id) > ticket || state.applied_load > ticket;
        if stale {
            tracing::debug!(comment_id, ticket, "skipping superseded reconciliation");
            return;
        }

        let Some(thread) = state.thread.as_mut() else {
            return;
        };
        match comment {
            None => {
                thread.remove(CommentKey::Saved(comment_id));
            }
            Some(comment) => {
                if let Some(node) = thread.get_mut(comment_id) {
                    node.like_count = comment.like_count;
                    match vote_state {
                        Some(Ok(vote)) => node.vote_state = vote,
                        Some(Err(e)) => {
                            tracing::warn!(comment_id, "vote state unavailable during reconciliation: {}", e);
                        }
                        None => node.vote_state = ViewerVoteState::None,
                    }
                }
            }
        }
        state.vote_fresh.insert(comment_id, ticket);
    }

    fn require_viewer(&self, notice: Notice) -> Result<&Viewer, EngineError> {
        match &self.viewer {
            Some(viewer) => Ok(viewer),
            None => {
                self.notifier.notify(notice);
                Err(EngineError::Unauthenticated)
            }
        }
    }

    fn require_body(&self, body: &str) -> Result<String, EngineError> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            self.notifier.notify(Notice::EmptyComment);
            return Err(EngineError::EmptyBody);
        }
        Ok(trimmed.to_string())
    }
}
