//! Cross-target moderation listing with unrestricted delete.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{
    EngineError,
    notify::{Notice, Notifier},
};
use crate::{
    models::moderation::{ModerationEntry, ModerationParams, ModerationQuery, Page},
    store::Backend,
};

#[derive(Default)]
struct ModerationState {
    query: Option<ModerationQuery>,
    page: Option<Page<ModerationEntry>>,
    next_ticket: u64,
    latest_load: u64,
    dirty: bool,
}

pub struct ModerationView<B: ?Sized> {
    backend: Arc<B>,
    notifier: Arc<dyn Notifier>,
    default_per_page: i64,
    state: Mutex<ModerationState>,
}

impl<B> ModerationView<B>
where
    B: Backend + ?Sized,
{
    pub fn new(backend: Arc<B>, notifier: Arc<dyn Notifier>, default_per_page: i64) -> Self {
        Self {
            backend,
            notifier,
            default_per_page,
            state: Mutex::new(ModerationState::default()),
        }
    }

    pub async fn page(&self) -> Option<Page<ModerationEntry>> {
        self.state.lock().await.page.clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Loads the page described by `params`. Late responses from older loads are dropped.
    pub async fn load(&self, params: &ModerationParams) -> Result<(), EngineError> {
        let query = ModerationQuery::from_params(params, self.default_per_page);
        self.fetch(query, false).await
    }

    /// Reloads the current page.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let query = self.current_query().await;
        self.fetch(query, false).await
    }

    async fn current_query(&self) -> ModerationQuery {
        let query = self.state.lock().await.query.clone();
        query.unwrap_or_else(|| {
            ModerationQuery::from_params(&ModerationParams::default(), self.default_per_page)
        })
    }

    /// With `after_write`, a failed read keeps the current page and marks it dirty
    /// instead of clearing it and notifying.
    async fn fetch(&self, query: ModerationQuery, after_write: bool) -> Result<(), EngineError> {
        let ticket = {
            let mut state = self.state.lock().await;
            state.next_ticket += 1;
            state.latest_load = state.next_ticket;
            state.query = Some(query.clone());
            state.next_ticket
        };

        let result = self.backend.moderation_page(&query).await;

        let mut state = self.state.lock().await;
        if ticket != state.latest_load {
            tracing::debug!(ticket, "discarding stale moderation page");
            return Ok(());
        }
        match result {
            Ok(page) => {
                state.page = Some(page);
                state.dirty = false;
                Ok(())
            }
            Err(e) if after_write => {
                tracing::warn!("Moderation page refresh failed, marking dirty: {}", e);
                state.dirty = true;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load moderation page: {}", e);
                state.page = None;
                drop(state);
                self.notifier.notify(Notice::FailedToLoadComments);
                Err(e.into())
            }
        }
    }

    /// Deletes any comment. Listed replies of a deleted top-level comment go with it.
    pub async fn delete(&self, comment_id: i64) -> Result<u64, EngineError> {
        {
            let mut state = self.state.lock().await;
            if let Some(page) = state.page.as_mut() {
                let before = page.items.len();
                page.items
                    .retain(|e| e.id != comment_id && e.parent_id != Some(comment_id));
                page.total -= (before - page.items.len()) as i64;
            }
        }

        match self.backend.delete(comment_id, None).await {
            Ok(rows) => {
                tracing::info!(comment_id, rows, "comment removed by moderator");
                let query = self.current_query().await;
                self.fetch(query, true).await?;
                Ok(rows)
            }
            Err(e) => {
                self.state.lock().await.dirty = true;
                tracing::error!(comment_id, "Failed to delete comment: {}", e);
                self.notifier.notify(Notice::FailedToDeleteComment);
                Err(e.into())
            }
        }
    }
}
