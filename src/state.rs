use std::sync::Arc;

use crate::{config::Config, store::PgStore};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgStore>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<PgStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
