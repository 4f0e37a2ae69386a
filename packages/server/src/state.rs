use std::sync::Arc;

use crate::models::config::EngineConfig;
use crate::services::session_store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(store: Arc<SessionStore>, config: EngineConfig) -> Self {
        AppState {
            store,
            config: Arc::new(config),
        }
    }
}
