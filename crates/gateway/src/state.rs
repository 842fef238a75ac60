use std::sync::Arc;

use hae_domain::config::Config;

use crate::runtime::run_manager::RunManager;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub run_manager: Arc<RunManager>,
}
