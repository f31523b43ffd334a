//! Application state management.

use std::sync::Arc;

use crate::domain::{ChainNode, IndexerStore};

use super::service::AppService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
    pub store: Arc<dyn IndexerStore>,
    pub node: Arc<dyn ChainNode>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(store: Arc<dyn IndexerStore>, node: Arc<dyn ChainNode>) -> Self {
        let service = Arc::new(AppService::new(Arc::clone(&store), Arc::clone(&node)));
        Self {
            service,
            store,
            node,
        }
    }
}
