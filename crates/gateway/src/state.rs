use std::sync::Arc;

use persisto_memory::MemoryService;

use crate::auth::TenantResolver;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<MemoryService>,
    pub resolver: Arc<dyn TenantResolver>,
    pub version: String,
}

impl AppState {
    pub fn new(memory: Arc<MemoryService>, resolver: Arc<dyn TenantResolver>) -> Self {
        Self {
            memory,
            resolver,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
