use std::sync::Arc;

use taskd_engine::TodoEngine;

/// Shared application state.
pub struct AppState {
    pub engine: Arc<TodoEngine>,
}

impl AppState {
    pub fn new(engine: Arc<TodoEngine>) -> Self {
        Self { engine }
    }
}
