//! Shared application state for request handlers.

use std::sync::Arc;

use voxtext_core::engine::Engine;

/// Handler state: the process-wide engine.
///
/// The engine serializes model access internally, so handlers may call it
/// from any number of in-flight requests.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
