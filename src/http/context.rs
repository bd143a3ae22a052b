//! Application state shared across request handlers.

use crate::config::Config;
use crate::storage::traits::ClientRegistrationStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Shared store of dynamically registered OAuth clients
    pub client_registration_store: Arc<dyn ClientRegistrationStore>,
}
