//! Shared request state

use keystone_auth::{KeyCache, TokenValidator};
use std::sync::Arc;

/// State shared by every handler and the authentication middleware
#[derive(Debug, Clone)]
pub struct AppState {
    /// Validator for bearer tokens
    pub validator: Arc<TokenValidator>,
    /// Key cache behind the validator, read by the readiness check
    pub cache: KeyCache,
}

impl AppState {
    /// Bundle a validator with the cache it reads from
    pub fn new(validator: Arc<TokenValidator>, cache: KeyCache) -> Self {
        Self { validator, cache }
    }
}
