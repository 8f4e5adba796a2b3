//! Application state and shared resources.

use std::sync::Arc;

use crate::config::ProxyConfig;
use crate::gateway::{CgiGateway, InvocationContract, ProcessGateway};

/// Shared application state.
pub struct AppState {
    pub config: ProxyConfig,
    pub gateway: Arc<dyn ProcessGateway>,
}

impl AppState {
    pub fn new(config: ProxyConfig, gateway: Arc<dyn ProcessGateway>) -> Self {
        Self { config, gateway }
    }

    /// State running the configured renderer through CGI.
    pub fn with_cgi(config: ProxyConfig) -> Self {
        Self::new(config, Arc::new(CgiGateway::new()))
    }

    /// Contract for running the configured renderer with a normalized query.
    pub fn contract(&self, query_string: String) -> InvocationContract {
        InvocationContract::new(
            self.config.mapserv.clone(),
            self.config.directory.clone(),
            query_string,
        )
    }
}
