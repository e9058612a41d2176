use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::relay::{RelayResult, SessionInitiator};
use crate::core::ultravox::UltravoxInitiator;

/// Application state that can be shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    /// Opens the remote channel for each relay session
    pub initiator: Arc<dyn SessionInitiator>,
    /// Cancelled on server shutdown; every session runs on a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state backed by the Ultravox initiator.
    pub fn new(config: ServerConfig) -> RelayResult<Arc<Self>> {
        let initiator = Arc::new(UltravoxInitiator::new(config.ultravox.clone())?);
        Ok(Self::with_initiator(config, initiator))
    }

    /// Build state around any initiator.
    pub fn with_initiator(config: ServerConfig, initiator: Arc<dyn SessionInitiator>) -> Arc<Self> {
        Arc::new(Self {
            config,
            initiator,
            shutdown: CancellationToken::new(),
        })
    }
}
