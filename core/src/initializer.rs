//! Process-wide entry point that owns at most one gateway.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::ConfigError;
use crate::gateway::ApiGateway;
use crate::inspect::PlatformContext;
use crate::service::ApiService;

static GLOBAL: NetworkInitializer = NetworkInitializer::new();

/// Holds zero or one gateway. The first successful `init` wins; later calls
/// keep the existing gateway whatever configuration they pass.
pub struct NetworkInitializer {
    gateway: Mutex<Option<Arc<ApiGateway>>>,
}

impl NetworkInitializer {
    pub const fn new() -> Self {
        Self {
            gateway: Mutex::new(None),
        }
    }

    /// The shared instance.
    pub fn global() -> &'static NetworkInitializer {
        &GLOBAL
    }

    pub fn init(&self, config: &NetworkConfig, context: &PlatformContext) -> Result<&Self, ConfigError> {
        let mut slot = self.lock();
        if slot.is_some() {
            debug!(base_url = config.base_url(), "network layer already initialized, ignoring");
            return Ok(self);
        }
        *slot = Some(Arc::new(ApiGateway::initialize(config, context)?));
        Ok(self)
    }

    pub fn create_service<S: ApiService>(&self) -> Result<S, ConfigError> {
        let gateway = self.gateway().ok_or(ConfigError::Uninitialized)?;
        gateway.create_service()
    }

    pub fn gateway(&self) -> Option<Arc<ApiGateway>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ApiGateway>>> {
        self.gateway.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NetworkInitializer {
    fn default() -> Self {
        Self::new()
    }
}
