//! # Runtime Container
//!
//! Builds every long-lived component once and hands out shared handles.
//!
//! ```text
//! RuntimeConfig ──→ SessionStateStore (Redis or in-memory)
//!                        │
//!                        ↓
//!               TurnCoordinatorService ──→ TurnCoordinatorBusAdapter ←── InMemoryEventBus
//!                                                   │           │
//!                                           TimeoutSupervisor   GatewayState
//! ```

pub mod config;

use std::sync::Arc;

use shared_bus::InMemoryEventBus;
use tracing::{info, warn};
use turn_coordinator::{
    InMemoryStateStore, SessionStateStore, SystemTimeSource, TimeoutSupervisor,
    TurnCoordinatorBusAdapter, TurnCoordinatorService,
};

pub use config::{ConfigError, RuntimeConfig};

use crate::gateway::identity::{AllowAnonymous, IdentityResolver, StaticTokens};
use crate::gateway::registry::ConnectionRegistry;
use crate::gateway::GatewayState;

/// Store handle shared by every coordinator call.
pub type SharedStore = Arc<dyn SessionStateStore>;

/// Coordinator as wired in production.
pub type Coordinator = TurnCoordinatorService<SharedStore, SystemTimeSource>;

/// Bus adapter as wired in production.
pub type Adapter = TurnCoordinatorBusAdapter<Coordinator, InMemoryEventBus>;

/// All runtime components.
pub struct RuntimeContainer {
    pub config: RuntimeConfig,
    pub store: SharedStore,
    pub bus: Arc<InMemoryEventBus>,
    pub coordinator: Arc<Coordinator>,
    pub adapter: Arc<Adapter>,
    pub registry: Arc<ConnectionRegistry>,
    pub identity: Arc<dyn IdentityResolver>,
}

impl RuntimeContainer {
    /// Connects the configured store and wires everything to it.
    pub async fn build(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let store = connect_store(&config).await?;
        Ok(Self::with_store(config, store))
    }

    /// Wires everything to an already-built store.
    pub fn with_store(config: RuntimeConfig, store: SharedStore) -> Self {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.channel_capacity));
        let coordinator = Arc::new(TurnCoordinatorService::new(
            Arc::clone(&store),
            SystemTimeSource,
            config.coordinator.clone(),
        ));
        let adapter = Arc::new(TurnCoordinatorBusAdapter::new(
            Arc::clone(&coordinator),
            Arc::clone(&bus),
        ));
        let identity: Arc<dyn IdentityResolver> =
            if config.auth_tokens.is_empty() && !config.require_auth {
                Arc::new(AllowAnonymous)
            } else {
                Arc::new(StaticTokens::new(
                    config.auth_tokens.clone(),
                    config.require_auth,
                ))
            };

        Self {
            config,
            store,
            bus,
            coordinator,
            adapter,
            registry: Arc::new(ConnectionRegistry::new()),
            identity,
        }
    }

    pub fn supervisor(&self) -> TimeoutSupervisor<Coordinator, InMemoryEventBus> {
        TimeoutSupervisor::new(Arc::clone(&self.adapter), self.config.supervisor)
    }

    pub fn gateway_state(&self) -> GatewayState<Coordinator> {
        GatewayState::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.registry),
            Arc::clone(&self.identity),
            self.config.gateway.clone(),
        )
    }
}

async fn connect_store(config: &RuntimeConfig) -> Result<SharedStore, ConfigError> {
    match &config.redis_url {
        Some(url) => connect_redis(url).await,
        None => {
            warn!("No shared store configured, using in-memory store (single instance only)");
            Ok(Arc::new(InMemoryStateStore::new()))
        }
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_redis(url: &str) -> Result<SharedStore, ConfigError> {
    let store = turn_coordinator::RedisStateStore::connect(url)
        .await
        .map_err(ConfigError::StoreConnect)?;
    info!("Using Redis session store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_redis(_url: &str) -> Result<SharedStore, ConfigError> {
    Err(ConfigError::RedisBackendDisabled)
}
