//! # Realtime Gateway
//!
//! WebSocket boundary between browser clients and the turn coordinator.
//!
//! ```text
//! socket ──frames──→ ConnectionHandler ──→ TurnCoordinatorBusAdapter ──→ bus
//!   ↑                      │                                              │
//!   └──── writer ←── outbox ←──────────── forwarder (one per session) ←───┘
//! ```

pub mod connection;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod registry;
pub mod ws;

use std::sync::Arc;

use shared_bus::InMemoryEventBus;
use turn_coordinator::{TurnCoordinatorApi, TurnCoordinatorBusAdapter};

pub use connection::ConnectionHandler;
pub use error::GatewayError;
pub use identity::{Identity, IdentityError, IdentityResolver};
pub use protocol::{ClientMessage, RejectReason, ServerMessage};
pub use registry::ConnectionRegistry;
pub use ws::{router, serve, serve_listener};

/// Default maximum client frame (1MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default per-connection outbox depth.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub outbox_capacity: usize,
    pub max_message_size: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Shared state of the gateway routes.
pub struct GatewayState<C>
where
    C: TurnCoordinatorApi,
{
    pub adapter: Arc<TurnCoordinatorBusAdapter<C, InMemoryEventBus>>,
    pub registry: Arc<ConnectionRegistry>,
    pub identity: Arc<dyn IdentityResolver>,
    pub settings: GatewaySettings,
}

impl<C> GatewayState<C>
where
    C: TurnCoordinatorApi,
{
    pub fn new(
        adapter: Arc<TurnCoordinatorBusAdapter<C, InMemoryEventBus>>,
        registry: Arc<ConnectionRegistry>,
        identity: Arc<dyn IdentityResolver>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            adapter,
            registry,
            identity,
            settings,
        }
    }

    /// A handler for a newly accepted socket.
    pub fn connection(
        &self,
        connection_id: shared_types::ConnectionId,
        outbox: tokio::sync::mpsc::Sender<ServerMessage>,
    ) -> ConnectionHandler<C> {
        ConnectionHandler::new(
            connection_id,
            Arc::clone(&self.adapter),
            Arc::clone(&self.registry),
            outbox,
        )
    }
}

impl<C> Clone for GatewayState<C>
where
    C: TurnCoordinatorApi,
{
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            registry: Arc::clone(&self.registry),
            identity: Arc::clone(&self.identity),
            settings: self.settings.clone(),
        }
    }
}
