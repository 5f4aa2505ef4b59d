//! Shared harness: one store and one manual clock, any number of server
//! instances, each with its own bus, registry and clients.

pub mod concurrency;
pub mod flows;
pub mod multi_instance;

use std::sync::Arc;
use std::time::Duration;

use session_runtime::gateway::{
    ClientMessage, ConnectionHandler, ConnectionRegistry, ServerMessage,
};
use shared_bus::InMemoryEventBus;
use shared_types::{ConnectionId, GridDimensions, SessionId};
use tokio::sync::mpsc;
use tokio::time::timeout;
use turn_coordinator::{
    CoordinatorConfig, InMemoryStateStore, ManualClock, SupervisorConfig, TimeoutSupervisor,
    TurnCoordinatorBusAdapter, TurnCoordinatorService,
};

pub type Service = TurnCoordinatorService<Arc<InMemoryStateStore>, Arc<ManualClock>>;
pub type Adapter = TurnCoordinatorBusAdapter<Service, InMemoryEventBus>;

/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000_000;

pub const TURN_BUDGET: Duration = Duration::from_secs(30);

pub struct Backend {
    pub store: Arc<InMemoryStateStore>,
    pub clock: Arc<ManualClock>,
}

impl Backend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStateStore::new()),
            clock: Arc::new(ManualClock::new(T0)),
        }
    }

    /// A server instance on this backend.
    pub fn instance(&self) -> Instance {
        let config = CoordinatorConfig {
            turn_budget: TURN_BUDGET,
            grid: GridDimensions::new(4, 8),
            ..CoordinatorConfig::default()
        };
        let service = Arc::new(TurnCoordinatorService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            config,
        ));
        Instance {
            adapter: Arc::new(TurnCoordinatorBusAdapter::new(
                service,
                Arc::new(InMemoryEventBus::new()),
            )),
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Instance {
    pub adapter: Arc<Adapter>,
    pub registry: Arc<ConnectionRegistry>,
}

impl Instance {
    pub fn connect(&self, id: &str) -> Client {
        let (outbox, inbox) = mpsc::channel(4096);
        Client {
            handler: Arc::new(ConnectionHandler::new(
                ConnectionId::from(id),
                Arc::clone(&self.adapter),
                Arc::clone(&self.registry),
                outbox,
            )),
            inbox,
        }
    }

    pub fn supervisor(&self) -> TimeoutSupervisor<Service, InMemoryEventBus> {
        TimeoutSupervisor::new(
            Arc::clone(&self.adapter),
            SupervisorConfig {
                scan_interval: Duration::from_millis(20),
            },
        )
    }
}

/// A connected socket as the server sees it.
pub struct Client {
    pub handler: Arc<ConnectionHandler<Service>>,
    pub inbox: mpsc::Receiver<ServerMessage>,
}

impl Client {
    /// Closes the socket. Every task sharing the handler must have finished.
    pub async fn disconnect(self) {
        let handler = Arc::try_unwrap(self.handler)
            .unwrap_or_else(|_| panic!("handler still shared at disconnect"));
        handler.disconnect().await;
    }

    pub fn id(&self) -> &ConnectionId {
        self.handler.connection_id()
    }

    pub async fn send(&self, message: ClientMessage) {
        self.handler.handle(message).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.handler.handle_text(text).await;
    }

    pub async fn join_session(&self, session: &str) {
        self.send(ClientMessage::JoinSession {
            session_id: SessionId::from(session),
        })
        .await;
    }

    pub async fn join_queue(&self, session: &str, name: &str) {
        self.send(join_queue(session, name)).await;
    }

    pub async fn finish_turn(&self, session: &str) {
        self.send(finish_turn(session)).await;
    }

    pub async fn next(&mut self) -> ServerMessage {
        timeout(Duration::from_millis(500), self.inbox.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("outbox closed")
    }

    /// Everything delivered so far, after letting forwarders catch up.
    pub async fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(Some(message)) = timeout(Duration::from_millis(30), self.inbox.recv()).await {
            messages.push(message);
        }
        messages
    }

    /// The `currentTurn` of the last queue update received, if any.
    pub async fn last_turn(&mut self) -> Option<Option<ConnectionId>> {
        self.drain()
            .await
            .into_iter()
            .rev()
            .find_map(|message| match message {
                ServerMessage::QueueUpdate { current_turn, .. } => Some(current_turn),
                _ => None,
            })
    }
}

pub fn join_queue(session: &str, name: &str) -> ClientMessage {
    ClientMessage::JoinQueue {
        session_id: SessionId::from(session),
        name: name.to_string(),
        avatar: String::new(),
    }
}

pub fn finish_turn(session: &str) -> ClientMessage {
    ClientMessage::FinishTurn {
        session_id: SessionId::from(session),
    }
}
