//! Process lifecycle: start the gateway and the supervisor, stop both on
//! one shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::RuntimeContainer;
use crate::gateway::{self, GatewayError};

/// How long each task gets to finish after shutdown is signalled.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct SessionRuntime {
    container: Arc<RuntimeContainer>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SessionRuntime {
    pub fn new(container: RuntimeContainer) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            container: Arc::new(container),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            tasks: Vec::new(),
        }
    }

    pub fn container(&self) -> &RuntimeContainer {
        &self.container
    }

    /// Resolves once shutdown has been signalled, by `shutdown` or by the
    /// gateway exiting on its own.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Binds the configured address and spawns the gateway and the timeout
    /// supervisor. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, GatewayError> {
        let addr = self.container.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.start_on(listener)
    }

    pub fn start_on(&mut self, listener: TcpListener) -> Result<SocketAddr, GatewayError> {
        let local_addr = listener.local_addr().map_err(GatewayError::Serve)?;

        let supervisor = self.container.supervisor();
        let supervisor_shutdown = self.shutdown_rx.clone();
        self.tasks.push((
            "supervisor",
            tokio::spawn(async move { supervisor.run(supervisor_shutdown).await }),
        ));

        let router = gateway::router(self.container.gateway_state());
        let server_shutdown = self.shutdown_rx.clone();
        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        self.tasks.push((
            "gateway",
            tokio::spawn(async move {
                if let Err(e) = gateway::serve_listener(listener, router, server_shutdown).await {
                    error!(error = %e, "Gateway stopped");
                }
                // Take the supervisor down with the gateway.
                let _ = shutdown_tx.send(true);
            }),
        ));

        info!(addr = %local_addr, "Session runtime started");
        Ok(local_addr)
    }

    /// Signals shutdown and waits for every task.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No task was listening for shutdown");
        }

        for (name, task) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = %e, "Task panicked"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }
        info!("Shutdown complete");
    }
}
