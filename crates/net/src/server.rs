//! TCP relay server
//!
//! Accepts connections and runs one [`SessionHandler`] task per connection.
//! Every chat line and file is relayed to all other connected sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use huddle_core::{ChatLog, RelayConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::registry::Outbound;
use crate::session::{Relay, SessionHandler};

/// Relay server handle
pub struct Server {
    addr: SocketAddr,
    relay: Arc<Relay>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Bind the configured address and start accepting
    pub async fn start(config: &RelayConfig, log: Arc<ChatLog>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        // Subscribe before spawning so an early stop() is never missed
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let relay = Arc::new(Relay::new(config, log));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            relay.clone(),
            shutdown_tx.clone(),
            shutdown_rx,
        ));

        Ok(Server {
            addr: bound_addr,
            relay,
            shutdown_tx,
            accept_task,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Nicknames of registered sessions, in join order
    pub async fn members(&self) -> Vec<String> {
        self.relay.registry().nicknames().await
    }

    /// Signal the accept loop and every session to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }

    /// Shut down and wait until every session has closed
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.accept_task.await {
            error!(error = %e, "Accept loop panicked");
        }
        info!("Server stopped");
    }
}

/// Accept incoming connections until shutdown, then wait for sessions
async fn accept_loop(
    listener: TcpListener,
    relay: Arc<Relay>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        sessions.spawn(handle_connection(
                            stream,
                            addr,
                            relay.clone(),
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = result {
                    warn!(error = %e, "Session task failed");
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
    debug!("All sessions closed");
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    relay: Arc<Relay>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(addr = %addr, error = %e, "Could not set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    SessionHandler::new(relay, reader, Outbound::new(writer), addr)
        .run(shutdown_rx)
        .await;
}
