//! TCP gateway: accept loop spawning one task per connection.

use super::connection;
use crate::handlers::Registry;
use crate::state::SessionState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// The listening front door of the daemon.
pub struct Gateway {
    state: Arc<SessionState>,
    handlers: Arc<Registry>,
}

impl Gateway {
    pub fn new(state: Arc<SessionState>) -> Self {
        Self { state, handlers: Arc::new(Registry::new()) }
    }

    /// Bind the configured address and accept connections until the
    /// task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.state.config.listen.address;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Listening");
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    let state = Arc::clone(&self.state);
                    let handlers = Arc::clone(&self.handlers);
                    tokio::spawn(connection::run(stream, peer, state, handlers));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                }
            }
        }
    }
}
