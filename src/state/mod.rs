//! Central shared state for the session daemon.
//!
//! One [`SessionState`] is built at startup and shared by every
//! connection task. All cross-connection structures live here in
//! concurrent collections; no lock is held across an `.await` into the
//! database.

mod registry;
mod rosters;

pub use registry::{ConnHandle, ConnId, ConnectionRegistry};
pub use rosters::RoomRosters;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::db::Database;
use crate::services::{AccountService, StorageService};
use salon_proto::{GroupId, ServerEvent};
use std::sync::Arc;

/// Shared state container.
pub struct SessionState {
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Persistent storage.
    pub db: Database,
    /// Live connections.
    pub registry: ConnectionRegistry,
    /// Live room rosters.
    pub rosters: RoomRosters,
    /// Account platform collaborator.
    pub accounts: Arc<dyn AccountService>,
    /// Media storage collaborator.
    pub storage: Arc<dyn StorageService>,
    /// Bearer token verifier.
    pub verifier: TokenVerifier,
}

impl SessionState {
    /// Assemble the shared state.
    pub fn new(
        config: Arc<Config>,
        db: Database,
        accounts: Arc<dyn AccountService>,
        storage: Arc<dyn StorageService>,
    ) -> Arc<Self> {
        let verifier = TokenVerifier::new(config.auth.token_secret.as_bytes().to_vec());
        Arc::new(Self {
            config,
            db,
            registry: ConnectionRegistry::new(),
            rosters: RoomRosters::new(),
            accounts,
            storage,
            verifier,
        })
    }

    /// Queue an event on every connection in a room, optionally skipping
    /// one (the requester, who gets a correlated ack instead).
    pub fn broadcast_room(
        &self,
        group_id: &GroupId,
        event: &ServerEvent,
        except: Option<ConnId>,
    ) {
        let mut recipients = 0usize;
        for conn_id in self.rosters.conns_in(group_id) {
            if Some(conn_id) == except {
                continue;
            }
            self.registry.send_to_conn(conn_id, event.clone());
            recipients += 1;
        }
        crate::metrics::record_fanout(recipients);
    }
}
