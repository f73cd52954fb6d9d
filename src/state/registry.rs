//! Connection registry.
//!
//! Tracks every live authenticated connection and its outbound queue.
//! A user may hold several connections at once; pushes fan out to all
//! of them. Slow or closed queues are skipped without failing the
//! sender's request; correlated replies instead wait out a full queue
//! so an ack is never silently lost.

use dashmap::DashMap;
use parking_lot::RwLock;
use salon_proto::{Role, ServerEvent, UserId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Unique identifier for a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

static CONN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ConnId {
    /// Mint a process-unique connection id.
    pub fn next() -> Self {
        Self(CONN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A registered connection's routing entry.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub conn_id: ConnId,
    pub user_id: UserId,
    pub role: Role,
    pub tx: mpsc::Sender<ServerEvent>,
}

/// All live connections, indexed by connection and by user.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<ConnId, ConnHandle>,
    by_user: DashMap<UserId, HashSet<ConnId>>,
    // Operators also sit on a broadcast channel for platform-wide events.
    operators: RwLock<HashSet<ConnId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection.
    pub fn register(&self, handle: ConnHandle) {
        let conn_id = handle.conn_id;
        let user_id = handle.user_id.clone();
        if handle.role == Role::Operator {
            self.operators.write().insert(conn_id);
        }
        self.by_user.entry(user_id).or_default().insert(conn_id);
        self.conns.insert(conn_id, handle);
    }

    /// Remove a connection. Returns its handle when it was registered.
    pub fn unregister(&self, conn_id: ConnId) -> Option<ConnHandle> {
        let (_, handle) = self.conns.remove(&conn_id)?;
        self.operators.write().remove(&conn_id);
        if let Some(mut set) = self.by_user.get_mut(&handle.user_id) {
            set.remove(&conn_id);
            let empty = set.is_empty();
            drop(set);
            if empty {
                self.by_user.remove_if(&handle.user_id, |_, s| s.is_empty());
            }
        }
        Some(handle)
    }

    /// Look up a connection handle.
    pub fn get(&self, conn_id: ConnId) -> Option<ConnHandle> {
        self.conns.get(&conn_id).map(|h| h.clone())
    }

    /// All connection ids currently bound to a user.
    pub fn conns_of(&self, user_id: &UserId) -> Vec<ConnId> {
        self.by_user
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether the user has at least one live connection.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.by_user.get(user_id).is_some_and(|set| !set.is_empty())
    }

    /// Queue an event on one connection. Full or closed queues drop the
    /// event.
    pub fn send_to_conn(&self, conn_id: ConnId, event: ServerEvent) {
        if let Some(handle) = self.conns.get(&conn_id)
            && handle.tx.try_send(event).is_err()
        {
            debug!(conn = %conn_id, "Dropping event for slow or closed connection");
        }
    }

    /// Queue a correlated reply on one connection. Broadcast delivery is
    /// lossy, but the requester's ack is not allowed to vanish into a
    /// momentarily full queue: the send is finished from a background
    /// task once the queue drains. Closed queues still drop.
    pub fn send_reply(&self, conn_id: ConnId, event: ServerEvent) {
        let Some(handle) = self.conns.get(&conn_id) else {
            return;
        };
        match handle.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let tx = handle.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn = %conn_id, "Dropping reply for closed connection");
            }
        }
    }

    /// Queue an event on every connection a user holds.
    pub fn send_to_user(&self, user_id: &UserId, event: &ServerEvent) {
        for conn_id in self.conns_of(user_id) {
            self.send_to_conn(conn_id, event.clone());
        }
    }

    /// Queue an event on every operator connection.
    pub fn broadcast_operators(&self, event: &ServerEvent) {
        let operators: Vec<ConnId> = self.operators.read().iter().copied().collect();
        for conn_id in operators {
            self.send_to_conn(conn_id, event.clone());
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
