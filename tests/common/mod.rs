//! Shared in-process harness for handler integration tests.
//!
//! Builds the full shared state over an in-memory database and registers
//! fake connections whose outbound queues are plain channel receivers, so
//! tests drive the same dispatch path the TCP event loop uses without
//! opening a socket.

#![allow(dead_code)]

use salond::auth::Identity;
use salond::config::Config;
use salond::db::Database;
use salond::error::SessionResult;
use salond::handlers::{Context, Registry};
use salond::services::{LocalAccounts, NoopStorage};
use salond::state::{ConnHandle, ConnId, SessionState};
use salon_proto::{ClientRequest, GroupId, GroupVisibility, Role, ServerEvent, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Small tariffs and a tiny group capacity keep the coin and capacity
/// arithmetic easy to stage.
const TEST_CONFIG: &str = r#"
    [server]
    name = "salon.test"

    [listen]
    address = "127.0.0.1:0"

    [auth]
    token_secret = "integration-test-secret!"

    [tariff]
    direct_message = 2
    group_message = 1

    [limits]
    group_capacity = 3
"#;

/// A full daemon state plus the handler registry, minus the transport.
pub struct TestWorld {
    pub state: Arc<SessionState>,
    pub handlers: Registry,
}

/// One registered fake connection.
pub struct TestConn {
    pub conn_id: ConnId,
    pub identity: Identity,
    rx: mpsc::Receiver<ServerEvent>,
}

impl TestWorld {
    pub async fn new() -> Self {
        let config: Config = toml::from_str(TEST_CONFIG).unwrap();
        let db = Database::new(":memory:").await.unwrap();
        let accounts = LocalAccounts::new(db.clone());
        let state = SessionState::new(Arc::new(config), db, accounts, Arc::new(NoopStorage));
        Self { state, handlers: Registry::new() }
    }

    /// Provision an account and register a connection for it.
    pub async fn user(&self, id: &str, coins: i64) -> TestConn {
        self.state.db.accounts().ensure(&UserId::from(id), Role::User, coins).await.unwrap();
        self.connect(id, Role::User)
    }

    /// Provision an operator account and register a connection for it.
    pub async fn operator(&self, id: &str) -> TestConn {
        self.state.db.accounts().ensure(&UserId::from(id), Role::Operator, 1000).await.unwrap();
        self.connect(id, Role::Operator)
    }

    /// Register an additional connection for an existing account, as a
    /// second device would.
    pub fn connect(&self, id: &str, role: Role) -> TestConn {
        let conn_id = ConnId::next();
        let (tx, rx) = mpsc::channel(64);
        self.state.registry.register(ConnHandle {
            conn_id,
            user_id: UserId::from(id),
            role,
            tx,
        });
        TestConn {
            conn_id,
            identity: Identity { user_id: UserId::from(id), role },
            rx,
        }
    }

    /// Route one request exactly as the connection event loop would.
    pub async fn dispatch(
        &self,
        conn: &TestConn,
        seq: Option<u64>,
        request: ClientRequest,
    ) -> SessionResult<()> {
        let ctx = Context {
            conn_id: conn.conn_id,
            identity: &conn.identity,
            state: &self.state,
            seq,
        };
        self.handlers.dispatch(&ctx, &request).await
    }

    /// Dispatch and panic on failure.
    pub async fn send_ok(&self, conn: &TestConn, seq: Option<u64>, request: ClientRequest) {
        if let Err(e) = self.dispatch(conn, seq, request).await {
            panic!("request failed: {e}");
        }
    }

    /// Create a public group owned by `owner` and return its id from the
    /// ack, draining the ack from the queue.
    pub async fn create_group(&self, owner: &mut TestConn, name: &str) -> GroupId {
        self.send_ok(
            owner,
            Some(1),
            ClientRequest::CreateGroup {
                name: name.to_string(),
                visibility: GroupVisibility::Public,
                description: None,
                rules: None,
                tags: Vec::new(),
                image: None,
            },
        )
        .await;
        match owner.next_event() {
            ServerEvent::GroupCreated { group, .. } => group.id,
            other => panic!("expected group-created ack, got {other:?}"),
        }
    }
}

impl TestConn {
    /// Pop the next queued event, if any.
    pub fn try_event(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    /// Pop the next queued event or panic.
    pub fn next_event(&mut self) -> ServerEvent {
        self.try_event().unwrap_or_else(|| panic!("no event queued for {}", self.identity.user_id))
    }

    /// Drain every queued event.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Some(ev) = self.try_event() {
            out.push(ev);
        }
        out
    }
}
