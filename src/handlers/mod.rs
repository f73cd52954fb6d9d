//! Request handlers.
//!
//! One handler per wire operation, dispatched by the `op` tag through a
//! registry. Handlers return `SessionResult`; the connection event loop
//! converts failures into the error envelope with the request's `seq`,
//! so no handler writes its own error frames.

mod helpers;
mod history;
mod membership;
mod messaging;
mod moderation;

use crate::auth::Identity;
use crate::error::{SessionError, SessionResult};
use crate::state::{ConnId, SessionState};
use async_trait::async_trait;
use history::{GetDirectHistoryHandler, GetGroupHistoryHandler};
use membership::{CreateGroupHandler, DeleteGroupHandler, JoinGroupHandler, LeaveGroupHandler};
use messaging::{
    MarkDirectReadHandler, ReactToMessageHandler, SendDirectMessageHandler,
    SendGroupMessageHandler,
};
use moderation::{HardDeleteHandler, MemberActionHandler, SoftDeleteHandler};
use salon_proto::{ClientRequest, ServerEvent};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler context for one request on one connection.
pub struct Context<'a> {
    /// The connection the request arrived on.
    pub conn_id: ConnId,
    /// The connection's bound identity.
    pub identity: &'a Identity,
    /// Shared server state.
    pub state: &'a Arc<SessionState>,
    /// Correlation id from the request frame, echoed on the ack.
    pub seq: Option<u64>,
}

impl Context<'_> {
    /// Queue an event on the requesting connection. Uses the reliable
    /// reply path: unlike broadcast pushes, an ack is not dropped when
    /// the outbound queue happens to be full.
    pub fn reply(&self, event: ServerEvent) {
        self.state.registry.send_reply(self.conn_id, event);
    }
}

/// Trait implemented by all request handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()>;
}

/// Registry of request handlers, keyed by op name.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl Registry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn Handler>> = HashMap::new();

        // Membership
        handlers.insert("join-group", Box::new(JoinGroupHandler));
        handlers.insert("leave-group", Box::new(LeaveGroupHandler));
        handlers.insert("create-group", Box::new(CreateGroupHandler));
        handlers.insert("delete-group", Box::new(DeleteGroupHandler));

        // Messaging
        handlers.insert("send-direct-message", Box::new(SendDirectMessageHandler));
        handlers.insert("send-group-message", Box::new(SendGroupMessageHandler));
        handlers.insert("react-to-message", Box::new(ReactToMessageHandler));
        handlers.insert("mark-direct-read", Box::new(MarkDirectReadHandler));

        // History
        handlers.insert("get-direct-history", Box::new(GetDirectHistoryHandler));
        handlers.insert("get-group-history", Box::new(GetGroupHistoryHandler));

        // Moderation
        handlers.insert("mute-member", Box::new(MemberActionHandler));
        handlers.insert("kick-member", Box::new(MemberActionHandler));
        handlers.insert("ban-member", Box::new(MemberActionHandler));
        handlers.insert("soft-delete-message", Box::new(SoftDeleteHandler));
        handlers.insert("hard-delete-message", Box::new(HardDeleteHandler));

        Self { handlers }
    }

    /// Dispatch a request to its handler.
    ///
    /// `authenticate` never reaches this point: the event loop consumes
    /// it during the handshake and rejects it afterwards.
    pub async fn dispatch(
        &self,
        ctx: &Context<'_>,
        request: &ClientRequest,
    ) -> SessionResult<()> {
        match self.handlers.get(request.op_name()) {
            Some(handler) => handler.handle(ctx, request).await,
            None => Err(SessionError::InvalidArgument(format!(
                "unsupported operation: {}",
                request.op_name()
            ))),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
