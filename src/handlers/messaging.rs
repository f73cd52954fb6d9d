//! Message pipeline handlers: direct sends, group sends, reactions,
//! and read receipts.

use super::helpers::{
    charge_sender, load_group, refund, require_member, require_user_id, validate_content,
};
use super::{Context, Handler};
use crate::error::{SessionError, SessionResult};
use crate::moderation::{check_can_send, visible_to};
use async_trait::async_trait;
use salon_proto::{
    ClientRequest, DirectMessageKind, DirectMessageRecord, GroupMessageKind, GroupMessageRecord,
    MessageId, MessageLifecycle, ServerEvent,
};
use tracing::debug;

/// `send-direct-message`: resolve the pair's conversation, pass the
/// monetization gate, persist, ack, and push to the peer when online.
pub struct SendDirectMessageHandler;

#[async_trait]
impl Handler for SendDirectMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::SendDirectMessage { peer_id, text, media_ref, kind } = request else {
            return Ok(());
        };

        require_user_id(peer_id)?;
        let me = &ctx.identity.user_id;
        if peer_id == me {
            return Err(SessionError::InvalidArgument("cannot message yourself".into()));
        }
        validate_content(text.as_deref(), media_ref.as_deref())?;
        if ctx.state.accounts.find_user(peer_id).await?.is_none() {
            return Err(SessionError::NotFound(format!("user {peer_id}")));
        }

        let conversation = ctx.state.db.conversations().resolve_or_create(me, peer_id).await?;

        let charge = charge_sender(ctx, ctx.state.config.tariff.direct_message).await?;

        let message = DirectMessageRecord {
            id: MessageId::generate(),
            conversation_id: conversation.id.clone(),
            sender: me.clone(),
            text: text.clone(),
            kind: (*kind).unwrap_or(DirectMessageKind::Text),
            media_ref: media_ref.clone(),
            is_read: false,
            read_receipts: Vec::new(),
            sent_at: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = ctx.state.db.conversations().insert_message(&message).await {
            refund(ctx, &charge).await;
            return Err(e.into());
        }

        debug!(
            conversation = %conversation.id,
            from = %me,
            to = %peer_id,
            peer_online = ctx.state.registry.is_online(peer_id),
            "Direct message stored"
        );
        crate::metrics::record_message_stored("direct", charge.amount);

        let push =
            ServerEvent::DirectMessage { seq: None, message: message.clone(), remaining_coins: None };
        ctx.state.registry.send_to_user(peer_id, &push);
        // The sender's other devices get the push too; the requesting
        // connection gets the correlated ack instead.
        for conn_id in ctx.state.registry.conns_of(me) {
            if conn_id != ctx.conn_id {
                ctx.state.registry.send_to_conn(conn_id, push.clone());
            }
        }
        ctx.reply(ServerEvent::DirectMessage {
            seq: ctx.seq,
            message,
            remaining_coins: Some(charge.remaining),
        });
        Ok(())
    }
}

/// `send-group-message`: roster-joined, non-muted members only; same
/// monetization gate; broadcast to the room.
pub struct SendGroupMessageHandler;

#[async_trait]
impl Handler for SendGroupMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::SendGroupMessage { group_id, text, kind, media_ref, reply_to } =
            request
        else {
            return Ok(());
        };

        load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;

        if !ctx.state.rosters.is_joined(group_id, ctx.conn_id) {
            return Err(SessionError::Forbidden("join the room before sending".into()));
        }
        let member = require_member(ctx, group_id).await?;
        check_can_send(member.standing)?;
        validate_content(text.as_deref(), media_ref.as_deref())?;

        if let Some(parent) = reply_to
            && ctx.state.db.groups().find_message(group_id, parent).await?.is_none()
        {
            return Err(SessionError::NotFound(format!("reply target {parent}")));
        }

        let charge = charge_sender(ctx, ctx.state.config.tariff.group_message).await?;

        let message = GroupMessageRecord {
            id: MessageId::generate(),
            group_id: group_id.clone(),
            sender: me.clone(),
            text: text.clone(),
            kind: (*kind).unwrap_or(GroupMessageKind::Text),
            media_ref: media_ref.clone(),
            reply_to: reply_to.clone(),
            reactions: Vec::new(),
            lifecycle: MessageLifecycle::Visible,
            deleted_by: None,
            deleted_at: None,
            sent_at: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = ctx.state.db.groups().insert_message(&message).await {
            refund(ctx, &charge).await;
            return Err(e.into());
        }
        crate::metrics::record_message_stored("group", charge.amount);

        let broadcast =
            ServerEvent::GroupMessage { seq: None, message: message.clone(), remaining_coins: None };
        ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        ctx.reply(ServerEvent::GroupMessage {
            seq: ctx.seq,
            message,
            remaining_coins: Some(charge.remaining),
        });
        Ok(())
    }
}

/// `react-to-message`: toggle the caller's `(emoji)` on a message and
/// broadcast the resulting set.
pub struct ReactToMessageHandler;

#[async_trait]
impl Handler for ReactToMessageHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::ReactToMessage { group_id, message_id, emoji } = request else {
            return Ok(());
        };

        if emoji.is_empty() {
            return Err(SessionError::InvalidArgument("empty emoji".into()));
        }
        load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        if !ctx.identity.is_operator()
            && ctx.state.db.groups().member(group_id, me).await?.is_none()
        {
            return Err(SessionError::Forbidden("not a member of this group".into()));
        }

        let message = ctx
            .state
            .db
            .groups()
            .find_message(group_id, message_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("message {message_id}")))?;
        if !visible_to(message.lifecycle, ctx.identity.is_operator()) {
            return Err(SessionError::NotFound(format!("message {message_id}")));
        }

        let reactions = ctx.state.db.groups().toggle_reaction(message_id, me, emoji).await?;

        let broadcast = ServerEvent::ReactionsUpdated {
            seq: None,
            group_id: group_id.clone(),
            message_id: message_id.clone(),
            reactions: reactions.clone(),
        };
        ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        ctx.reply(ServerEvent::ReactionsUpdated {
            seq: ctx.seq,
            group_id: group_id.clone(),
            message_id: message_id.clone(),
            reactions,
        });
        Ok(())
    }
}

/// `mark-direct-read`: record receipts on the peer's unread messages.
/// Re-marking is a no-op, so concurrent marks commute.
pub struct MarkDirectReadHandler;

#[async_trait]
impl Handler for MarkDirectReadHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::MarkDirectRead { conversation_id } = request else { return Ok(()) };

        let conversation = ctx
            .state
            .db
            .conversations()
            .find(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("conversation {conversation_id}")))?;
        let me = &ctx.identity.user_id;
        if !conversation.has_participant(me) {
            return Err(SessionError::Forbidden("not a participant".into()));
        }

        let read_at = chrono::Utc::now().timestamp_millis();
        let message_ids =
            ctx.state.db.conversations().mark_read(conversation_id, me, read_at).await?;

        if !message_ids.is_empty() {
            let push = ServerEvent::ReadReceipts {
                seq: None,
                conversation_id: conversation_id.clone(),
                reader: me.clone(),
                read_at,
                message_ids: message_ids.clone(),
            };
            ctx.state.registry.send_to_user(conversation.peer_of(me), &push);
        }
        ctx.reply(ServerEvent::ReadReceipts {
            seq: ctx.seq,
            conversation_id: conversation_id.clone(),
            reader: me.clone(),
            read_at,
            message_ids,
        });
        Ok(())
    }
}
