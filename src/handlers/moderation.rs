//! Moderation handlers: standing changes and the two delete policies.

use super::helpers::{load_group, require_user_id};
use super::{Context, Handler};
use crate::error::{SessionError, SessionResult};
use crate::moderation::{
    Actor, ModAction, authorize_group_purge, authorize_member_action, authorize_soft_delete,
    toggled_standing,
};
use async_trait::async_trait;
use salon_proto::{ClientRequest, GroupId, ServerEvent, Standing, UserId};
use std::collections::HashSet;
use tracing::info;

/// `mute-member` / `kick-member` / `ban-member`.
///
/// Mute toggles ACTIVE⇄MUTED on the member row. Kick removes the row;
/// ban removes it and records the ban. Both evict the target's live
/// roster entries.
pub struct MemberActionHandler;

#[async_trait]
impl Handler for MemberActionHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let (group_id, target_id, action) = match request {
            ClientRequest::MuteMember { group_id, user_id } => (group_id, user_id, ModAction::Mute),
            ClientRequest::KickMember { group_id, user_id } => (group_id, user_id, ModAction::Kick),
            ClientRequest::BanMember { group_id, user_id } => (group_id, user_id, ModAction::Ban),
            _ => return Ok(()),
        };
        require_user_id(target_id)?;

        load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        let groups = ctx.state.db.groups();

        let target = groups
            .member(group_id, target_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("member {target_id}")))?;
        let actor_row = groups.member(group_id, me).await?;
        let actor = Actor {
            user_id: me,
            group_role: actor_row.map(|m| m.role),
            is_operator: ctx.identity.is_operator(),
        };
        authorize_member_action(&actor, target_id, target.role, action)?;

        let standing = match action {
            ModAction::Mute => {
                let next = toggled_standing(target.standing);
                groups.set_standing(group_id, target_id, next).await?;
                next
            }
            ModAction::Kick => {
                groups.remove_member(group_id, target_id).await?;
                evict(ctx, group_id, target_id);
                Standing::Kicked
            }
            ModAction::Ban => {
                groups.ban(group_id, target_id, me).await?;
                evict(ctx, group_id, target_id);
                Standing::Banned
            }
        };

        info!(
            group = %group_id,
            target = %target_id,
            by = %me,
            action = action.as_str(),
            standing = standing.as_str(),
            "Member standing changed"
        );

        let event = ServerEvent::StandingChanged {
            seq: None,
            group_id: group_id.clone(),
            user_id: target_id.clone(),
            standing,
        };
        ctx.state.broadcast_room(group_id, &event, Some(ctx.conn_id));
        // The target hears about it even when out of the room (evicted,
        // or never joined on this device).
        let room_conns: HashSet<_> = ctx.state.rosters.conns_in(group_id).into_iter().collect();
        for conn_id in ctx.state.registry.conns_of(target_id) {
            if !room_conns.contains(&conn_id) {
                ctx.state.registry.send_to_conn(conn_id, event.clone());
            }
        }
        ctx.reply(ServerEvent::StandingChanged {
            seq: ctx.seq,
            group_id: group_id.clone(),
            user_id: target_id.clone(),
            standing,
        });
        Ok(())
    }
}

fn evict(ctx: &Context<'_>, group_id: &GroupId, target_id: &UserId) {
    for conn_id in ctx.state.registry.conns_of(target_id) {
        ctx.state.rosters.leave(group_id, conn_id);
    }
}

/// `soft-delete-message`: hide from ordinary readers, keep for the
/// operator audit view. Author or moderation authority; idempotent.
pub struct SoftDeleteHandler;

#[async_trait]
impl Handler for SoftDeleteHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::SoftDeleteMessage { group_id, message_id } = request else {
            return Ok(());
        };

        load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        let message = ctx
            .state
            .db
            .groups()
            .find_message(group_id, message_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("message {message_id}")))?;

        let actor_row = ctx.state.db.groups().member(group_id, me).await?;
        let actor = Actor {
            user_id: me,
            group_role: actor_row.map(|m| m.role),
            is_operator: ctx.identity.is_operator(),
        };
        authorize_soft_delete(&actor, &message.sender)?;

        ctx.state.db.groups().soft_delete_message(group_id, message_id, me).await?;

        let broadcast = ServerEvent::MessageDeleted {
            seq: None,
            group_id: Some(group_id.clone()),
            conversation_id: None,
            message_id: message_id.clone(),
            hard: false,
            deleted_by: me.clone(),
        };
        ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        ctx.reply(ServerEvent::MessageDeleted {
            seq: ctx.seq,
            group_id: Some(group_id.clone()),
            conversation_id: None,
            message_id: message_id.clone(),
            hard: false,
            deleted_by: me.clone(),
        });
        Ok(())
    }
}

/// `hard-delete-message`: irreversible. Group scope is operator-only;
/// conversation scope belongs to the message's sender.
pub struct HardDeleteHandler;

#[async_trait]
impl Handler for HardDeleteHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::HardDeleteMessage { group_id, conversation_id, message_id } = request
        else {
            return Ok(());
        };

        match (group_id, conversation_id) {
            (Some(group_id), None) => self.purge_group(ctx, group_id, message_id).await,
            (None, Some(conversation_id)) => {
                self.purge_direct(ctx, conversation_id, message_id).await
            }
            _ => Err(SessionError::InvalidArgument(
                "exactly one of groupId or conversationId required".into(),
            )),
        }
    }
}

impl HardDeleteHandler {
    async fn purge_group(
        &self,
        ctx: &Context<'_>,
        group_id: &GroupId,
        message_id: &salon_proto::MessageId,
    ) -> SessionResult<()> {
        load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        let actor_row = ctx.state.db.groups().member(group_id, me).await?;
        let actor = Actor {
            user_id: me,
            group_role: actor_row.map(|m| m.role),
            is_operator: ctx.identity.is_operator(),
        };
        authorize_group_purge(&actor)?;

        if ctx.state.db.groups().find_message(group_id, message_id).await?.is_none() {
            return Err(SessionError::NotFound(format!("message {message_id}")));
        }
        ctx.state.db.groups().purge_message(group_id, message_id).await?;

        info!(group = %group_id, message = %message_id, by = %me, "Message purged");

        let broadcast = ServerEvent::MessageDeleted {
            seq: None,
            group_id: Some(group_id.clone()),
            conversation_id: None,
            message_id: message_id.clone(),
            hard: true,
            deleted_by: me.clone(),
        };
        ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        ctx.reply(ServerEvent::MessageDeleted {
            seq: ctx.seq,
            group_id: Some(group_id.clone()),
            conversation_id: None,
            message_id: message_id.clone(),
            hard: true,
            deleted_by: me.clone(),
        });
        Ok(())
    }

    async fn purge_direct(
        &self,
        ctx: &Context<'_>,
        conversation_id: &salon_proto::ConversationId,
        message_id: &salon_proto::MessageId,
    ) -> SessionResult<()> {
        let conversations = ctx.state.db.conversations();
        let conversation = conversations
            .find(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("conversation {conversation_id}")))?;
        let me = &ctx.identity.user_id;
        if !conversation.has_participant(me) {
            return Err(SessionError::Forbidden("not a participant".into()));
        }

        let message = conversations
            .find_message(conversation_id, message_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("message {message_id}")))?;
        if message.sender != *me {
            return Err(SessionError::Forbidden("only the sender may delete".into()));
        }
        conversations.purge_message(conversation_id, message_id).await?;

        let push = ServerEvent::MessageDeleted {
            seq: None,
            group_id: None,
            conversation_id: Some(conversation_id.clone()),
            message_id: message_id.clone(),
            hard: true,
            deleted_by: me.clone(),
        };
        ctx.state.registry.send_to_user(conversation.peer_of(me), &push);
        ctx.reply(ServerEvent::MessageDeleted {
            seq: ctx.seq,
            group_id: None,
            conversation_id: Some(conversation_id.clone()),
            message_id: message_id.clone(),
            hard: true,
            deleted_by: me.clone(),
        });
        Ok(())
    }
}
