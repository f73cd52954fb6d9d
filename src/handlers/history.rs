//! History pagination handlers.

use super::helpers::{clamp_limit, load_group};
use super::{Context, Handler};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use salon_proto::{ClientRequest, ServerEvent};

/// `get-direct-history`: participants page through their conversation,
/// oldest first. Nobody else reads it, operators included; the operator
/// override is a group-history affordance only.
pub struct GetDirectHistoryHandler;

#[async_trait]
impl Handler for GetDirectHistoryHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::GetDirectHistory { conversation_id, limit, skip } = request else {
            return Ok(());
        };
        let limit = clamp_limit(ctx, *limit)?;

        let conversation = ctx
            .state
            .db
            .conversations()
            .find(conversation_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("conversation {conversation_id}")))?;
        if !conversation.has_participant(&ctx.identity.user_id) {
            return Err(SessionError::Forbidden("not a participant".into()));
        }

        let (messages, has_more) =
            ctx.state.db.conversations().history(conversation_id, limit, *skip).await?;
        ctx.reply(ServerEvent::DirectHistory {
            seq: ctx.seq,
            conversation_id: conversation_id.clone(),
            messages,
            has_more,
        });
        Ok(())
    }
}

/// `get-group-history`: members and roster joiners read the visible
/// window; operators read any group and see soft-deleted messages too.
pub struct GetGroupHistoryHandler;

#[async_trait]
impl Handler for GetGroupHistoryHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::GetGroupHistory { group_id, limit, skip } = request else {
            return Ok(());
        };
        let limit = clamp_limit(ctx, *limit)?;

        load_group(ctx, group_id).await?;
        let is_operator = ctx.identity.is_operator();
        if !is_operator {
            let is_member = ctx
                .state
                .db
                .groups()
                .member(group_id, &ctx.identity.user_id)
                .await?
                .is_some();
            if !is_member && !ctx.state.rosters.is_joined(group_id, ctx.conn_id) {
                return Err(SessionError::Forbidden("not a member of this group".into()));
            }
        }

        let (messages, has_more) =
            ctx.state.db.groups().history(group_id, limit, *skip, is_operator).await?;
        ctx.reply(ServerEvent::GroupHistory {
            seq: ctx.seq,
            group_id: group_id.clone(),
            messages,
            has_more,
        });
        Ok(())
    }
}
