//! Group membership handlers: join, leave, create, delete.

use super::helpers::load_group;
use super::{Context, Handler};
use crate::error::{SessionError, SessionResult};
use crate::moderation::{Actor, authorize_group_delete};
use async_trait::async_trait;
use salon_proto::{
    ClientRequest, GroupId, GroupRecord, GroupVisibility, ServerEvent,
};
use tracing::info;

/// `join-group`: enter a group's live room, creating the persisted
/// membership row on first join of a public group.
pub struct JoinGroupHandler;

#[async_trait]
impl Handler for JoinGroupHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::JoinGroup { group_id } = request else { return Ok(()) };

        let group = load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        let groups = ctx.state.db.groups();

        if groups.is_banned(group_id, me).await? {
            return Err(SessionError::Forbidden("banned from this group".into()));
        }

        let existing = groups.member(group_id, me).await?;
        if existing.is_none() {
            if group.visibility == GroupVisibility::Private {
                return Err(SessionError::Forbidden("private group".into()));
            }
            if group.member_count >= group.capacity {
                return Err(SessionError::Forbidden("group is full".into()));
            }
            groups.add_member(group_id, me).await?;
        }

        let newly_in_room = ctx.state.rosters.join(group_id, ctx.conn_id);

        ctx.reply(ServerEvent::GroupJoined {
            seq: ctx.seq,
            group_id: group_id.clone(),
            group_name: group.name,
        });
        if newly_in_room {
            let broadcast =
                ServerEvent::MemberJoined { group_id: group_id.clone(), user_id: me.clone() };
            ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        }
        Ok(())
    }
}

/// `leave-group`: drop the roster entry and the membership row. The
/// owner stays until the group is deleted or ownership moves elsewhere.
pub struct LeaveGroupHandler;

#[async_trait]
impl Handler for LeaveGroupHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::LeaveGroup { group_id } = request else { return Ok(()) };

        let group = load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        if group.owner == *me {
            return Err(SessionError::Forbidden("the owner cannot leave their group".into()));
        }

        let had_row = ctx.state.db.groups().remove_member(group_id, me).await?;
        let was_in_room = ctx.state.rosters.leave(group_id, ctx.conn_id);

        ctx.reply(ServerEvent::GroupLeft { seq: ctx.seq, group_id: group_id.clone() });
        if had_row || was_in_room {
            let broadcast =
                ServerEvent::MemberLeft { group_id: group_id.clone(), user_id: me.clone() };
            ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        }
        Ok(())
    }
}

/// `create-group`: mint a group with the caller as owner and announce
/// it on the operator channel.
pub struct CreateGroupHandler;

#[async_trait]
impl Handler for CreateGroupHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::CreateGroup { name, visibility, description, rules, tags, image } =
            request
        else {
            return Ok(());
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidArgument("group name must not be empty".into()));
        }
        let max_tags = ctx.state.config.limits.max_group_tags;
        if tags.len() > max_tags {
            return Err(SessionError::InvalidArgument(format!("at most {max_tags} tags")));
        }

        let image_ref = match image {
            Some(payload) => Some(ctx.state.storage.store_group_image(name, payload).await?),
            None => None,
        };

        let group = GroupRecord {
            id: GroupId::generate(),
            name: name.to_string(),
            owner: ctx.identity.user_id.clone(),
            visibility: *visibility,
            description: description.clone(),
            rules: rules.clone(),
            tags: tags.clone(),
            image_ref,
            capacity: ctx.state.config.limits.group_capacity,
            member_count: 1,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        ctx.state.db.groups().create(&group).await?;
        ctx.state.rosters.join(&group.id, ctx.conn_id);

        info!(group = %group.id, owner = %group.owner, name = %group.name, "Group created");

        ctx.state
            .registry
            .broadcast_operators(&ServerEvent::GroupCreated { seq: None, group: group.clone() });
        ctx.reply(ServerEvent::GroupCreated { seq: ctx.seq, group });
        Ok(())
    }
}

/// `delete-group`: owner or operator; the aggregate and its rows go
/// with it.
pub struct DeleteGroupHandler;

#[async_trait]
impl Handler for DeleteGroupHandler {
    async fn handle(&self, ctx: &Context<'_>, request: &ClientRequest) -> SessionResult<()> {
        let ClientRequest::DeleteGroup { group_id } = request else { return Ok(()) };

        let group = load_group(ctx, group_id).await?;
        let me = &ctx.identity.user_id;
        let member = ctx.state.db.groups().member(group_id, me).await?;
        let actor = Actor {
            user_id: me,
            group_role: member.map(|m| m.role),
            is_operator: ctx.identity.is_operator(),
        };
        authorize_group_delete(&actor, &group.owner)?;

        ctx.state.db.groups().delete(group_id).await?;

        info!(group = %group_id, by = %me, "Group deleted");

        let broadcast = ServerEvent::GroupDeleted { seq: None, group_id: group_id.clone() };
        ctx.state.broadcast_room(group_id, &broadcast, Some(ctx.conn_id));
        ctx.state.registry.broadcast_operators(&broadcast);
        ctx.state.rosters.drop_room(group_id);
        ctx.reply(ServerEvent::GroupDeleted { seq: ctx.seq, group_id: group_id.clone() });
        Ok(())
    }
}
