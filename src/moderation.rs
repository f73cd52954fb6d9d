//! Moderation authorization rules.
//!
//! Pure decision functions: who may mute, kick, ban, or delete, given
//! the actor's group role and platform role. Handlers gather the rows
//! and ask; every denial is a `Forbidden` with the reason as detail.

use crate::error::{SessionError, SessionResult};
use salon_proto::{GroupRole, MessageLifecycle, Standing, UserId};

/// A moderation action against a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    Mute,
    Kick,
    Ban,
}

impl ModAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ModAction::Mute => "mute",
            ModAction::Kick => "kick",
            ModAction::Ban => "ban",
        }
    }
}

/// The acting party, as seen by a single group.
#[derive(Debug, Clone)]
pub struct Actor<'a> {
    pub user_id: &'a UserId,
    /// Group role, when the actor holds a member row.
    pub group_role: Option<GroupRole>,
    /// Platform operator override.
    pub is_operator: bool,
}

impl Actor<'_> {
    fn outranks(&self, target_role: GroupRole) -> bool {
        if self.is_operator {
            return true;
        }
        match (self.group_role, target_role) {
            (Some(GroupRole::Owner), GroupRole::Moderator | GroupRole::Member) => true,
            (Some(GroupRole::Moderator), GroupRole::Member) => true,
            _ => false,
        }
    }
}

/// Decide whether `actor` may apply `action` to a member with
/// `target_role`.
///
/// Rules:
/// - self-moderation is never allowed;
/// - the actor needs moderation authority (moderator/owner row, or
///   platform operator);
/// - moderators reach members, the owner reaches moderators, operators
///   reach anyone;
/// - the owner can never be muted, and only an operator may kick or ban
///   the owner.
pub fn authorize_member_action(
    actor: &Actor<'_>,
    target_id: &UserId,
    target_role: GroupRole,
    action: ModAction,
) -> SessionResult<()> {
    if actor.user_id == target_id {
        return Err(SessionError::Forbidden(format!("cannot {} yourself", action.as_str())));
    }

    let has_authority =
        actor.is_operator || actor.group_role.is_some_and(GroupRole::can_moderate);
    if !has_authority {
        return Err(SessionError::Forbidden("moderation requires moderator or owner".into()));
    }

    if target_role == GroupRole::Owner {
        match action {
            ModAction::Mute => {
                return Err(SessionError::Forbidden("the owner cannot be muted".into()));
            }
            ModAction::Kick | ModAction::Ban if !actor.is_operator => {
                return Err(SessionError::Forbidden(format!(
                    "only an operator may {} the owner",
                    action.as_str()
                )));
            }
            _ => return Ok(()),
        }
    }

    if !actor.outranks(target_role) {
        return Err(SessionError::Forbidden(format!(
            "insufficient authority to {} a {}",
            action.as_str(),
            target_role.as_str()
        )));
    }
    Ok(())
}

/// The mute toggle: ACTIVE and MUTED swap, nothing else is reachable
/// from a mute request.
pub fn toggled_standing(current: Standing) -> Standing {
    match current {
        Standing::Muted => Standing::Active,
        _ => Standing::Muted,
    }
}

/// Decide whether `actor` may soft-delete a group message.
///
/// The author may retract their own message; moderation authority
/// covers everyone else's.
pub fn authorize_soft_delete(actor: &Actor<'_>, message_sender: &UserId) -> SessionResult<()> {
    if actor.user_id == message_sender
        || actor.is_operator
        || actor.group_role.is_some_and(GroupRole::can_moderate)
    {
        Ok(())
    } else {
        Err(SessionError::Forbidden("only the author or a moderator may delete".into()))
    }
}

/// Decide whether `actor` may irreversibly purge a group message.
/// Purging destroys the operator audit view, so only operators may.
pub fn authorize_group_purge(actor: &Actor<'_>) -> SessionResult<()> {
    if actor.is_operator {
        Ok(())
    } else {
        Err(SessionError::Forbidden("hard delete in groups is operator-only".into()))
    }
}

/// Decide whether `actor` may delete a whole group.
pub fn authorize_group_delete(actor: &Actor<'_>, owner: &UserId) -> SessionResult<()> {
    if actor.is_operator || actor.user_id == owner {
        Ok(())
    } else {
        Err(SessionError::Forbidden("only the owner or an operator may delete a group".into()))
    }
}

/// A sender's standing gates the message pipeline: muted members stay
/// joined and read, but sends are rejected.
pub fn check_can_send(standing: Standing) -> SessionResult<()> {
    match standing {
        Standing::Active => Ok(()),
        _ => Err(SessionError::Forbidden("you are muted in this group".into())),
    }
}

/// Whether a reader with the given operator status may see a message in
/// history.
pub fn visible_to(lifecycle: MessageLifecycle, is_operator: bool) -> bool {
    match lifecycle {
        MessageLifecycle::Visible => true,
        MessageLifecycle::SoftDeleted => is_operator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(user: &UserId, role: Option<GroupRole>, is_operator: bool) -> Actor<'_> {
        Actor { user_id: user, group_role: role, is_operator }
    }

    #[test]
    fn self_moderation_is_forbidden() {
        let me = UserId::from("me");
        let a = actor(&me, Some(GroupRole::Owner), false);
        let err = authorize_member_action(&a, &me, GroupRole::Owner, ModAction::Kick).unwrap_err();
        assert!(matches!(err, SessionError::Forbidden(_)));
    }

    #[test]
    fn plain_members_have_no_authority() {
        let me = UserId::from("me");
        let target = UserId::from("t");
        let a = actor(&me, Some(GroupRole::Member), false);
        assert!(authorize_member_action(&a, &target, GroupRole::Member, ModAction::Mute).is_err());
    }

    #[test]
    fn moderators_reach_members_but_not_moderators() {
        let me = UserId::from("mod");
        let target = UserId::from("t");
        let a = actor(&me, Some(GroupRole::Moderator), false);
        assert!(authorize_member_action(&a, &target, GroupRole::Member, ModAction::Kick).is_ok());
        assert!(
            authorize_member_action(&a, &target, GroupRole::Moderator, ModAction::Kick).is_err()
        );
    }

    #[test]
    fn owner_reaches_moderators() {
        let me = UserId::from("owner");
        let target = UserId::from("mod");
        let a = actor(&me, Some(GroupRole::Owner), false);
        assert!(authorize_member_action(&a, &target, GroupRole::Moderator, ModAction::Ban).is_ok());
    }

    #[test]
    fn owner_is_untouchable_except_by_operator() {
        let me = UserId::from("mod");
        let owner = UserId::from("owner");
        let a = actor(&me, Some(GroupRole::Moderator), false);
        assert!(authorize_member_action(&a, &owner, GroupRole::Owner, ModAction::Kick).is_err());
        assert!(authorize_member_action(&a, &owner, GroupRole::Owner, ModAction::Mute).is_err());

        let op_id = UserId::from("op");
        let op = actor(&op_id, None, true);
        assert!(authorize_member_action(&op, &owner, GroupRole::Owner, ModAction::Ban).is_ok());
        // Even operators cannot mute the owner.
        assert!(authorize_member_action(&op, &owner, GroupRole::Owner, ModAction::Mute).is_err());
    }

    #[test]
    fn mute_toggles_between_active_and_muted() {
        assert_eq!(toggled_standing(Standing::Active), Standing::Muted);
        assert_eq!(toggled_standing(Standing::Muted), Standing::Active);
    }

    #[test]
    fn soft_delete_author_or_moderator() {
        let author = UserId::from("author");
        let stranger = UserId::from("stranger");
        assert!(
            authorize_soft_delete(&actor(&author, Some(GroupRole::Member), false), &author).is_ok()
        );
        assert!(
            authorize_soft_delete(&actor(&stranger, Some(GroupRole::Member), false), &author)
                .is_err()
        );
        assert!(
            authorize_soft_delete(&actor(&stranger, Some(GroupRole::Moderator), false), &author)
                .is_ok()
        );
    }

    #[test]
    fn group_purge_is_operator_only() {
        let owner = UserId::from("owner");
        assert!(authorize_group_purge(&actor(&owner, Some(GroupRole::Owner), false)).is_err());
        let op = UserId::from("op");
        assert!(authorize_group_purge(&actor(&op, None, true)).is_ok());
    }

    #[test]
    fn muted_members_cannot_send() {
        assert!(check_can_send(Standing::Active).is_ok());
        assert!(check_can_send(Standing::Muted).is_err());
    }

    #[test]
    fn soft_deleted_visible_to_operators_only() {
        assert!(visible_to(MessageLifecycle::SoftDeleted, true));
        assert!(!visible_to(MessageLifecycle::SoftDeleted, false));
        assert!(visible_to(MessageLifecycle::Visible, false));
    }
}
