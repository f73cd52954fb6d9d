//! Shared helper functions for request handlers.

use super::Context;
use crate::error::{SessionError, SessionResult};
use salon_proto::{GroupId, GroupMemberRecord, GroupRecord, UserId};

/// Load a group or fail with `NotFound`.
pub async fn load_group(ctx: &Context<'_>, group_id: &GroupId) -> SessionResult<GroupRecord> {
    ctx.state
        .db
        .groups()
        .find(group_id)
        .await?
        .ok_or_else(|| SessionError::NotFound(format!("group {group_id}")))
}

/// Load the caller's member row or fail with `Forbidden`.
pub async fn require_member(
    ctx: &Context<'_>,
    group_id: &GroupId,
) -> SessionResult<GroupMemberRecord> {
    ctx.state
        .db
        .groups()
        .member(group_id, &ctx.identity.user_id)
        .await?
        .ok_or_else(|| SessionError::Forbidden("not a member of this group".into()))
}

/// The outcome of a successful tariff charge.
pub struct CoinCharge {
    /// Balance after the deduction, returned in the sender's ack.
    pub remaining: i64,
    /// What was deducted, for the compensating refund.
    pub amount: i64,
}

/// The monetization gate: a sender with a non-positive balance may not
/// send, and a sender with any positive balance is charged the full
/// tariff, even past zero. Gate and deduction are a single conditional
/// update on the account side, so concurrent sends against the same
/// last coin cannot both pass.
pub async fn charge_sender(ctx: &Context<'_>, tariff: i64) -> SessionResult<CoinCharge> {
    let sender = &ctx.identity.user_id;
    if ctx.state.accounts.find_user(sender).await?.is_none() {
        return Err(SessionError::Internal(format!("no account for {sender}")));
    }
    match ctx.state.accounts.charge_coins(sender, tariff).await? {
        Some(remaining) => Ok(CoinCharge { remaining, amount: tariff }),
        None => Err(SessionError::PaymentRequired),
    }
}

/// Compensate a charge whose message failed to persist. A refund
/// failure is logged, not surfaced: the client already gets `Internal`
/// for the send itself.
pub async fn refund(ctx: &Context<'_>, charge: &CoinCharge) {
    if let Err(e) = ctx.state.accounts.adjust_coins(&ctx.identity.user_id, charge.amount).await {
        tracing::error!(
            user = %ctx.identity.user_id,
            amount = charge.amount,
            error = %e,
            "Failed to refund tariff after persistence error"
        );
    }
}

/// Validate message content: at least one of text or media, text
/// non-blank when present.
pub fn validate_content(text: Option<&str>, media_ref: Option<&str>) -> SessionResult<()> {
    let has_text = text.is_some_and(|t| !t.trim().is_empty());
    let has_media = media_ref.is_some_and(|m| !m.is_empty());
    if has_text || has_media {
        Ok(())
    } else {
        Err(SessionError::InvalidArgument("message needs text or media".into()))
    }
}

/// Clamp a requested history page size to the configured ceiling.
pub fn clamp_limit(ctx: &Context<'_>, limit: u32) -> SessionResult<u32> {
    if limit == 0 {
        return Err(SessionError::InvalidArgument("limit must be positive".into()));
    }
    Ok(limit.min(ctx.state.config.limits.max_history_limit))
}

/// `UserId` sanity check for targets carried in requests.
pub fn require_user_id(user_id: &UserId) -> SessionResult<()> {
    if user_id.as_str().is_empty() {
        return Err(SessionError::InvalidArgument("empty user id".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_validation_requires_substance() {
        assert!(validate_content(Some("hi"), None).is_ok());
        assert!(validate_content(None, Some("s3://x")).is_ok());
        assert!(validate_content(Some("   "), None).is_err());
        assert!(validate_content(None, None).is_err());
        assert!(validate_content(Some(""), Some("")).is_err());
    }

    #[test]
    fn empty_user_ids_are_rejected() {
        assert!(require_user_id(&UserId::from("")).is_err());
        assert!(require_user_id(&UserId::from("u1")).is_ok());
    }
}
