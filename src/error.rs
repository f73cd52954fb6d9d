//! Unified error handling for salond.
//!
//! Every request failure maps into the session taxonomy below, which is
//! recovered at the dispatch boundary and returned to the originating
//! connection as a generic error envelope. Only `Unauthenticated` tears a
//! connection down, and only during the handshake.

use crate::db::DbError;
use salon_proto::ServerEvent;
use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing, malformed, or expired credential at connect time.
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// Authenticated but not permitted (membership, standing, or role).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Target conversation, group, user, or message absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing required fields or malformed payload values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Insufficient coin balance for the requested send.
    #[error("insufficient coin balance")]
    PaymentRequired,

    /// Genuine state conflict under concurrent access.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence or collaborator failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Get a static error code string for metrics labeling and the wire
    /// envelope.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::PaymentRequired => "payment_required",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }

    /// Convert to the wire error envelope, echoing the request `seq`.
    ///
    /// Internal detail strings are not leaked to clients.
    pub fn to_envelope(&self, seq: Option<u64>) -> ServerEvent {
        let (message, details) = match self {
            Self::Unauthenticated(d) => ("authentication failed".to_string(), Some(d.clone())),
            Self::Forbidden(d) => ("forbidden".to_string(), Some(d.clone())),
            Self::NotFound(d) => ("not found".to_string(), Some(d.clone())),
            Self::InvalidArgument(d) => ("invalid argument".to_string(), Some(d.clone())),
            Self::PaymentRequired => ("insufficient coin balance".to_string(), None),
            Self::Conflict(d) => ("conflict".to_string(), Some(d.clone())),
            Self::Internal(_) => ("internal error".to_string(), None),
        };
        ServerEvent::error(self.error_code(), message, details, seq)
    }
}

impl From<DbError> for SessionError {
    fn from(err: DbError) -> Self {
        SessionError::Internal(err.to_string())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SessionError::PaymentRequired.error_code(), "payment_required");
        assert_eq!(SessionError::Forbidden("x".into()).error_code(), "forbidden");
        assert_eq!(SessionError::Internal("boom".into()).error_code(), "internal");
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let ev = SessionError::Internal("sqlite exploded at /var/lib".into()).to_envelope(Some(9));
        match ev {
            ServerEvent::Error { body } => {
                assert_eq!(body.code, "internal");
                assert_eq!(body.seq, Some(9));
                assert!(body.details.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn forbidden_envelope_carries_details() {
        let ev = SessionError::Forbidden("muted".into()).to_envelope(None);
        match ev {
            ServerEvent::Error { body } => {
                assert!(!body.success);
                assert_eq!(body.details.as_deref(), Some("muted"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
