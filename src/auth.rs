//! Bearer credential verification.
//!
//! Tokens are minted by the account platform and presented once, as the
//! first frame on every connection. A token is two base64url segments:
//! a JSON claims payload and an HMAC-SHA256 signature over the raw
//! payload bytes. Verification is constant-time on the signature.

use crate::error::{SessionError, SessionResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use salon_proto::{Role, UserId};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried inside a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id.
    pub sub: String,
    /// Platform role.
    pub role: Role,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// A verified identity bound to a connection.
#[derive(Debug, Clone)]
pub struct Identity {
    /// The authenticated user.
    pub user_id: UserId,
    /// Platform role.
    pub role: Role,
}

impl Identity {
    /// Whether this identity carries operator authority.
    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

/// Verifies bearer tokens against a shared HMAC secret.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl TokenVerifier {
    /// Build a verifier over the configured secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Verify a presented token and extract its identity.
    ///
    /// Rejects malformed tokens, bad signatures, and expired claims,
    /// all as `Unauthenticated`.
    pub fn verify(&self, token: &str) -> SessionResult<Identity> {
        let (payload_b64, sig_b64) = token
            .split_once('.')
            .ok_or_else(|| SessionError::Unauthenticated("malformed token".into()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Unauthenticated("malformed token payload".into()))?;
        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Unauthenticated("malformed token signature".into()))?;

        let expected = self.sign(&payload);
        if expected.ct_eq(&sig).unwrap_u8() != 1 {
            return Err(SessionError::Unauthenticated("bad signature".into()));
        }

        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| SessionError::Unauthenticated("malformed claims".into()))?;
        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(SessionError::Unauthenticated("token expired".into()));
        }
        if claims.sub.is_empty() {
            return Err(SessionError::Unauthenticated("empty subject".into()));
        }

        Ok(Identity { user_id: UserId::from(claims.sub), role: claims.role })
    }

    /// Mint a token for the given claims. The daemon never mints tokens
    /// in production; this backs the `salon-token` tool and the tests.
    pub fn mint(&self, claims: &TokenClaims) -> String {
        // Serializing a plain struct with string/int fields cannot fail.
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let sig = self.sign(&payload);
        format!("{}.{}", URL_SAFE_NO_PAD.encode(&payload), URL_SAFE_NO_PAD.encode(sig))
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
