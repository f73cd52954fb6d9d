//! salond - real-time social messaging session daemon.
//!
//! Library facade over the daemon's internals so integration tests can
//! drive the handler pipeline against an in-memory database without a
//! socket.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod moderation;
pub mod network;
pub mod services;
pub mod state;
pub mod telemetry;

/// Placeholder secret shipped in the example config; the daemon refuses
/// to start with it unless explicitly overridden.
pub const DEFAULT_TOKEN_SECRET: &str = "change-me";

/// Whether a configured token secret is the placeholder or too weak to
/// sign credentials with.
pub fn is_insecure_token_secret(secret: &str) -> bool {
    secret == DEFAULT_TOKEN_SECRET || secret.len() < 16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_short_secrets_are_insecure() {
        assert!(is_insecure_token_secret("change-me"));
        assert!(is_insecure_token_secret("short"));
        assert!(!is_insecure_token_secret("a-long-random-secret-string"));
    }
}
