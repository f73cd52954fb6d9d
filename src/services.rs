//! Collaborator interfaces.
//!
//! The session layer treats accounts and media storage as remote
//! services behind async traits, even when the default implementations
//! are local. Handlers only ever see the trait objects, so swapping in
//! networked implementations touches nothing else.

use crate::db::{AccountRecord, Database};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use salon_proto::UserId;
use std::sync::Arc;

/// Account platform collaborator: identity lookup and coin ledger.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Look up an account.
    async fn find_user(&self, user_id: &UserId) -> SessionResult<Option<AccountRecord>>;

    /// Apply a signed coin delta and return the new balance.
    async fn adjust_coins(&self, user_id: &UserId, delta: i64) -> SessionResult<i64>;

    /// Deduct `amount` only while the balance is positive, returning the
    /// new balance, or `None` when the account could not pay. Gate and
    /// deduction are atomic on the provider side.
    async fn charge_coins(&self, user_id: &UserId, amount: i64) -> SessionResult<Option<i64>>;
}

/// Media storage collaborator: accepts raw uploads, returns stored refs.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Store a group avatar and return its reference.
    async fn store_group_image(&self, group_name: &str, payload: &str) -> SessionResult<String>;
}

/// [`AccountService`] backed by the local sqlite `users` table.
pub struct LocalAccounts {
    db: Database,
}

impl LocalAccounts {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self { db })
    }
}

#[async_trait]
impl AccountService for LocalAccounts {
    async fn find_user(&self, user_id: &UserId) -> SessionResult<Option<AccountRecord>> {
        Ok(self.db.accounts().find(user_id).await?)
    }

    async fn adjust_coins(&self, user_id: &UserId, delta: i64) -> SessionResult<i64> {
        Ok(self.db.accounts().adjust_coins(user_id, delta).await?)
    }

    async fn charge_coins(&self, user_id: &UserId, amount: i64) -> SessionResult<Option<i64>> {
        Ok(self.db.accounts().charge(user_id, amount).await?)
    }
}

/// [`StorageService`] that keeps nothing: the payload is acknowledged
/// with a synthetic reference. Stands in until a real object store is
/// wired up.
pub struct NoopStorage;

#[async_trait]
impl StorageService for NoopStorage {
    async fn store_group_image(&self, group_name: &str, payload: &str) -> SessionResult<String> {
        if payload.is_empty() {
            return Err(SessionError::InvalidArgument("empty image payload".into()));
        }
        Ok(format!("noop://groups/{group_name}/{}", payload.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salon_proto::Role;

    #[tokio::test]
    async fn local_accounts_delegate_to_the_users_table() {
        let db = Database::new(":memory:").await.unwrap();
        let u = UserId::from("u1");
        db.accounts().ensure(&u, Role::User, 10).await.unwrap();

        let svc = LocalAccounts::new(db);
        let account = svc.find_user(&u).await.unwrap().unwrap();
        assert_eq!(account.coins, 10);
        assert_eq!(svc.adjust_coins(&u, -4).await.unwrap(), 6);
        assert_eq!(svc.charge_coins(&u, 6).await.unwrap(), Some(0));
        assert_eq!(svc.charge_coins(&u, 6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn noop_storage_mints_a_ref() {
        let storage = NoopStorage;
        let r = storage.store_group_image("readers", "abc123").await.unwrap();
        assert!(r.starts_with("noop://groups/readers/"));
        assert!(storage.store_group_image("readers", "").await.is_err());
    }
}
