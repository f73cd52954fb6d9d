//! Account repository.
//!
//! Local stand-in for the platform account service: user rows with a
//! platform role and a coin balance. The daemon only ever reads the
//! balance and applies deltas; account lifecycle belongs elsewhere.

use super::DbError;
use salon_proto::{Role, UserId};
use sqlx::SqlitePool;

/// A user account row.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub user_id: UserId,
    pub role: Role,
    pub coins: i64,
    pub created_at: i64,
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure a row exists for this user, creating one with the given
    /// role and starting balance if absent. Idempotent.
    pub async fn ensure(
        &self,
        user_id: &UserId,
        role: Role,
        starting_coins: i64,
    ) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO users (id, role, coins, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(role.as_str())
        .bind(starting_coins)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Find an account by user id.
    pub async fn find(&self, user_id: &UserId) -> Result<Option<AccountRecord>, DbError> {
        let row = sqlx::query_as::<_, (String, String, i64, i64)>(
            "SELECT id, role, coins, created_at FROM users WHERE id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, role, coins, created_at)| AccountRecord {
            user_id: UserId::from(id),
            role: Role::parse(&role).unwrap_or(Role::User),
            coins,
            created_at,
        }))
    }

    /// Get a user's coin balance, if the account exists.
    pub async fn coins(&self, user_id: &UserId) -> Result<Option<i64>, DbError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT coins FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Deduct `amount` if and only if the current balance is positive,
    /// returning the new balance, or `None` when the gate held.
    ///
    /// The gate and the deduction are one guarded statement, so two
    /// concurrent charges against a user's last coin cannot both pass.
    pub async fn charge(&self, user_id: &UserId, amount: i64) -> Result<Option<i64>, DbError> {
        let remaining = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET coins = coins - ? WHERE id = ? AND coins > 0 RETURNING coins",
        )
        .bind(amount)
        .bind(user_id.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(remaining)
    }

    /// Apply a signed delta to a user's balance and return the new one.
    ///
    /// The update and the read are a single statement, so concurrent
    /// deductions never observe each other's intermediate state.
    pub async fn adjust_coins(&self, user_id: &UserId, delta: i64) -> Result<i64, DbError> {
        let new_balance = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET coins = coins + ? WHERE id = ? RETURNING coins",
        )
        .bind(delta)
        .bind(user_id.as_str())
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::Internal(format!("no account row for {user_id}")))?;
        Ok(new_balance)
    }
}
