//! Per-user refresh token slot.
//!
//! Each user has exactly one slot. A refresh token is valid only while it is
//! the value stored in its subject's slot, so replacing the slot revokes the
//! previous token and clearing it revokes all of them.

use sqlx::sqlite::SqlitePool;

fn to_timestamp(secs: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(secs).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Store for the refresh token slot on the users table.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Overwrite the slot unconditionally (login).
    /// Returns false if no user has this UUID.
    pub async fn set(
        &self,
        user_uuid: &str,
        token: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = ?, refresh_expires_at = ? WHERE uuid = ?",
        )
        .bind(token)
        .bind(to_timestamp(expires_at)?)
        .bind(user_uuid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the refresh token currently stored for a user.
    pub async fn get(&self, user_uuid: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT refresh_token FROM users WHERE uuid = ?")
                .bind(user_uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|r| r.0))
    }

    /// Replace `presented` with `next` only if `presented` is still the stored
    /// token. Runs as one UPDATE so two concurrent refreshes presenting the same
    /// token cannot both succeed.
    pub async fn rotate(
        &self,
        user_uuid: &str,
        presented: &str,
        next: &str,
        expires_at: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = ?, refresh_expires_at = ?
             WHERE uuid = ? AND refresh_token = ?",
        )
        .bind(next)
        .bind(to_timestamp(expires_at)?)
        .bind(user_uuid)
        .bind(presented)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Empty the slot (logout). Clearing an empty slot is not an error.
    pub async fn clear(&self, user_uuid: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL WHERE uuid = ?",
        )
        .bind(user_uuid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Empty every slot whose token has expired.
    pub async fn clear_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL
             WHERE refresh_expires_at IS NOT NULL
               AND refresh_expires_at < CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
