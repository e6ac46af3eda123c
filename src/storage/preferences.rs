use anyhow::{ensure, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::schema::Database;
use crate::theme::PreferenceStore;

impl Database {
    // ========================================================================
    // Local Settings
    // ========================================================================

    /// Value stored under `key`, or `None` if it was never set.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM user_preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        ensure!(!key.is_empty(), "preference key must not be empty");
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        tracing::debug!(key, "Preference saved");
        Ok(())
    }

    /// When `key` was last written.
    pub async fn preference_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let millis = sqlx::query_scalar::<_, i64>("SELECT updated_at FROM user_preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

#[async_trait]
impl PreferenceStore for Database {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_preference(key).await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_preference(key, value).await
    }
}
