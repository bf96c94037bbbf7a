use async_trait::async_trait;

use crate::application::settings_store::{SettingsStore, SettingsStoreError};
use crate::application::order_store::trait_def::now_ms;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteSettingsStore {
    database: Database,
}

impl SqliteSettingsStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SettingsStoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM trading_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.database.pool)
                .await
                .map_err(|e| SettingsStoreError::Backend(e.to_string()))?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SettingsStoreError> {
        sqlx::query(
            r#"
            INSERT INTO trading_settings (key, value, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_ms())
        .execute(&self.database.pool)
        .await
        .map_err(|e| SettingsStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
