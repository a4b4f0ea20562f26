//! Preference overlay stores.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use notegraph_core::{defaults, Error, PreferenceState, PreferenceStore, Result};

use crate::json_file;

/// Preference state as a JSONB document in `notegraph_config`.
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: Pool<Postgres>,
    key: String,
}

impl PgPreferenceStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            key: defaults::PREFERENCES_KEY.to_string(),
        }
    }

    /// Store under a different key, e.g. one per vault.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Create the `notegraph_config` table if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS notegraph_config (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn load(&self) -> Result<PreferenceState> {
        let row = sqlx::query("SELECT value FROM notegraph_config WHERE key = $1")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.get("value");
                Ok(serde_json::from_value(value)?)
            }
            None => Ok(PreferenceState::default()),
        }
    }

    async fn save(&self, state: &PreferenceState) -> Result<()> {
        let value = serde_json::to_value(state)?;
        sqlx::query(
            "INSERT INTO notegraph_config (key, value, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(&self.key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        debug!(key = %self.key, "Saved preference state");
        Ok(())
    }
}

/// Preference state as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl PreferenceStore for JsonFilePreferenceStore {
    async fn load(&self) -> Result<PreferenceState> {
        json_file::read_or_default(&self.path).await
    }

    async fn save(&self, state: &PreferenceState) -> Result<()> {
        json_file::write_atomic(&self.path, state).await
    }
}
