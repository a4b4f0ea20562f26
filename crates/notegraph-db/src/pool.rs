//! PostgreSQL connection for the concept registry.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use notegraph_core::{defaults, Error, Result};

/// Connect to the concept store. An unreachable server is `BackendUnavailable`.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    connect(
        database_url,
        Duration::from_secs(defaults::DB_CONNECT_TIMEOUT_SECS),
    )
    .await
}

async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let start = Instant::now();
    let pool = PgPoolOptions::new()
        .max_connections(defaults::DB_MAX_CONNECTIONS)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .map_err(|e| {
            Error::BackendUnavailable(format!(
                "cannot connect to PostgreSQL concept store: {}. Check DATABASE_URL and that the server is running",
                e
            ))
        })?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "connect",
        max_connections = defaults::DB_MAX_CONNECTIONS,
        duration_ms = start.elapsed().as_millis() as u64,
        "Concept store connected"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_database_is_backend_unavailable() {
        let err = connect("postgres://nobody@127.0.0.1:1/none", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
