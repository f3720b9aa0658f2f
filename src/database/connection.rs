use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::logger::{log, LogTag};

/// Connection pool sizing
const MAX_CONNECTIONS: u32 = 10;
const MIN_CONNECTIONS: u32 = 2;
const MAX_CONN_LIFETIME: Duration = Duration::from_secs(60 * 60);
const MAX_CONN_IDLE: Duration = Duration::from_secs(30 * 60);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// PostgreSQL store for balance observations
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Open the connection pool and verify the database answers. Fails if
    /// the initial ping fails.
    pub async fn open(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(MIN_CONNECTIONS)
            .max_lifetime(Some(MAX_CONN_LIFETIME))
            .idle_timeout(Some(MAX_CONN_IDLE))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self { pool };
        store.ping().await.context("Initial PostgreSQL ping failed")?;

        Ok(store)
    }

    /// Cheap liveness query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Drain and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the observations table and its indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS token_balances (
                id BIGSERIAL PRIMARY KEY,
                queried_at TIMESTAMPTZ NOT NULL,
                wallet TEXT NOT NULL,
                token_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                decimals SMALLINT NOT NULL,
                raw_balance NUMERIC NOT NULL,
                balance NUMERIC NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create token_balances table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_balances_wallet_token_time
             ON token_balances (wallet, token_address, queried_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_balances_queried_at
             ON token_balances (queried_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_token_balances_wallet
             ON token_balances (wallet)",
        )
        .execute(&self.pool)
        .await?;

        log(LogTag::Database, "INFO", "Schema verified");
        Ok(())
    }
}
