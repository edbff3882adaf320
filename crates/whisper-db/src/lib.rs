//! # whisper-db
//!
//! Durable store (PostgreSQL — identities, devices, contact backups,
//! attachment metadata) and volatile store (Redis — sessions, challenges,
//! presence, pending queues, call state, rate counters) access.
//!
//! Unlike a dual-backend toggle, Whisper2 has exactly one durable store
//! (Postgres) and one volatile store (Redis); there's no lite/embedded mode
//! to select between, so `Database::connect` takes both URLs unconditionally.

pub mod repository;
pub mod volatile;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Shared database state passed through extractors and connection state.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
    pub redis: redis::aio::ConnectionManager,
}

impl Database {
    pub async fn connect(config: &whisper_common::config::AppConfig) -> Result<Self> {
        tracing::info!("connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await
            .context("failed to connect to PostgreSQL")?;

        tracing::info!("connecting to Redis");
        let client = redis::Client::open(config.redis.url.as_str())
            .context("invalid redis url")?;
        let redis = redis::aio::ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        tracing::info!("connected to Redis");

        Ok(Self { pool, redis })
    }

    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("migrations complete");
        Ok(())
    }
}
