//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development. Config precedence: env vars > .env
//! file > config.toml > defaults.

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("config not initialized. Call whisper_common::config::init() first.")
}

/// Initialize the global configuration from environment. Should be called
/// once at startup, before any other code accesses config.
pub fn init() -> Result<&'static AppConfig, config::ConfigError> {
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.gateway_port", 8081)?
        .set_default("server.api_port", 8080)?
        .set_default("server.shutdown_grace_secs", 15)?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 5)?
        .set_default("session.ttl_secs", 7 * 24 * 60 * 60)?
        .set_default("challenge.ttl_secs", 60)?
        .set_default("limits.max_frame_bytes", 65_536)?
        .set_default("limits.max_backup_frame_bytes", 262_144)?
        .set_default("limits.max_pending_per_recipient", 1000)?
        .set_default("limits.pending_ttl_secs", 72 * 60 * 60)?
        .set_default("storage.endpoint", "")?
        .set_default("storage.bucket", "whisper2-attachments")?
        .set_default("storage.access_key", "")?
        .set_default("storage.secret_key", "")?
        .set_default("storage.region", "us-east-1")?
        .set_default("storage.presign_ttl_secs", 900)?
        .set_default("turn.realm", "whisper2")?
        .set_default("turn.credential_ttl_secs", 3600)?
        .set_default("turn.urls", Vec::<String>::new())?
        .set_default("push.webhook_url", "")?
        .set_default("push.request_timeout_secs", 10)?
        .add_source(config::File::with_name("config").required(false))
        .add_source(
            config::Environment::with_prefix("WHISPER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    Ok(CONFIG.get_or_init(|| app_config))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub session: SessionConfig,
    pub challenge: ChallengeConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
    pub turn: TurnConfig,
    pub push: PushConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub gateway_port: u16,
    pub api_port: u16,
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChallengeConfig {
    pub ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_frame_bytes: usize,
    pub max_backup_frame_bytes: usize,
    pub max_pending_per_recipient: usize,
    pub pending_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL (e.g. http://localhost:9000 for MinIO).
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TurnConfig {
    /// coturn `static-auth-secret`, shared with the TURN server out of band.
    pub shared_secret: String,
    pub realm: String,
    pub credential_ttl_secs: u64,
    /// `turn:`/`turns:` URLs handed back to clients alongside the minted
    /// credential; the relay servers themselves are operated out of band.
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    /// Webhook URL the push adapter posts wake-up notifications to.
    pub webhook_url: String,
    pub request_timeout_secs: u64,
}
