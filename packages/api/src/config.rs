//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use db::DbConfig;
use label_core::JobId;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the label server needs at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Key for submission signatures.
    pub hmac_secret: String,
    /// Password agents send to authenticate.
    pub ws_password: String,
    pub db: DbConfig,
    pub bind_addr: SocketAddr,
    /// Where the job topic keeps unfinished references. In memory when unset.
    pub bus_data_dir: Option<PathBuf>,
    /// Deadline for one frame write to one agent during a broadcast.
    pub broadcast_write_timeout: Duration,
    /// Evict agents silent for this long. Disabled when unset.
    pub agent_idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Config with in-memory storage and default limits.
    pub fn new(hmac_secret: impl Into<String>, ws_password: impl Into<String>) -> Self {
        Self {
            hmac_secret: hmac_secret.into(),
            ws_password: ws_password.into(),
            db: DbConfig::memory(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            bus_data_dir: None,
            broadcast_write_timeout: Duration::from_millis(5000),
            agent_idle_timeout: None,
        }
    }

    /// Read `HMAC_SECRET`, `WS_PASSWORD`, `DB`, `BIND_ADDR`, `BUS_DATA_DIR`,
    /// `BROADCAST_WRITE_TIMEOUT_MS` and `AGENT_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let hmac_secret = var("HMAC_SECRET").ok_or(ConfigError::Missing("HMAC_SECRET"))?;
        let ws_password = var("WS_PASSWORD").ok_or(ConfigError::Missing("WS_PASSWORD"))?;
        // Heartbeats repeat the password on the same channel as acks.
        if JobId::parse(&ws_password).is_ok() {
            return Err(ConfigError::Invalid {
                name: "WS_PASSWORD",
                reason: "must not be a job id".to_string(),
            });
        }
        let mut config = Self::new(hmac_secret, ws_password);

        if let Some(endpoint) = var("DB") {
            config.db = DbConfig::endpoint(endpoint);
        }

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    name: "BIND_ADDR",
                    reason: e.to_string(),
                }
            })?;
        }

        config.bus_data_dir = var("BUS_DATA_DIR").map(PathBuf::from);

        if let Some(ms) = var("BROADCAST_WRITE_TIMEOUT_MS") {
            let ms = parse_u64("BROADCAST_WRITE_TIMEOUT_MS", &ms)?;
            config.broadcast_write_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = var("AGENT_IDLE_TIMEOUT_SECS") {
            let secs = parse_u64("AGENT_IDLE_TIMEOUT_SECS", &secs)?;
            config.agent_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
