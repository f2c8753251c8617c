//! # Configuration Management Module
//!
//! TOML configuration for the rpgchat server.
//!
//! ## Features
//!
//! - **Structured Configuration**: Type-safe sections with serde serialization
//! - **Defaults**: Every section and field has a default, so a partial file is enough
//! - **Validation**: [Config::validate] rejects values the server cannot run with
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - Listener address, server name, duplicate-login policy
//! - [`WorldConfig`] - Grid dimensions and walk pacing
//! - [`RateLimitConfig`] - Per-session command token bucket
//! - [`TravelConfig`] - Travel token secret and lifetime
//! - [`StorageConfig`] - Map file location
//! - [`LoggingConfig`] - Log level and log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rpgchat::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Create default configuration
//!     Config::create_default("config.toml").await?;
//!
//!     // Load configuration from file
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on: {}", config.server.bind);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:6000"
//! server_name = "current_server_name"
//! duplicate_login = "reject"
//!
//! [world]
//! width = 25
//! height = 25
//! step_delay_ms = 3000
//!
//! [rate_limit]
//! max_tokens = 5
//! fill_interval_ms = 1000
//!
//! [travel]
//! secret = "change-me"
//! token_ttl_secs = 3600
//!
//! [storage]
//! map_file = "map.json"
//!
//! [logging]
//! level = "info"
//! file = "rpgchat.log"
//! security_file = "rpgchat-security.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::world::grid::MAX_DIMENSION;
use crate::world::{DuplicateLoginPolicy, WorldSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub travel: TravelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Name embedded in travel tokens minted here.
    pub server_name: String,
    pub duplicate_login: DuplicateLoginPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:6000".to_string(),
            server_name: "current_server_name".to_string(),
            duplicate_login: DuplicateLoginPolicy::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Used only when no map file exists yet.
    pub width: i32,
    pub height: i32,
    /// Delay before each step of a `/moveTo` walk.
    pub step_delay_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 25,
            height: 25,
            step_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_tokens: u32,
    pub fill_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 5,
            fill_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    /// Shared HS256 secret; every server in a travel network must use the same one.
    pub secret: String,
    pub token_ttl_secs: u64,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub map_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            map_file: "map.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("rpgchat.log".to_string()),
            security_file: Some("rpgchat-security.log".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(anyhow!("server.bind must not be empty"));
        }
        if self.server.server_name.trim().is_empty() {
            return Err(anyhow!("server.server_name must not be empty"));
        }
        let side = 1..=MAX_DIMENSION;
        if !side.contains(&self.world.width) || !side.contains(&self.world.height) {
            return Err(anyhow!(
                "world dimensions must be between 1 and {} (got {}x{})",
                MAX_DIMENSION,
                self.world.width,
                self.world.height
            ));
        }
        if self.rate_limit.max_tokens == 0 {
            return Err(anyhow!("rate_limit.max_tokens must be at least 1"));
        }
        if self.travel.secret.is_empty() {
            return Err(anyhow!("travel.secret must not be empty"));
        }
        if self.storage.map_file.trim().is_empty() {
            return Err(anyhow!("storage.map_file must not be empty"));
        }
        Ok(())
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.world.step_delay_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.travel.token_ttl_secs)
    }

    /// Settings handed to the world at startup.
    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            server_name: self.server.server_name.clone(),
            duplicate_login: self.server.duplicate_login,
            step_delay: self.step_delay(),
            max_tokens: self.rate_limit.max_tokens,
            fill_interval: Duration::from_millis(self.rate_limit.fill_interval_ms),
        }
    }
}
