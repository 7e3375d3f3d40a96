use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP API port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket listener port
    pub ws_port: Option<u16>,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// JWT secret key
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Maximum number of workspace snapshots held in the cache
    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,

    /// Idle time after which a cached snapshot is evicted
    #[serde(default = "default_cache_time_to_idle_secs")]
    pub cache_time_to_idle_secs: u64,

    /// Upper bound for a single cache read or write
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,

    /// Upper bound for writing a drained snapshot to the database
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// Upper bound for reading the upgrade request and completing the handshake
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Relay messages back to the connection that sent them
    #[serde(default)]
    pub echo_to_sender: bool,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The WebSocket port, defaulting to the port right after the HTTP one
    pub fn websocket_port(&self) -> u16 {
        self.ws_port.unwrap_or_else(|| self.port.saturating_add(1))
    }

    pub fn websocket_address(&self) -> String {
        format!("{}:{}", self.host, self.websocket_port())
    }

    pub fn cache_time_to_idle(&self) -> Duration {
        Duration::from_secs(self.cache_time_to_idle_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_port: None,
            environment: default_environment(),
            cloud_auth_jwt_secret: None,
            db_url: None,
            cache_max_capacity: default_cache_max_capacity(),
            cache_time_to_idle_secs: default_cache_time_to_idle_secs(),
            cache_timeout_ms: default_cache_timeout_ms(),
            persist_timeout_ms: default_persist_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            echo_to_sender: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_cache_max_capacity() -> u64 {
    100_000
}

fn default_cache_time_to_idle_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_timeout_ms() -> u64 {
    2_000
}

fn default_persist_timeout_ms() -> u64 {
    10_000
}

fn default_handshake_timeout_ms() -> u64 {
    5_000
}
