use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Environment variable that overrides the configured session secret.
pub const SESSION_SECRET_ENV: &str = "DRIVR_SESSION_SECRET";

/// Development fallback secret. Must be overridden in any production
/// deployment; startup warns loudly when it is still active there.
pub const DEV_SESSION_SECRET: &str = "drivr-dev-secret-change-me";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Controls the `Secure` attribute on the session cookie.
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> Environment {
    Environment::Development
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret the session cookie is sealed with.
    #[serde(default = "default_session_secret")]
    pub secret: String,
    /// Retired secrets still accepted for verification, newest first.
    /// Lets a secret rotation land without logging everyone out.
    #[serde(default)]
    pub previous_secrets: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: default_session_secret(),
            previous_secrets: Vec::new(),
        }
    }
}

fn default_session_secret() -> String {
    DEV_SESSION_SECRET.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the external marketplace API (login, signup, instructor
    /// lookup). Consumed, never implemented, by this service.
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    /// Request timeout for upstream calls in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

fn default_upstream_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        if let Ok(secret) = std::env::var(SESSION_SECRET_ENV) {
            if !secret.is_empty() {
                config.session.secret = secret;
            }
        }

        Ok(config)
    }

    /// True when the development fallback secret would be sealing production
    /// cookies.
    pub fn using_dev_secret_in_production(&self) -> bool {
        self.server.environment.is_production() && self.session.secret == DEV_SESSION_SECRET
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            upstream: UpstreamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
