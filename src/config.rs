//! Client configuration from command-line flags with environment fallbacks.

use std::time::Duration;

use clap::Parser;

pub const DEFAULT_HEARTBEAT_MS: u64 = 5000;
pub const DEFAULT_USER_AGENT: &str = concat!("tether/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("target must be a ws:// or wss:// URL, got `{0}`")]
    InvalidTarget(String),
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeat,
}

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Topic-addressed remote procedure client over one websocket")]
pub struct Cli {
    /// Connection target, `ws[s]://host/path?[$]<base64 project>`.
    #[arg(long, env = "TETHER_URL")]
    pub url: String,

    #[arg(long, env = "TETHER_HEARTBEAT_MS", default_value_t = DEFAULT_HEARTBEAT_MS)]
    pub heartbeat_ms: u64,

    #[arg(long, env = "TETHER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub target: String,
    pub heartbeat: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// Config for `target` with default heartbeat and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTarget`] for non-websocket URLs.
    pub fn new(target: impl Into<String>) -> Result<Self, ConfigError> {
        let target = validate_target(target.into())?;
        Ok(Self {
            target,
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }
}

impl Cli {
    /// Validate flags into a [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a non-websocket target or a zero heartbeat.
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        if self.heartbeat_ms == 0 {
            return Err(ConfigError::ZeroHeartbeat);
        }
        Ok(ClientConfig {
            target: validate_target(self.url)?,
            heartbeat: Duration::from_millis(self.heartbeat_ms),
            user_agent: self.user_agent,
        })
    }
}

fn validate_target(target: String) -> Result<String, ConfigError> {
    let trimmed = target.trim();
    if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidTarget(target))
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
