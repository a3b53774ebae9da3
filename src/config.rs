//! Application configuration.
//!
//! Read from a TOML file, every key is optional and falls back to a default value.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50051;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Size of connection handling pool, bounds the number of concurrent connections.
    pub workers: usize,
    /// How long an event stream waits for a session event before checking its peer.
    pub event_poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: 10,
            event_poll_interval_ms: 1000,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Read and write timeout for a single request on the control connection.
    pub request_timeout_ms: u64,
    pub listener_join_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 3000,
            request_timeout_ms: 10000,
            listener_join_timeout_ms: 2000,
        }
    }
}

impl ClientConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn listener_join_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_join_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Stack size of session execution threads, in bytes.
    pub stack_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stack_size: crate::debugger::DEFAULT_STACK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter in `env_logger` syntax, `RUST_LOG` takes precedence.
    pub level: String,
    /// Write logs into a file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

/// Location of configuration file used when no explicit path given.
pub fn default_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".config").join("specter").join("config.toml"))
}

impl Config {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from `path`, or from the default location if no path given.
    ///
    /// A missing file at the default location is not an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read configuration {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse configuration {}", path.display()))
    }
}

/// Read-only configuration (set only once, at application start).
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Set application configuration.
pub fn set(config: Config) -> anyhow::Result<()> {
    CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("configuration already set"))
}

/// Return application configuration, defaults are used if nothing was set.
pub fn current() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.address(), "127.0.0.1:50051");
        assert_eq!(config.server.workers, 10);
        assert_eq!(config.server.event_poll_interval(), Duration::from_secs(1));
        assert_eq!(config.client.listener_join_timeout(), Duration::from_secs(2));
        assert_eq!(config.client.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.session.stack_size, 16 * 1024 * 1024);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_partial_config() {
        let config = Config::parse(
            r#"
            [server]
            port = 6000
            workers = 4

            [log]
            level = "debug"
            file = "/tmp/specter.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.address(), "127.0.0.1:6000");
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.client.port, DEFAULT_PORT);
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/specter.log")));
    }

    #[test]
    fn test_malformed_config() {
        assert!(Config::parse("[server]\nport = \"x\"").is_err());
        assert!(Config::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
    }
}
