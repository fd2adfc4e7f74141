//! Configuration loading.
//!
//! Settings come from an optional TOML file, then command-line flags
//! override individual values:
//!
//! ```toml
//! [server]
//! host = "irc.example.net"
//! port = 6667
//!
//! [bot]
//! nickname = "orderbot"
//! channel = "#orderbot"
//! workers = 10
//!
//! [log]
//! verbosity = 1          # 0 = errors, 1 = info, 2 = debug
//! file = "orderbot.log"
//! max_bytes = 1048576    # rotate past this size
//! backups = 2
//! ```

use crate::connection::{ConnectionOptions, DEFAULT_WORKERS};
use crate::logging::{DEFAULT_LOG_BACKUPS, DEFAULT_LOG_MAX_BYTES};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Bot configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub log: LogConfig,
}

/// IRC server to connect to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
        }
    }
}

/// Identity and behavior of the bot.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BotConfig {
    /// Base nickname; collisions derive `<nickname>_<n>` from it
    pub nickname: String,
    /// Real name sent with USER, defaults to the nickname
    pub realname: Option<String>,
    /// Channel joined after registration
    pub channel: String,
    /// Concurrent handler tasks
    pub workers: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nickname: "orderbot".to_string(),
            realname: None,
            channel: "#orderbot".to_string(),
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Logging verbosity and destination.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// 0 = errors only, 1 = info, 2 = debug
    pub verbosity: u8,
    /// Append log output to this file
    pub file: Option<PathBuf>,
    /// Size at which the log file is rotated
    pub max_bytes: u64,
    /// Rotated files kept as `<file>.1` .. `<file>.<backups>`
    pub backups: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: 1,
            file: None,
            max_bytes: DEFAULT_LOG_MAX_BYTES,
            backups: DEFAULT_LOG_BACKUPS,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cli {
    Run(Config),
    Help,
    Version,
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the process arguments.
    pub fn from_args() -> Result<Cli, ConfigError> {
        Self::parse_args(std::env::args().skip(1))
    }

    /// Parses command-line arguments (without the program name).
    ///
    /// `--config` is applied first; every other flag overrides the file.
    pub fn parse_args<I>(args: I) -> Result<Cli, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path: Option<PathBuf> = None;
        let mut overrides = Overrides::default();
        let mut verbose = 0u8;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" => return Ok(Cli::Help),
                "--version" | "-V" => return Ok(Cli::Version),
                "--verbose" | "-v" => verbose = verbose.saturating_add(1),
                "-vv" => verbose = verbose.saturating_add(2),
                "--config" | "-C" => {
                    config_path = Some(PathBuf::from(value_for(&arg, args.next())?));
                }
                "--server" | "-s" => overrides.host = Some(value_for(&arg, args.next())?),
                "--port" | "-p" => overrides.port = Some(value_for(&arg, args.next())?),
                "--nick" | "-n" => overrides.nickname = Some(value_for(&arg, args.next())?),
                "--channel" | "-c" => overrides.channel = Some(value_for(&arg, args.next())?),
                "--workers" | "-w" => overrides.workers = Some(value_for(&arg, args.next())?),
                "--log-file" => overrides.log_file = Some(value_for(&arg, args.next())?),
                other => {
                    return Err(ConfigError::Invalid(format!("unknown argument: {}", other)));
                }
            }
        }

        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Config::default(),
        };
        overrides.apply(&mut config)?;

        if verbose > 0 {
            config.log.verbosity = verbose.min(2);
        }

        config.validate()?;
        Ok(Cli::Run(config))
    }

    /// Checks values no connection could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.nickname.trim().is_empty() {
            return Err(ConfigError::Invalid("nickname must not be empty".to_string()));
        }
        if self.bot.nickname.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "nickname must not contain spaces: {:?}",
                self.bot.nickname
            )));
        }
        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server host must not be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port must not be 0".to_string()));
        }
        if self.bot.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.log.max_bytes == 0 {
            return Err(ConfigError::Invalid("log max_bytes must not be 0".to_string()));
        }
        Ok(())
    }

    /// Options for the connection manager.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            workers: self.bot.workers,
            realname: self
                .bot
                .realname
                .clone()
                .unwrap_or_else(|| self.bot.nickname.clone()),
        }
    }
}

/// Command-line values that replace file values.
#[derive(Debug, Default)]
struct Overrides {
    host: Option<String>,
    port: Option<String>,
    nickname: Option<String>,
    channel: Option<String>,
    workers: Option<String>,
    log_file: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid port number: {}", port)))?;
        }
        if let Some(nickname) = self.nickname {
            config.bot.nickname = nickname;
        }
        if let Some(channel) = self.channel {
            config.bot.channel = channel;
        }
        if let Some(workers) = self.workers {
            config.bot.workers = workers
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid worker count: {}", workers)))?;
        }
        if let Some(file) = self.log_file {
            config.log.file = Some(PathBuf::from(file));
        }
        Ok(())
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::Invalid(format!("{} requires a value", flag)))
}
