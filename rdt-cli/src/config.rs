//! Configuration file support for RDT CLI tools
//!
//! A TOML file with an `[arq]` table shared by both tools plus optional
//! `[sender]` and `[receiver]` tables. Command-line flags are applied on
//! top of the file through [`Overrides`].

use rdt::protocol::ArqConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Receiver address
    #[serde(default = "default_receiver_address")]
    pub receiver_address: SocketAddr,
    /// Optional local bind address
    #[serde(default)]
    pub bind: Option<SocketAddr>,
}

fn default_receiver_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            receiver_address: default_receiver_address(),
            bind: None,
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Bytes the application takes from the receive buffer per iteration
    #[serde(default = "default_app_read_size")]
    pub app_read_size: usize,
    /// Exit after this long without traffic once data has arrived
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Chunks queued for the output writer before the application stalls
    #[serde(default = "default_write_queue")]
    pub write_queue: usize,
}

/// Port the receiver listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 6789;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_app_read_size() -> usize {
    4096
}

fn default_idle_timeout() -> u64 {
    5
}

fn default_write_queue() -> usize {
    64
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            listen: default_listen(),
            app_read_size: default_app_read_size(),
            idle_timeout_secs: default_idle_timeout(),
            write_queue: default_write_queue(),
        }
    }
}

impl ReceiverConfig {
    /// Get idle exit timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Protocol parameters
    #[serde(default)]
    pub arq: ArqConfig,
    /// Sender configuration
    pub sender: Option<SenderConfig>,
    /// Receiver configuration
    pub receiver: Option<ReceiverConfig>,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// Per-frame trace events
    pub debug: bool,
    /// Periodic progress reports
    pub verbose: bool,
    /// Port of the receiver, for both tools
    pub receiver_port: Option<u16>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load `path` if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Apply command-line overrides and validate the protocol section
    pub fn apply(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if overrides.debug {
            self.arq.debug = true;
        }
        if overrides.verbose && self.arq.report_interval_secs.is_none() {
            self.arq.report_interval_secs = Some(1);
        }
        if let Some(port) = overrides.receiver_port {
            self.sender
                .get_or_insert_with(SenderConfig::default)
                .receiver_address
                .set_port(port);
            self.receiver
                .get_or_insert_with(ReceiverConfig::default)
                .listen
                .set_port(port);
        }

        if let Some(receiver) = &self.receiver {
            if receiver.app_read_size == 0 {
                return Err(ConfigError::Invalid(
                    "receiver.app_read_size must be positive".to_string(),
                ));
            }
            if receiver.write_queue == 0 {
                return Err(ConfigError::Invalid(
                    "receiver.write_queue must be positive".to_string(),
                ));
            }
        }

        self.arq
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Sender section, or its defaults
    pub fn sender_or_default(&self) -> SenderConfig {
        self.sender.clone().unwrap_or_default()
    }

    /// Receiver section, or its defaults
    pub fn receiver_or_default(&self) -> ReceiverConfig {
        self.receiver.clone().unwrap_or_default()
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            arq: ArqConfig::default(),
            sender: Some(SenderConfig {
                receiver_address: SocketAddr::from(([192, 168, 1, 10], DEFAULT_PORT)),
                bind: None,
            }),
            receiver: None,
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            arq: ArqConfig::default(),
            sender: None,
            receiver: Some(ReceiverConfig::default()),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdt::protocol::ArqMode;

    #[test]
    fn test_example_configs() {
        let sender_config = Config::example_sender();
        assert!(sender_config.sender.is_some());

        let receiver_config = Config::example_receiver();
        assert!(receiver_config.receiver.is_some());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::example_sender();
        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [arq]
            frame_size = 512
            arq_mode = "sliding-window"

            [sender]
            receiver_address = "10.0.0.2:7000"
            "#,
        )
        .unwrap();

        assert_eq!(config.arq.frame_size, 512);
        assert_eq!(config.arq.arq_mode, ArqMode::SlidingWindow);
        assert_eq!(config.arq.maxseqnum, ArqConfig::default().maxseqnum);
        assert_eq!(
            config.sender_or_default().receiver_address,
            "10.0.0.2:7000".parse::<SocketAddr>().unwrap()
        );
        assert!(config.receiver.is_none());
        assert_eq!(config.receiver_or_default().app_read_size, 4096);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = Config::from_toml("[arq]\narq_mode = \"go-back-n\"\n");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply(&Overrides {
                debug: true,
                verbose: true,
                receiver_port: Some(7100),
            })
            .unwrap();

        assert!(config.arq.debug);
        assert_eq!(config.arq.report_interval_secs, Some(1));
        assert_eq!(config.sender_or_default().receiver_address.port(), 7100);
        assert_eq!(config.receiver_or_default().listen.port(), 7100);
    }

    #[test]
    fn test_verbose_keeps_configured_interval() {
        let mut config = Config::default();
        config.arq.report_interval_secs = Some(10);
        config
            .apply(&Overrides {
                verbose: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.arq.report_interval_secs, Some(10));
    }

    #[test]
    fn test_invalid_protocol_section() {
        let mut config = Config::default();
        config.arq.receiver_window_size = 1;
        assert!(matches!(
            config.apply(&Overrides::default()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
