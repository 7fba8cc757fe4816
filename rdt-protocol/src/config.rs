//! Protocol configuration
//!
//! One [`ArqConfig`] drives both endpoints. The four ARQ variants are a
//! single state machine parameterized by an [`ArqPolicy`] derived from
//! [`ArqMode`].

use crate::congestion::WindowPolicy;
use crate::frame::{HeaderMode, MAX_FRAME_SIZE};
use crate::sequence::SeqSpace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(
        "Sender span ({span}) plus receiver window ({receiver_window}) exceeds maxseqnum ({maxseqnum})"
    )]
    SequenceSpaceTooSmall {
        span: usize,
        receiver_window: usize,
        maxseqnum: u32,
    },

    #[error("Unknown ARQ mode: {0}")]
    UnknownMode(String),
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// ARQ protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArqMode {
    /// One frame in flight at a time
    StopAndWait,
    /// Fixed window, expected-next headers
    SlidingWindow,
    /// Fixed window bounded by the receiver's advertised window
    FlowControl,
    /// Slow start and congestion avoidance
    #[default]
    CongestionControl,
}

impl ArqMode {
    /// Configuration name of the mode
    pub fn name(self) -> &'static str {
        match self {
            ArqMode::StopAndWait => "stop-and-wait",
            ArqMode::SlidingWindow => "sliding-window",
            ArqMode::FlowControl => "flow-control",
            ArqMode::CongestionControl => "congestion-control",
        }
    }

    /// Header layout used on the wire in this mode
    pub fn header_mode(self) -> HeaderMode {
        match self {
            ArqMode::StopAndWait | ArqMode::SlidingWindow => HeaderMode::ExpectedNext,
            ArqMode::FlowControl | ArqMode::CongestionControl => HeaderMode::KeepaliveFlag,
        }
    }
}

impl fmt::Display for ArqMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArqMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop-and-wait" => Ok(ArqMode::StopAndWait),
            "sliding-window" => Ok(ArqMode::SlidingWindow),
            "flow-control" => Ok(ArqMode::FlowControl),
            "congestion-control" => Ok(ArqMode::CongestionControl),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Behaviour selected by an [`ArqMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArqPolicy {
    /// Meaning of the secondary header field
    pub header_mode: HeaderMode,
    /// How the sender window is sized
    pub window: WindowPolicy,
    /// Bound in-flight bytes by the advertised receiver window
    pub flow_control: bool,
}

/// Protocol configuration shared by sender and receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArqConfig {
    /// Maximum payload bytes per frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Size of the cyclic sequence space
    #[serde(default = "default_maxseqnum")]
    pub maxseqnum: u32,
    /// Retransmission timeout before the first RTT sample
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Lower RTO clamp
    #[serde(default = "default_rto_min_ms")]
    pub rto_min_ms: u64,
    /// Upper RTO clamp
    #[serde(default = "default_rto_max_ms")]
    pub rto_max_ms: u64,
    /// Fixed window for the sliding-window and flow-control modes
    #[serde(default = "default_sender_window_size")]
    pub sender_window_size: usize,
    /// Hard cap on bytes in flight in every mode
    #[serde(default = "default_max_window_size")]
    pub max_window_size: usize,
    /// Receive buffer size (Wr)
    #[serde(default = "default_receiver_window_size")]
    pub receiver_window_size: usize,
    /// Idle time after which the sender probes with a keepalive
    #[serde(default = "default_keepalive_timeout_ms")]
    pub keepalive_timeout_ms: u64,
    /// Honour the receiver's advertised window (flow and congestion modes)
    #[serde(default = "default_use_flow_control")]
    pub use_flow_control: bool,
    /// ARQ variant
    #[serde(default)]
    pub arq_mode: ArqMode,
    /// Abort after a frame times out more than this many times in a row
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Data frames processed per receiver batch
    #[serde(default = "default_receive_batch")]
    pub receive_batch: usize,
    /// Sleep between idle loop iterations
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    /// Periodic progress report interval
    #[serde(default)]
    pub report_interval_secs: Option<u64>,
    /// Emit per-frame trace events
    #[serde(default)]
    pub debug: bool,
}

fn default_frame_size() -> usize {
    1024
}

fn default_maxseqnum() -> u32 {
    1 << 20
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_rto_min_ms() -> u64 {
    20
}

fn default_rto_max_ms() -> u64 {
    10_000
}

fn default_sender_window_size() -> usize {
    16 * 1024
}

fn default_max_window_size() -> usize {
    64 * 1024
}

fn default_receiver_window_size() -> usize {
    64 * 1024
}

fn default_keepalive_timeout_ms() -> u64 {
    500
}

fn default_use_flow_control() -> bool {
    true
}

fn default_receive_batch() -> usize {
    64
}

fn default_poll_interval_us() -> u64 {
    200
}

impl Default for ArqConfig {
    fn default() -> Self {
        ArqConfig {
            frame_size: default_frame_size(),
            maxseqnum: default_maxseqnum(),
            timeout_ms: default_timeout_ms(),
            rto_min_ms: default_rto_min_ms(),
            rto_max_ms: default_rto_max_ms(),
            sender_window_size: default_sender_window_size(),
            max_window_size: default_max_window_size(),
            receiver_window_size: default_receiver_window_size(),
            keepalive_timeout_ms: default_keepalive_timeout_ms(),
            use_flow_control: default_use_flow_control(),
            arq_mode: ArqMode::default(),
            max_retries: None,
            receive_batch: default_receive_batch(),
            poll_interval_us: default_poll_interval_us(),
            report_interval_secs: None,
            debug: false,
        }
    }
}

impl ArqConfig {
    /// Check every field and the sequence space constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_size == 0 || self.frame_size > MAX_FRAME_SIZE {
            return Err(invalid(
                "frame_size",
                format!("must be in 1..={}", MAX_FRAME_SIZE),
            ));
        }
        if self.maxseqnum < 2 {
            return Err(invalid("maxseqnum", "must be at least 2"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be positive"));
        }
        if self.rto_min_ms == 0 || self.rto_min_ms > self.rto_max_ms {
            return Err(invalid("rto_min_ms", "must be positive and <= rto_max_ms"));
        }
        if self.max_window_size < self.frame_size {
            return Err(invalid("max_window_size", "must hold at least one frame"));
        }
        if matches!(self.arq_mode, ArqMode::SlidingWindow | ArqMode::FlowControl)
            && self.sender_window_size < self.frame_size
        {
            return Err(invalid("sender_window_size", "must hold at least one frame"));
        }
        if self.receiver_window_size < self.frame_size {
            return Err(invalid(
                "receiver_window_size",
                "must hold at least one frame",
            ));
        }
        if self.receiver_window_size > u32::MAX as usize {
            return Err(invalid("receiver_window_size", "must fit in 32 bits"));
        }
        if self.receive_batch == 0 {
            return Err(invalid("receive_batch", "must be positive"));
        }
        if self.keepalive_timeout_ms == 0 {
            return Err(invalid("keepalive_timeout_ms", "must be positive"));
        }
        if self.report_interval_secs == Some(0) {
            return Err(invalid("report_interval_secs", "must be positive"));
        }

        let span = self.sender_span();
        if span as u64 + self.receiver_window_size as u64 > self.maxseqnum as u64 {
            return Err(ConfigError::SequenceSpaceTooSmall {
                span,
                receiver_window: self.receiver_window_size,
                maxseqnum: self.maxseqnum,
            });
        }

        Ok(())
    }

    /// Behaviour implied by the ARQ mode
    pub fn policy(&self) -> ArqPolicy {
        match self.arq_mode {
            ArqMode::StopAndWait => ArqPolicy {
                header_mode: HeaderMode::ExpectedNext,
                window: WindowPolicy::Fixed(self.frame_size),
                flow_control: false,
            },
            ArqMode::SlidingWindow => ArqPolicy {
                header_mode: HeaderMode::ExpectedNext,
                window: WindowPolicy::Fixed(self.sender_window_size),
                flow_control: false,
            },
            ArqMode::FlowControl => ArqPolicy {
                header_mode: HeaderMode::KeepaliveFlag,
                window: WindowPolicy::Fixed(self.sender_window_size),
                flow_control: self.use_flow_control,
            },
            ArqMode::CongestionControl => ArqPolicy {
                header_mode: HeaderMode::KeepaliveFlag,
                window: WindowPolicy::SlowStart,
                flow_control: self.use_flow_control,
            },
        }
    }

    /// Largest number of bytes the sender can ever have in flight
    pub fn sender_span(&self) -> usize {
        let window = match self.policy().window {
            WindowPolicy::Fixed(size) => size,
            WindowPolicy::SlowStart => self.max_window_size,
        };
        window.min(self.max_window_size)
    }

    /// Sequence space of the session
    ///
    /// # Panics
    /// Panics if `maxseqnum` is below 2; call [`validate`](Self::validate)
    /// first.
    pub fn space(&self) -> SeqSpace {
        SeqSpace::new(self.maxseqnum)
    }

    /// Retransmission timeout before the first RTT sample
    pub fn rto_initial(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Lower RTO clamp
    pub fn rto_min(&self) -> Duration {
        Duration::from_millis(self.rto_min_ms)
    }

    /// Upper RTO clamp
    pub fn rto_max(&self) -> Duration {
        Duration::from_millis(self.rto_max_ms)
    }

    /// Keepalive idle timeout
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    /// Sleep between idle loop iterations
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Periodic report interval, if enabled
    pub fn report_interval(&self) -> Option<Duration> {
        self.report_interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        ArqConfig::default().validate().unwrap();
    }

    #[test]
    fn test_mode_names() {
        for mode in [
            ArqMode::StopAndWait,
            ArqMode::SlidingWindow,
            ArqMode::FlowControl,
            ArqMode::CongestionControl,
        ] {
            assert_eq!(mode.name().parse::<ArqMode>().unwrap(), mode);
        }
        assert!(matches!(
            "go-back-n".parse::<ArqMode>(),
            Err(ConfigError::UnknownMode(_))
        ));
    }

    #[test]
    fn test_policy_per_mode() {
        let mut config = ArqConfig {
            frame_size: 10,
            sender_window_size: 50,
            ..Default::default()
        };

        config.arq_mode = ArqMode::StopAndWait;
        let policy = config.policy();
        assert_eq!(policy.window, WindowPolicy::Fixed(10));
        assert_eq!(policy.header_mode, HeaderMode::ExpectedNext);
        assert!(!policy.flow_control);

        config.arq_mode = ArqMode::SlidingWindow;
        assert_eq!(config.policy().window, WindowPolicy::Fixed(50));

        config.arq_mode = ArqMode::FlowControl;
        let policy = config.policy();
        assert_eq!(policy.header_mode, HeaderMode::KeepaliveFlag);
        assert!(policy.flow_control);

        config.use_flow_control = false;
        assert!(!config.policy().flow_control);

        config.arq_mode = ArqMode::CongestionControl;
        assert_eq!(config.policy().window, WindowPolicy::SlowStart);
    }

    #[test]
    fn test_sequence_space_constraint() {
        let config = ArqConfig {
            frame_size: 10,
            maxseqnum: 256,
            max_window_size: 200,
            receiver_window_size: 100,
            arq_mode: ArqMode::CongestionControl,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SequenceSpaceTooSmall { span: 200, .. })
        ));

        let config = ArqConfig {
            max_window_size: 100,
            ..config
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_fields() {
        let config = ArqConfig {
            frame_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "frame_size",
                ..
            })
        ));

        let config = ArqConfig {
            receiver_window_size: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ArqConfig {
            rto_min_ms: 500,
            rto_max_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
