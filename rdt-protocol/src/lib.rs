//! RDT Protocol Core Implementation
//!
//! This crate implements reliable, in-order byte delivery over a lossy
//! datagram channel: the frame codec, byte-numbered cyclic sequence space,
//! RTT/RTO estimation, slow start congestion control, and the sender and
//! receiver state machines for the four ARQ variants (stop-and-wait,
//! sliding window, flow control, congestion control).

pub mod buffer;
pub mod config;
pub mod congestion;
pub mod error;
pub mod frame;
pub mod receiver;
pub mod rtt;
pub mod sender;
pub mod sequence;
pub mod stats;
pub mod window;

pub use buffer::{BufferError, InsertOutcome, ReceiveBuffer};
pub use config::{ArqConfig, ArqMode, ArqPolicy, ConfigError};
pub use congestion::{CongestionController, CongestionMode, CongestionStats, WindowPolicy};
pub use error::TransferError;
pub use frame::{ControlMessage, Frame, FrameCodec, FrameError, FrameFlag, HeaderMode};
pub use receiver::{BatchReport, Receiver};
pub use rtt::RttEstimator;
pub use sender::{send, Sender, StepOutcome};
pub use sequence::{SeqNumber, SeqSpace};
pub use stats::{ReceiverStats, TransferStats};
pub use window::{EntryStatus, InFlightEntry, SendWindow};
