//! RDT - Reliable Data Transfer
//!
//! High-level Rust API for reliable byte-stream delivery over lossy
//! datagram channels.

pub use rdt_io as io;
pub use rdt_protocol as protocol;

// Re-export commonly used types
pub use io::{Channel, ChannelError, UdpChannel};
pub use protocol::{
    send, ArqConfig, ArqMode, Receiver, ReceiverStats, Sender, SeqNumber, TransferError,
    TransferStats,
};
