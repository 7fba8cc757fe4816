//! RDT I/O and Platform Abstraction
//!
//! This crate provides the datagram channel abstraction used by the protocol
//! state machines, a non-blocking UDP implementation, an in-memory lossy link
//! for simulation and tests, and the clocks that drive software timers.

pub mod channel;
pub mod memory;
pub mod socket;
pub mod time;

pub use channel::{Channel, ChannelError};
pub use memory::{LinkStats, MemoryChannel, MemoryLink, Verdict};
pub use socket::UdpChannel;
pub use time::{Clock, ManualClock, SystemClock, Timer};
