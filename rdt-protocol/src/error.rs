//! Transfer errors

use crate::config::ConfigError;
use crate::frame::FrameError;
use crate::sequence::SeqNumber;
use rdt_io::ChannelError;
use std::io;
use thiserror::Error;

/// Errors that abort a transfer
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Frame {seq} timed out {timeouts} times in a row")]
    RetryBudgetExhausted { seq: SeqNumber, timeouts: u32 },

    #[error("Failed to read byte source: {0}")]
    Source(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Frame encoding failed: {0}")]
    Frame(#[from] FrameError),
}
