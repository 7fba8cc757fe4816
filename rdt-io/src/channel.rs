//! Datagram channel abstraction
//!
//! The protocol state machines never touch sockets directly. They talk to a
//! [`Channel`], which offers a send and a non-blocking receive over an
//! unreliable datagram transport.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Channel errors
///
/// Any error returned by a channel is fatal to the transfer using it. Lost,
/// delayed or duplicated datagrams are not errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,

    #[error("Channel is closed")]
    Closed,
}

/// Unreliable, non-blocking datagram transport
pub trait Channel {
    /// Send one datagram to `dest`.
    ///
    /// A datagram the transport could not queue right now is treated as lost,
    /// not as an error.
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), ChannelError>;

    /// Receive one pending datagram into `buf` without blocking.
    ///
    /// Returns `Ok(None)` when nothing is ready. Datagrams longer than `buf`
    /// are truncated, as with UDP.
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), ChannelError> {
        (**self).send_to(datagram, dest)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError> {
        (**self).try_recv(buf)
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), ChannelError> {
        (**self).send_to(datagram, dest)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError> {
        (**self).try_recv(buf)
    }
}
