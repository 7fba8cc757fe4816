//! UDP channel for RDT
//!
//! Non-blocking UDP socket implementing [`Channel`].

use crate::channel::{Channel, ChannelError};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

/// Non-blocking UDP socket
///
/// The socket is closed when the channel is dropped, on every exit path of
/// the transfer that owns it.
pub struct UdpChannel {
    inner: UdpSocket,
}

impl UdpChannel {
    /// Create a new channel bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, ChannelError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;

        // Readiness is checked by polling, never by blocking
        socket.set_nonblocking(true)?;

        Ok(UdpChannel {
            inner: socket.into(),
        })
    }

    /// Bind an ephemeral port on the unspecified address of the same family
    /// as `peer`, or on loopback when `peer` is a loopback address.
    pub fn bind_for(peer: SocketAddr) -> Result<Self, ChannelError> {
        let local: SocketAddr = match (peer.is_ipv4(), peer.ip().is_loopback()) {
            (true, true) => ([127, 0, 0, 1], 0).into(),
            (true, false) => ([0, 0, 0, 0], 0).into(),
            (false, true) => (std::net::Ipv6Addr::LOCALHOST, 0).into(),
            (false, false) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        Self::bind(local)
    }

    /// Get the local address this channel is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        Ok(self.inner.local_addr()?)
    }
}

impl Channel for UdpChannel {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), ChannelError> {
        match self.inner.send_to(datagram, dest) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tracing::debug!("Send queue full, datagram to {} dropped", dest);
                Ok(())
            }
            Err(e) => Err(ChannelError::Io(e)),
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError> {
        match self.inner.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            // ICMP port unreachable from an earlier send surfaces here on some
            // platforms; for a datagram protocol that is just loss.
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                ) =>
            {
                tracing::debug!("Ignoring ICMP error on receive: {}", e);
                Ok(None)
            }
            Err(e) => Err(ChannelError::Io(e)),
        }
    }
}
