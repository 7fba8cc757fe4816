//! In-memory lossy datagram link
//!
//! A [`MemoryLink`] connects any number of [`MemoryChannel`] endpoints, each
//! identified by a socket address. Every datagram is delayed by a fixed
//! latency measured on a shared [`Clock`], and a user supplied filter decides
//! per datagram whether it is delivered, dropped or duplicated. With a
//! [`ManualClock`](crate::time::ManualClock) a complete transfer can be
//! replayed deterministically on a single thread.

use crate::channel::{Channel, ChannelError};
use crate::time::Clock;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fate of a datagram handed to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deliver after the link latency
    Deliver,
    /// Lose the datagram
    Drop,
    /// Deliver two copies
    Duplicate,
}

/// Per-datagram filter: `(from, to, datagram) -> verdict`
pub type Filter = Box<dyn FnMut(SocketAddr, SocketAddr, &[u8]) -> Verdict + Send>;

/// Link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Datagrams handed to the link
    pub submitted: u64,
    /// Datagrams lost by the filter
    pub dropped: u64,
    /// Extra copies injected by the filter
    pub duplicated: u64,
    /// Datagrams sent to an address with no endpoint
    pub unroutable: u64,
    /// Datagrams handed to a receiving endpoint
    pub delivered: u64,
}

struct InFlight {
    from: SocketAddr,
    deliver_at: Instant,
    bytes: Vec<u8>,
}

struct LinkState {
    inboxes: HashMap<SocketAddr, VecDeque<InFlight>>,
    filter: Option<Filter>,
    stats: LinkStats,
}

/// Shared medium connecting [`MemoryChannel`] endpoints
#[derive(Clone)]
pub struct MemoryLink {
    state: Arc<Mutex<LinkState>>,
    clock: Arc<dyn Clock + Send + Sync>,
    latency: Duration,
}

impl MemoryLink {
    /// Create a link with a one-way `latency`, timed by `clock`
    pub fn new<K>(latency: Duration, clock: K) -> Self
    where
        K: Clock + Send + Sync + 'static,
    {
        MemoryLink {
            state: Arc::new(Mutex::new(LinkState {
                inboxes: HashMap::new(),
                filter: None,
                stats: LinkStats::default(),
            })),
            clock: Arc::new(clock),
            latency,
        }
    }

    /// Attach a new endpoint at `addr`
    ///
    /// Attaching the same address twice replaces the earlier inbox.
    pub fn endpoint(&self, addr: SocketAddr) -> MemoryChannel {
        self.state.lock().inboxes.insert(addr, VecDeque::new());
        MemoryChannel {
            addr,
            link: self.clone(),
        }
    }

    /// Install the per-datagram filter, replacing any previous one
    pub fn set_filter<F>(&self, filter: F)
    where
        F: FnMut(SocketAddr, SocketAddr, &[u8]) -> Verdict + Send + 'static,
    {
        self.state.lock().filter = Some(Box::new(filter));
    }

    /// Remove the filter; every datagram is delivered afterwards
    pub fn clear_filter(&self) {
        self.state.lock().filter = None;
    }

    /// Get link counters
    pub fn stats(&self) -> LinkStats {
        self.state.lock().stats
    }

    /// One-way latency
    pub fn latency(&self) -> Duration {
        self.latency
    }

    fn submit(&self, from: SocketAddr, to: SocketAddr, datagram: &[u8]) {
        let deliver_at = self.clock.now() + self.latency;
        let mut state = self.state.lock();
        let state = &mut *state;
        state.stats.submitted += 1;

        let verdict = match state.filter.as_mut() {
            Some(filter) => filter(from, to, datagram),
            None => Verdict::Deliver,
        };

        let Some(inbox) = state.inboxes.get_mut(&to) else {
            state.stats.unroutable += 1;
            return;
        };

        let copies = match verdict {
            Verdict::Drop => {
                state.stats.dropped += 1;
                0
            }
            Verdict::Deliver => 1,
            Verdict::Duplicate => {
                state.stats.duplicated += 1;
                2
            }
        };

        for _ in 0..copies {
            inbox.push_back(InFlight {
                from,
                deliver_at,
                bytes: datagram.to_vec(),
            });
        }
    }

    fn poll(&self, at: SocketAddr, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let state = &mut *state;
        let inbox = state.inboxes.get_mut(&at).ok_or(ChannelError::Closed)?;

        // Fixed latency keeps every inbox ordered by delivery time
        match inbox.front() {
            Some(head) if head.deliver_at <= now => {}
            _ => return Ok(None),
        }
        let Some(datagram) = inbox.pop_front() else {
            return Ok(None);
        };

        let n = datagram.bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram.bytes[..n]);
        state.stats.delivered += 1;
        Ok(Some((n, datagram.from)))
    }

    fn detach(&self, addr: SocketAddr) {
        self.state.lock().inboxes.remove(&addr);
    }
}

/// One endpoint of a [`MemoryLink`]
///
/// Dropping the endpoint detaches its address; datagrams sent to it
/// afterwards are counted as unroutable.
pub struct MemoryChannel {
    addr: SocketAddr,
    link: MemoryLink,
}

impl MemoryChannel {
    /// Address of this endpoint
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Channel for MemoryChannel {
    fn send_to(&mut self, datagram: &[u8], dest: SocketAddr) -> Result<(), ChannelError> {
        self.link.submit(self.addr, dest, datagram);
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, ChannelError> {
        self.link.poll(self.addr, buf)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.link.detach(self.addr);
    }
}
