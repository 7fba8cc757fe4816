//! Shared harness for end-to-end transfer tests
//!
//! A [`Transfer`] wires a [`Sender`] and a [`Receiver`] to the two ends of a
//! [`MemoryLink`] and drives both from a single thread with a
//! [`ManualClock`], one millisecond per tick. Every datagram the sender
//! emits is decoded and recorded, and a per-datagram fate closure can drop
//! or duplicate traffic in either direction.

use parking_lot::Mutex;
use rdt_io::{ManualClock, MemoryChannel, MemoryLink, Verdict};
use rdt_protocol::{
    ArqConfig, Frame, FrameCodec, Receiver, Sender, StepOutcome, TransferError, TransferStats,
};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Simulated time per tick
pub const TICK: Duration = Duration::from_millis(1);

/// Address of the sending endpoint
pub fn sender_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 1], 1000))
}

/// Address of the receiving endpoint
pub fn receiver_addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 2], 2000))
}

/// Which way a datagram travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data or keepalive frame
    ToReceiver,
    /// Control message
    ToSender,
}

/// A datagram as seen by the fate closure
#[derive(Debug, Clone)]
pub enum Datagram {
    /// Decoded sender frame
    Frame(Frame),
    /// Control message or anything that failed to decode
    Other(Vec<u8>),
}

/// Sender, receiver and link under a manual clock
pub struct Transfer {
    pub clock: ManualClock,
    pub link: MemoryLink,
    pub sender: Sender<Cursor<Vec<u8>>, MemoryChannel, ManualClock>,
    pub receiver: Receiver<MemoryChannel>,
    /// Bytes handed to the application so far
    pub output: Vec<u8>,
    /// Bytes the application consumes per tick
    pub app_read_size: usize,
    /// Stop consuming while set
    pub paused: bool,
    sent: Arc<Mutex<Vec<Frame>>>,
}

impl Transfer {
    /// Lossless zero-latency transfer of `input`
    pub fn new(input: &[u8], config: ArqConfig) -> Self {
        Self::with_link(input, config, Duration::ZERO, |_, _| Verdict::Deliver)
    }

    /// Transfer over a link with one-way `latency` whose fate is decided
    /// per datagram by `fate`
    pub fn with_link<F>(input: &[u8], config: ArqConfig, latency: Duration, mut fate: F) -> Self
    where
        F: FnMut(Direction, &Datagram) -> Verdict + Send + 'static,
    {
        let clock = ManualClock::new();
        let link = MemoryLink::new(latency, clock.clone());
        let codec = FrameCodec::new(
            config.frame_size,
            config.space(),
            config.arq_mode.header_mode(),
        );

        let sent = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&sent);
        let from_sender = sender_addr();
        link.set_filter(move |from, _to, bytes| {
            if from == from_sender {
                let datagram = match codec.decode_data(bytes) {
                    Ok(frame) => {
                        recorder.lock().push(frame.clone());
                        Datagram::Frame(frame)
                    }
                    Err(_) => Datagram::Other(bytes.to_vec()),
                };
                fate(Direction::ToReceiver, &datagram)
            } else {
                fate(Direction::ToSender, &Datagram::Other(bytes.to_vec()))
            }
        });

        let sender_channel = link.endpoint(sender_addr());
        let receiver_channel = link.endpoint(receiver_addr());

        let receiver = Receiver::new(receiver_channel, &config).unwrap();
        let sender = Sender::new(
            Cursor::new(input.to_vec()),
            sender_channel,
            receiver_addr(),
            config,
            clock.clone(),
        )
        .unwrap();

        Transfer {
            clock,
            link,
            sender,
            receiver,
            output: Vec::new(),
            app_read_size: usize::MAX,
            paused: false,
            sent,
        }
    }

    /// One sender step, one receiver batch, one application read, then
    /// advance the clock
    pub fn tick(&mut self) -> Result<StepOutcome, TransferError> {
        let outcome = self.sender.step()?;
        self.receiver.poll()?;
        if !self.paused {
            let chunk = self.receiver.consume(self.app_read_size);
            self.output.extend_from_slice(&chunk);
        }
        self.clock.advance(TICK);
        Ok(outcome)
    }

    /// Tick until the sender finishes, calling `observe` after each tick
    ///
    /// # Panics
    /// Panics if the transfer is not done within `max_ticks`.
    pub fn run_observed<O>(&mut self, max_ticks: usize, mut observe: O) -> Result<TransferStats, TransferError>
    where
        O: FnMut(&mut Transfer),
    {
        for _ in 0..max_ticks {
            let outcome = self.tick()?;
            observe(self);
            if outcome == StepOutcome::Finished {
                self.drain();
                return Ok(self.sender.stats().clone());
            }
        }
        panic!("transfer did not finish within {} ticks", max_ticks);
    }

    /// Tick until the sender finishes
    pub fn run(&mut self, max_ticks: usize) -> Result<TransferStats, TransferError> {
        self.run_observed(max_ticks, |_| {})
    }

    /// Hand everything left in the receive buffer to the application
    pub fn drain(&mut self) {
        while self.receiver.available() > 0 {
            let chunk = self.receiver.consume(usize::MAX);
            self.output.extend_from_slice(&chunk);
        }
    }

    /// Every frame the sender put on the link, in order
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    /// Sequence numbers of the data frames the sender put on the link
    pub fn sent_data_seqs(&self) -> Vec<u32> {
        self.sent
            .lock()
            .iter()
            .filter(|frame| !frame.is_keepalive())
            .map(|frame| frame.seq.as_raw())
            .collect()
    }
}

/// Deterministic test payload
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}
