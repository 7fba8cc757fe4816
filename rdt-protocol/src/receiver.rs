//! Receiver state machine
//!
//! The receiver is driven by repeated calls to
//! [`Receiver::receive_batch`]. Each batch stores whatever data frames
//! arrived and then answers with a single cumulative ack carrying the
//! current advertised window. Keepalives are answered immediately. The
//! application drains contiguous bytes with [`Receiver::consume`].

use crate::buffer::{BufferError, ReceiveBuffer};
use crate::config::{ArqConfig, ConfigError};
use crate::frame::{ControlMessage, FrameCodec, FrameFlag};
use crate::sequence::SeqNumber;
use crate::stats::ReceiverStats;
use bytes::Bytes;
use rdt_io::{Channel, ChannelError};
use std::net::SocketAddr;

/// What happened during one [`Receiver::receive_batch`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Data frames decoded from the peer
    pub data_frames: usize,
    /// Data frames stored
    pub accepted: usize,
    /// Stored frames that added no new bytes
    pub duplicates: usize,
    /// Data frames outside the receive window
    pub rejected: usize,
    /// Datagrams that failed to decode
    pub malformed: usize,
    /// Keepalives answered
    pub keepalives: usize,
    /// Datagrams from an address other than the peer
    pub foreign: usize,
    /// Whether the batch ended with an ack
    pub ack_sent: bool,
}

impl BatchReport {
    /// Check if nothing arrived
    pub fn is_empty(&self) -> bool {
        self.data_frames == 0 && self.malformed == 0 && self.keepalives == 0 && self.foreign == 0
    }
}

/// Reliable byte-stream receiver over a [`Channel`]
pub struct Receiver<C> {
    channel: C,
    codec: FrameCodec,
    buffer: ReceiveBuffer,
    peer: Option<SocketAddr>,
    receive_batch: usize,
    debug: bool,
    stats: ReceiverStats,
    recv_buf: Vec<u8>,
}

impl<C: Channel> Receiver<C> {
    /// Create a receiver; the first datagram to arrive picks the peer
    pub fn new(channel: C, config: &ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let space = config.space();
        let codec = FrameCodec::new(config.frame_size, space, config.arq_mode.header_mode());

        Ok(Receiver {
            channel,
            codec,
            buffer: ReceiveBuffer::new(config.receiver_window_size, space),
            peer: None,
            receive_batch: config.receive_batch,
            debug: config.debug,
            stats: ReceiverStats::default(),
            // One spare byte so oversized frames are detected, not truncated
            recv_buf: vec![0; codec.max_datagram_size() + 1],
        })
    }

    /// Run one batch of the configured size
    pub fn poll(&mut self) -> Result<BatchReport, ChannelError> {
        self.receive_batch(self.receive_batch)
    }

    /// Process up to `max_frames` datagrams, then ack once if any data arrived
    pub fn receive_batch(&mut self, max_frames: usize) -> Result<BatchReport, ChannelError> {
        let mut report = BatchReport::default();
        let mut budget = max_frames;

        while budget > 0 {
            let Some((n, from)) = self.channel.try_recv(&mut self.recv_buf)? else {
                break;
            };
            budget -= 1;

            if let Some(peer) = self.peer {
                if peer != from {
                    tracing::warn!("Dropping datagram from {}, peer is {}", from, peer);
                    report.foreign += 1;
                    self.stats.foreign_datagrams += 1;
                    continue;
                }
            }

            let frame = match self.codec.decode_data(&self.recv_buf[..n]) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Dropping malformed frame from {}: {}", from, e);
                    report.malformed += 1;
                    self.stats.malformed_frames += 1;
                    continue;
                }
            };

            // Only a well-formed frame may claim the session
            if self.peer.is_none() {
                tracing::info!("Receiving from {}", from);
                self.peer = Some(from);
            }

            match frame.flag {
                FrameFlag::Keepalive => {
                    report.keepalives += 1;
                    self.stats.keepalives_received += 1;
                    if self.debug {
                        tracing::debug!("KEEPALIVE seq {}", frame.seq);
                    }
                    self.send_ack(from)?;
                }
                FrameFlag::Data => {
                    report.data_frames += 1;
                    self.stats.frames_received += 1;
                    if self.debug {
                        tracing::debug!("RECEIVED seq {} ({} bytes)", frame.seq, frame.payload.len());
                    }

                    match self.buffer.insert(frame.seq, &frame.payload) {
                        Ok(outcome) => {
                            report.accepted += 1;
                            self.stats.frames_accepted += 1;
                            if outcome.is_duplicate() && !frame.payload.is_empty() {
                                report.duplicates += 1;
                                self.stats.duplicate_frames += 1;
                            }
                            if self.debug {
                                tracing::debug!(
                                    "ACCEPTED seq {} ({} new bytes, r_next {})",
                                    frame.seq,
                                    outcome.new_bytes,
                                    self.buffer.cumulative_ack()
                                );
                            }
                        }
                        Err(BufferError::SequenceOutOfWindow { .. }) => {
                            report.rejected += 1;
                            self.stats.frames_rejected += 1;
                            if self.debug {
                                tracing::debug!(
                                    "REJECTED seq {} (window starts at {})",
                                    frame.seq,
                                    self.space_start()
                                );
                            }
                        }
                    }
                }
            }
        }

        if report.data_frames > 0 {
            if let Some(peer) = self.peer {
                self.send_ack(peer)?;
                report.ack_sent = true;
            }
        }

        Ok(report)
    }

    fn send_ack(&mut self, to: SocketAddr) -> Result<(), ChannelError> {
        let msg = ControlMessage {
            cumulative_ack: self.buffer.cumulative_ack(),
            window: self.advertised_window(),
        };
        let bytes = self.codec.encode_control(&msg);
        self.channel.send_to(&bytes, to)?;
        self.stats.acks_sent += 1;

        if self.debug {
            tracing::debug!("ACK {} window {}", msg.cumulative_ack, msg.window);
        }
        Ok(())
    }

    fn space_start(&self) -> SeqNumber {
        self.codec.space().wrap(self.buffer.r_last())
    }

    /// Hand up to `max_bytes` in-order bytes to the application
    pub fn consume(&mut self, max_bytes: usize) -> Bytes {
        let data = self.buffer.consume(max_bytes);
        self.stats.bytes_consumed += data.len() as u64;
        data
    }

    /// Bytes ready for [`consume`](Self::consume)
    pub fn available(&self) -> usize {
        self.buffer.available()
    }

    /// Absolute offset delivered to the application
    pub fn r_last(&self) -> u64 {
        self.buffer.r_last()
    }

    /// Absolute offset of the end of the contiguous run
    pub fn r_next(&self) -> u64 {
        self.buffer.r_next()
    }

    /// Cumulative ack the next control message will carry
    pub fn cumulative_ack(&self) -> SeqNumber {
        self.buffer.cumulative_ack()
    }

    /// Free receive buffer space in bytes
    pub fn advertised_window(&self) -> u32 {
        // Capacity fits in 32 bits, checked by ArqConfig::validate
        self.buffer.window() as u32
    }

    /// The peer, once the first datagram has arrived
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Statistics so far
    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}
