//! Sender state machine
//!
//! One cooperative loop per transfer. Every [`Sender::step`] reads the
//! clock once and then, in order:
//!
//! 1. fills the window from the byte source up to the current budget
//! 2. transmits every unsent or timed-out entry
//! 3. drains pending control messages
//! 4. checks the single retransmission deadline
//! 5. sends a keepalive if the link has been idle
//!
//! The budget is the congestion (or fixed) window, further bounded by the
//! receiver's advertised window when flow control is enabled.

use crate::config::{ArqConfig, ArqPolicy};
use crate::congestion::{CongestionController, CongestionStats};
use crate::error::TransferError;
use crate::frame::{ControlMessage, FrameCodec, HeaderMode, CONTROL_SIZE};
use crate::rtt::RttEstimator;
use crate::sequence::SeqSpace;
use crate::stats::TransferStats;
use crate::window::{EntryStatus, SendWindow};
use bytes::Bytes;
use rdt_io::{Channel, Clock, SystemClock, Timer};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Result of one [`Sender::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Input exhausted and every byte acknowledged
    Finished,
    /// Something was read, sent, acknowledged or timed out
    Progressed,
    /// Nothing to do until time passes or a datagram arrives
    Idle,
}

/// Reliable byte-stream sender over a [`Channel`]
pub struct Sender<R, C, K = SystemClock> {
    source: R,
    channel: C,
    clock: K,
    dest: SocketAddr,
    config: ArqConfig,
    policy: ArqPolicy,
    codec: FrameCodec,
    space: SeqSpace,
    window: SendWindow,
    rtt: RttEstimator,
    congestion: CongestionController,
    /// Last window advertised by the receiver
    advertised_window: usize,
    /// Offset one past the highest byte ever transmitted
    sent_offset: u64,
    rto_deadline: Option<Instant>,
    last_transmit: Instant,
    report_timer: Option<Timer>,
    started: Instant,
    eof: bool,
    finished: bool,
    stats: TransferStats,
    recv_buf: Vec<u8>,
}

impl<R, C, K> Sender<R, C, K>
where
    R: Read,
    C: Channel,
    K: Clock,
{
    /// Create a sender for one transfer to `dest`
    ///
    /// The receiver is assumed to start with an empty buffer, so the
    /// initial advertised window is `receiver_window_size`.
    pub fn new(
        source: R,
        channel: C,
        dest: SocketAddr,
        config: ArqConfig,
        clock: K,
    ) -> Result<Self, TransferError> {
        config.validate()?;

        let policy = config.policy();
        let space = config.space();
        let now = clock.now();

        tracing::info!(
            "Sending to {} using {} (frame size {}, maxseqnum {})",
            dest,
            config.arq_mode,
            config.frame_size,
            config.maxseqnum
        );

        Ok(Sender {
            source,
            channel,
            dest,
            policy,
            codec: FrameCodec::new(config.frame_size, space, policy.header_mode),
            space,
            window: SendWindow::new(),
            rtt: RttEstimator::new(config.rto_initial(), config.rto_min(), config.rto_max()),
            congestion: CongestionController::new(
                policy.window,
                config.frame_size,
                config.max_window_size,
            ),
            advertised_window: config.receiver_window_size,
            sent_offset: 0,
            rto_deadline: None,
            last_transmit: now,
            report_timer: config.report_interval().map(|i| Timer::new(i, now)),
            started: now,
            eof: false,
            finished: false,
            stats: TransferStats::default(),
            // One spare byte so oversized control messages are detected
            recv_buf: vec![0; CONTROL_SIZE + 1],
            config,
            clock,
        })
    }

    /// Run one loop iteration
    pub fn step(&mut self) -> Result<StepOutcome, TransferError> {
        if self.finished {
            return Ok(StepOutcome::Finished);
        }

        let now = self.clock.now();

        let mut progressed = self.fill_window()?;
        progressed |= self.transmit(now)?;
        progressed |= self.poll_control(now)?;
        progressed |= self.check_timeout(now)?;
        progressed |= self.send_keepalive(now)?;
        self.report(now);

        if self.eof && self.window.is_empty() {
            self.finished = true;
            self.stats.elapsed = now.saturating_duration_since(self.started);
            tracing::info!(
                "Transfer complete: {} bytes in {:?} ({} frames sent, {} delivered)",
                self.stats.bytes_delivered,
                self.stats.elapsed,
                self.stats.frames_sent,
                self.stats.frames_delivered
            );
            return Ok(StepOutcome::Finished);
        }

        Ok(if progressed {
            StepOutcome::Progressed
        } else {
            StepOutcome::Idle
        })
    }

    /// Step until the transfer completes, sleeping `poll_interval` whenever
    /// an iteration is idle
    pub fn run(mut self) -> Result<TransferStats, TransferError> {
        let poll_interval = self.config.poll_interval();

        loop {
            match self.step()? {
                StepOutcome::Finished => return Ok(self.stats),
                StepOutcome::Progressed => {}
                StepOutcome::Idle => {
                    if !poll_interval.is_zero() {
                        std::thread::sleep(poll_interval);
                    }
                }
            }
        }
    }

    /// Current in-flight byte budget
    pub fn budget(&self) -> usize {
        let mut budget = self.congestion.window().min(self.config.max_window_size);
        if self.policy.flow_control {
            budget = budget.min(self.advertised_window);
        }
        budget
    }

    fn fill_window(&mut self) -> Result<bool, TransferError> {
        let mut filled = false;

        while !self.eof {
            let budget = self.budget();
            let next_frame_size = self.config.frame_size.min(budget);
            if next_frame_size == 0 || self.window.bytes_in_flight() + next_frame_size > budget {
                break;
            }

            let payload = read_chunk(&mut self.source, next_frame_size)?;
            if payload.is_empty() {
                self.eof = true;
                tracing::debug!("End of input at offset {}", self.window.next_offset());
                break;
            }

            let seq = self.space.wrap(self.window.next_offset());
            let entry = self.window.push(seq, payload);
            if self.config.debug {
                tracing::debug!("INSERTED TO BUFFER seq {} ({} bytes)", entry.seq, entry.len());
            }
            filled = true;
        }

        Ok(filled)
    }

    fn transmit(&mut self, now: Instant) -> Result<bool, TransferError> {
        let mut sent_any = false;

        for entry in self.window.iter_mut() {
            if !entry.status.needs_transmit() {
                continue;
            }

            let retransmission = entry.status == EntryStatus::TimedOut;
            let datagram = self.codec.encode_data(entry.seq, &entry.payload)?;
            self.channel.send_to(&datagram, self.dest)?;

            entry.status = EntryStatus::InFlight;
            entry.send_time = Some(now);
            entry.transmissions += 1;
            self.stats.frames_sent += 1;

            // Karn: only fresh transmissions are timed
            if retransmission {
                self.stats.retransmissions += 1;
            } else {
                self.rtt.start_probe(entry.end(), now);
            }
            self.sent_offset = self.sent_offset.max(entry.end());

            if self.config.debug {
                tracing::debug!(
                    "SENT seq {} ({} bytes, transmission {})",
                    entry.seq,
                    entry.len(),
                    entry.transmissions
                );
            }
            sent_any = true;
        }

        if sent_any {
            self.last_transmit = now;
            if self.rto_deadline.is_none() {
                self.rto_deadline = Some(now + self.rtt.rto());
            }
        }

        Ok(sent_any)
    }

    fn poll_control(&mut self, now: Instant) -> Result<bool, TransferError> {
        let mut progressed = false;

        while let Some((n, from)) = self.channel.try_recv(&mut self.recv_buf)? {
            if from != self.dest {
                tracing::warn!("Dropping datagram from unexpected address {}", from);
                self.stats.dropped_datagrams += 1;
                continue;
            }

            match self.codec.decode_control(&self.recv_buf[..n]) {
                Ok(msg) => progressed |= self.handle_ack(msg, now),
                Err(e) => {
                    tracing::warn!("Dropping malformed control message: {}", e);
                    self.stats.dropped_datagrams += 1;
                }
            }
        }

        Ok(progressed)
    }

    fn handle_ack(&mut self, msg: ControlMessage, now: Instant) -> bool {
        let base = self.window.base();
        let ack = self.space.unwrap_from(base, msg.cumulative_ack);

        // Behind the base unwraps to a full lap ahead, past anything sent
        if ack > self.sent_offset {
            self.stats.stale_acks += 1;
            if self.config.debug {
                tracing::debug!(
                    "Ignoring stale ack {} (window starts at {})",
                    msg.cumulative_ack,
                    self.space.wrap(base)
                );
            }
            return false;
        }

        self.stats.acks_received += 1;
        let window = msg.window as usize;
        let window_changed = window != self.advertised_window;
        if window_changed && self.config.debug {
            tracing::debug!(
                "Receiver window {} -> {}",
                self.advertised_window,
                window
            );
        }
        self.advertised_window = window;

        let acked = self.window.acknowledge(ack);
        if acked.is_empty() {
            return window_changed;
        }

        for entry in &acked {
            self.stats.frames_delivered += 1;
            self.stats.bytes_delivered += entry.len() as u64;
            if self.config.debug {
                tracing::debug!("DELIVERED seq {} ({} bytes)", entry.seq, entry.len());
            }
        }

        if let Some(sample) = self.rtt.on_ack(ack, now) {
            self.stats.record_rtt(sample);
            if self.config.debug {
                tracing::debug!("RTT sample {:?}, RTO {:?}", sample, self.rtt.rto());
            }
        }
        self.congestion.on_ack();

        self.rto_deadline = if self.window.has_in_flight() {
            Some(now + self.rtt.rto())
        } else {
            None
        };

        true
    }

    fn check_timeout(&mut self, now: Instant) -> Result<bool, TransferError> {
        let Some(deadline) = self.rto_deadline else {
            return Ok(false);
        };
        if now < deadline {
            return Ok(false);
        }
        self.rto_deadline = None;

        let Some(entry) = self.window.oldest_in_flight_mut() else {
            return Ok(false);
        };
        entry.status = EntryStatus::TimedOut;
        entry.consecutive_timeouts += 1;
        let seq = entry.seq;
        let timeouts = entry.consecutive_timeouts;

        self.stats.timeouts += 1;
        tracing::warn!(
            "Timeout on frame {} after {:?} ({} in a row)",
            seq,
            self.rtt.rto(),
            timeouts
        );

        if let Some(max_retries) = self.config.max_retries {
            if timeouts > max_retries {
                return Err(TransferError::RetryBudgetExhausted { seq, timeouts });
            }
        }

        self.congestion.on_timeout();
        self.rtt.on_timeout();
        Ok(true)
    }

    fn send_keepalive(&mut self, now: Instant) -> Result<bool, TransferError> {
        if self.policy.header_mode != HeaderMode::KeepaliveFlag
            || self.window.has_pending_transmit()
            || now.saturating_duration_since(self.last_transmit) < self.config.keepalive_timeout()
        {
            return Ok(false);
        }

        let seq = self.space.wrap(self.window.next_offset());
        let datagram = self.codec.encode_keepalive(seq)?;
        self.channel.send_to(&datagram, self.dest)?;

        self.last_transmit = now;
        self.stats.keepalives_sent += 1;
        if self.config.debug {
            tracing::debug!("KEEPALIVE seq {}", seq);
        }
        Ok(true)
    }

    fn report(&mut self, now: Instant) {
        let Some(timer) = self.report_timer.as_mut() else {
            return;
        };
        if !timer.try_fire(now) {
            return;
        }

        tracing::info!(
            "Queue {} frames / {} bytes, budget {}, receiver window {}, sent {}, delivered {}",
            self.window.len(),
            self.window.bytes_in_flight(),
            self.budget(),
            self.advertised_window,
            self.stats.frames_sent,
            self.stats.frames_delivered
        );
    }

    /// Bytes read from the source and not yet acknowledged
    pub fn bytes_in_flight(&self) -> usize {
        self.window.bytes_in_flight()
    }

    /// Last window advertised by the receiver
    pub fn advertised_window(&self) -> usize {
        self.advertised_window
    }

    /// Current retransmission timeout
    pub fn rto(&self) -> Duration {
        self.rtt.rto()
    }

    /// Congestion controller state
    pub fn congestion_stats(&self) -> CongestionStats {
        self.congestion.stats()
    }

    /// Statistics so far
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Check if the transfer has completed
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Read up to `len` bytes, stopping early only at end of input
fn read_chunk<R: Read>(source: &mut R, len: usize) -> io::Result<Bytes> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

/// Send everything `source` yields to `dest` and wait for the final ack
pub fn send<R, C>(
    source: R,
    channel: C,
    dest: SocketAddr,
    config: ArqConfig,
) -> Result<TransferStats, TransferError>
where
    R: Read,
    C: Channel,
{
    Sender::new(source, channel, dest, config, SystemClock)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArqMode;
    use crate::frame::{Frame, FrameFlag};
    use crate::sequence::SeqNumber;
    use rdt_io::{ManualClock, MemoryChannel, MemoryLink};
    use std::io::Cursor;

    const SENDER: ([u8; 4], u16) = ([10, 0, 0, 1], 1000);
    const PEER: ([u8; 4], u16) = ([10, 0, 0, 2], 2000);

    struct Harness {
        clock: ManualClock,
        sender: Sender<Cursor<Vec<u8>>, MemoryChannel, ManualClock>,
        peer: MemoryChannel,
        codec: FrameCodec,
    }

    impl Harness {
        fn new(input: &[u8], config: ArqConfig) -> Self {
            let clock = ManualClock::new();
            let link = MemoryLink::new(Duration::ZERO, clock.clone());
            let channel = link.endpoint(SENDER.into());
            let peer = link.endpoint(PEER.into());
            let codec = FrameCodec::new(
                config.frame_size,
                config.space(),
                config.arq_mode.header_mode(),
            );
            let sender = Sender::new(
                Cursor::new(input.to_vec()),
                channel,
                PEER.into(),
                config,
                clock.clone(),
            )
            .unwrap();

            Harness {
                clock,
                sender,
                peer,
                codec,
            }
        }

        fn frames(&mut self) -> Vec<Frame> {
            let mut buf = [0u8; 2048];
            let mut frames = Vec::new();
            while let Some((n, _)) = self.peer.try_recv(&mut buf).unwrap() {
                frames.push(self.codec.decode_data(&buf[..n]).unwrap());
            }
            frames
        }

        fn ack(&mut self, ack: u32, window: u32) {
            let msg = ControlMessage {
                cumulative_ack: SeqNumber::new(ack),
                window,
            };
            let bytes = self.codec.encode_control(&msg);
            self.peer.send_to(&bytes, SENDER.into()).unwrap();
        }
    }

    fn config(mode: ArqMode) -> ArqConfig {
        ArqConfig {
            frame_size: 10,
            maxseqnum: 256,
            timeout_ms: 50,
            rto_min_ms: 5,
            rto_max_ms: 1000,
            sender_window_size: 30,
            max_window_size: 100,
            receiver_window_size: 100,
            keepalive_timeout_ms: 200,
            arq_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let clock = ManualClock::new();
        let link = MemoryLink::new(Duration::ZERO, clock.clone());
        let config = ArqConfig {
            frame_size: 0,
            ..Default::default()
        };
        let result = Sender::new(
            Cursor::new(Vec::new()),
            link.endpoint(SENDER.into()),
            PEER.into(),
            config,
            clock,
        );
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[test]
    fn test_empty_input_finishes_immediately() {
        let mut h = Harness::new(b"", config(ArqMode::SlidingWindow));
        assert_eq!(h.sender.step().unwrap(), StepOutcome::Finished);
        assert_eq!(h.sender.stats().frames_sent, 0);
    }

    #[test]
    fn test_stop_and_wait_one_frame_at_a_time() {
        let mut h = Harness::new(&[7u8; 25], config(ArqMode::StopAndWait));

        h.sender.step().unwrap();
        let frames = h.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, SeqNumber::new(0));
        assert_eq!(h.sender.bytes_in_flight(), 10);

        // No ack, no second frame
        h.sender.step().unwrap();
        assert!(h.frames().is_empty());

        h.ack(10, 100);
        h.sender.step().unwrap();
        h.sender.step().unwrap();
        let frames = h.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, SeqNumber::new(10));
    }

    #[test]
    fn test_sliding_window_fills_fixed_window() {
        let mut h = Harness::new(&[1u8; 100], config(ArqMode::SlidingWindow));

        h.sender.step().unwrap();
        let seqs: Vec<u32> = h.frames().iter().map(|f| f.seq.as_raw()).collect();
        assert_eq!(seqs, vec![0, 10, 20]);
        assert_eq!(h.sender.bytes_in_flight(), 30);
    }

    #[test]
    fn test_stale_ack_ignored() {
        let mut h = Harness::new(&[1u8; 100], config(ArqMode::SlidingWindow));
        h.sender.step().unwrap();
        h.frames();

        // Beyond anything sent
        h.ack(50, 100);
        h.sender.step().unwrap();
        assert_eq!(h.sender.stats().stale_acks, 1);
        assert_eq!(h.sender.bytes_in_flight(), 30);

        h.ack(20, 100);
        h.sender.step().unwrap();
        assert_eq!(h.sender.stats().frames_delivered, 2);

        // Behind the new base
        h.ack(10, 100);
        h.sender.step().unwrap();
        assert_eq!(h.sender.stats().stale_acks, 2);
    }

    #[test]
    fn test_timeout_resends_oldest_only() {
        let mut h = Harness::new(&[1u8; 30], config(ArqMode::SlidingWindow));
        h.sender.step().unwrap();
        assert_eq!(h.frames().len(), 3);

        h.clock.advance(Duration::from_millis(50));
        assert_eq!(h.sender.step().unwrap(), StepOutcome::Progressed);
        assert_eq!(h.sender.stats().timeouts, 1);
        assert_eq!(h.sender.rto(), Duration::from_millis(100));

        h.sender.step().unwrap();
        let frames = h.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].seq, SeqNumber::new(0));
        assert_eq!(h.sender.stats().retransmissions, 1);
    }

    #[test]
    fn test_rtt_sample_from_ack() {
        let mut h = Harness::new(&[1u8; 10], config(ArqMode::FlowControl));
        h.sender.step().unwrap();
        h.frames();

        h.clock.advance(Duration::from_millis(8));
        h.ack(10, 100);
        assert_eq!(h.sender.step().unwrap(), StepOutcome::Finished);

        let stats = h.sender.stats();
        assert_eq!(stats.rtt_max, Duration::from_millis(8));
        assert_eq!(stats.rtt_average(), Some(Duration::from_millis(8)));
        assert_eq!(stats.bytes_delivered, 10);
        // 8 + 4 * 4, above the 5ms floor
        assert_eq!(h.sender.rto(), Duration::from_millis(24));
    }

    #[test]
    fn test_zero_window_keepalive() {
        let mut h = Harness::new(&[1u8; 40], config(ArqMode::FlowControl));
        h.sender.step().unwrap();
        assert_eq!(h.frames().len(), 3);

        // Everything acked, receiver full
        h.ack(30, 0);
        h.sender.step().unwrap();
        assert_eq!(h.sender.budget(), 0);
        assert!(h.frames().is_empty());

        h.clock.advance(Duration::from_millis(200));
        h.sender.step().unwrap();
        let frames = h.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].flag, FrameFlag::Keepalive);
        assert_eq!(frames[0].seq, SeqNumber::new(30));
        assert_eq!(h.sender.stats().keepalives_sent, 1);
        assert_eq!(h.sender.stats().frames_sent, 3);

        // Window reopens through the keepalive reply
        h.ack(30, 100);
        h.sender.step().unwrap();
        h.sender.step().unwrap();
        assert_eq!(h.frames().len(), 1);
    }

    #[test]
    fn test_no_keepalive_in_expected_next_mode() {
        let mut h = Harness::new(&[1u8; 10], config(ArqMode::SlidingWindow));
        h.sender.step().unwrap();
        h.frames();

        h.ack(10, 0);
        h.clock.advance(Duration::from_millis(500));
        h.sender.step().unwrap();
        assert_eq!(h.sender.stats().keepalives_sent, 0);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let mut config = config(ArqMode::CongestionControl);
        config.max_retries = Some(1);
        let mut h = Harness::new(&[1u8; 10], config);

        h.sender.step().unwrap();
        h.clock.advance(Duration::from_millis(50));
        h.sender.step().unwrap();
        h.sender.step().unwrap();

        h.clock.advance(Duration::from_millis(100));
        match h.sender.step() {
            Err(TransferError::RetryBudgetExhausted { seq, timeouts }) => {
                assert_eq!(seq, SeqNumber::new(0));
                assert_eq!(timeouts, 2);
            }
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_foreign_and_malformed_dropped() {
        let clock = ManualClock::new();
        let link = MemoryLink::new(Duration::ZERO, clock.clone());
        let channel = link.endpoint(SENDER.into());
        let mut peer = link.endpoint(PEER.into());
        let mut stranger = link.endpoint(([10, 0, 0, 3], 3000).into());

        let mut sender = Sender::new(
            Cursor::new(vec![1u8; 10]),
            channel,
            PEER.into(),
            config(ArqMode::FlowControl),
            clock,
        )
        .unwrap();
        sender.step().unwrap();

        stranger.send_to(&[0, 0, 0, 10, 0, 0, 0, 100], SENDER.into()).unwrap();
        peer.send_to(&[1, 2, 3], SENDER.into()).unwrap();
        sender.step().unwrap();

        assert_eq!(sender.stats().dropped_datagrams, 2);
        assert_eq!(sender.stats().frames_delivered, 0);
    }
}
