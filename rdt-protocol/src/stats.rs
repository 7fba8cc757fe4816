//! Transfer statistics

use std::time::Duration;

/// Sender-side statistics for one transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Data frame transmissions, retransmissions included
    pub frames_sent: u64,
    /// Frames removed from the window by a cumulative ack
    pub frames_delivered: u64,
    /// Transmissions of a frame that had timed out
    pub retransmissions: u64,
    /// Retransmission timer expirations
    pub timeouts: u64,
    /// Keepalive frames sent
    pub keepalives_sent: u64,
    /// Payload bytes confirmed by the receiver
    pub bytes_delivered: u64,
    /// Control messages that advanced or refreshed the window
    pub acks_received: u64,
    /// Control messages behind the window or beyond what was sent
    pub stale_acks: u64,
    /// Datagrams dropped because they failed to decode or came from elsewhere
    pub dropped_datagrams: u64,
    /// Wall time from sender construction to the final ack
    pub elapsed: Duration,
    /// Largest RTT sample
    pub rtt_max: Duration,
    /// Sum of RTT samples
    pub rtt_total: Duration,
    /// Number of RTT samples
    pub rtt_samples: u32,
}

impl TransferStats {
    /// Record an RTT sample
    pub fn record_rtt(&mut self, sample: Duration) {
        self.rtt_max = self.rtt_max.max(sample);
        self.rtt_total += sample;
        self.rtt_samples += 1;
    }

    /// Mean RTT sample
    pub fn rtt_average(&self) -> Option<Duration> {
        (self.rtt_samples > 0).then(|| self.rtt_total / self.rtt_samples)
    }

    /// Delivered payload rate in bytes per second
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_delivered as f64 / secs
        } else {
            0.0
        }
    }
}

/// Receiver-side statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Data frames decoded from the peer
    pub frames_received: u64,
    /// Data frames stored in the buffer
    pub frames_accepted: u64,
    /// Accepted frames that added no new bytes
    pub duplicate_frames: u64,
    /// Data frames outside the receive window
    pub frames_rejected: u64,
    /// Datagrams that failed to decode
    pub malformed_frames: u64,
    /// Keepalive frames answered
    pub keepalives_received: u64,
    /// Datagrams from an address other than the peer
    pub foreign_datagrams: u64,
    /// Control messages sent
    pub acks_sent: u64,
    /// Bytes handed to the application
    pub bytes_consumed: u64,
}
