//! Congestion Control for RDT
//!
//! Implements a byte-counting slow start / congestion avoidance window.
//! The non-congestion ARQ modes run the same controller with a fixed
//! window, where ack and timeout events leave the window untouched.

use std::fmt;

/// How the sender window is sized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Constant window in bytes
    Fixed(usize),
    /// Slow start and congestion avoidance
    SlowStart,
}

/// Growth regime of the congestion window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionMode {
    /// Window grows by one frame per confirming ack
    SlowStart,
    /// Window grows by roughly one frame per window of acks
    CongestionAvoidance,
}

impl fmt::Display for CongestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionMode::SlowStart => f.write_str("slow-start"),
            CongestionMode::CongestionAvoidance => f.write_str("congestion-avoidance"),
        }
    }
}

/// Congestion control state
#[derive(Debug, Clone)]
pub struct CongestionController {
    policy: WindowPolicy,
    /// Maximum payload per frame (bytes)
    frame_size: usize,
    /// Hard cap on the window (bytes)
    max_window: usize,
    /// Congestion window (bytes)
    window_bytes: usize,
    /// Slow start threshold (bytes)
    ssthresh: usize,
    mode: CongestionMode,
    /// Number of timeout events seen
    timeouts: u64,
}

impl CongestionController {
    /// Create a new congestion controller
    ///
    /// # Arguments
    /// * `policy` - Fixed or adaptive window
    /// * `frame_size` - Maximum payload per frame in bytes
    /// * `max_window` - Upper bound on the window in bytes
    pub fn new(policy: WindowPolicy, frame_size: usize, max_window: usize) -> Self {
        let window_bytes = match policy {
            WindowPolicy::Fixed(size) => size.min(max_window),
            WindowPolicy::SlowStart => frame_size.min(max_window),
        };

        CongestionController {
            policy,
            frame_size,
            max_window,
            window_bytes,
            ssthresh: max_window,
            mode: CongestionMode::SlowStart,
            timeouts: 0,
        }
    }

    /// Get current window size in bytes
    pub fn window(&self) -> usize {
        self.window_bytes
    }

    /// Get slow start threshold in bytes
    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    /// Get the growth regime
    pub fn mode(&self) -> CongestionMode {
        self.mode
    }

    /// Check if the window is adaptive
    pub fn is_adaptive(&self) -> bool {
        self.policy == WindowPolicy::SlowStart
    }

    /// Record one ack event that confirmed new data
    pub fn on_ack(&mut self) {
        if !self.is_adaptive() {
            return;
        }

        match self.mode {
            CongestionMode::SlowStart => {
                self.window_bytes += self.frame_size;
                if self.window_bytes >= self.ssthresh {
                    self.mode = CongestionMode::CongestionAvoidance;
                }
            }
            CongestionMode::CongestionAvoidance => {
                let increment = (self.frame_size * self.frame_size / self.window_bytes).max(1);
                self.window_bytes += increment;
            }
        }

        // Cap at max window
        self.window_bytes = self.window_bytes.min(self.max_window);
    }

    /// Record a retransmission timeout
    pub fn on_timeout(&mut self) {
        self.timeouts += 1;
        if !self.is_adaptive() {
            return;
        }

        // Multiplicative decrease, restart from one frame
        self.ssthresh = (self.window_bytes / 2).max(self.frame_size);
        self.window_bytes = self.frame_size;
        self.mode = CongestionMode::SlowStart;
    }

    /// Get statistics
    pub fn stats(&self) -> CongestionStats {
        CongestionStats {
            window_bytes: self.window_bytes,
            ssthresh: self.ssthresh,
            mode: self.mode,
            adaptive: self.is_adaptive(),
            timeouts: self.timeouts,
        }
    }
}

/// Congestion control statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionStats {
    /// Current window (bytes)
    pub window_bytes: usize,
    /// Slow start threshold (bytes)
    pub ssthresh: usize,
    /// Growth regime
    pub mode: CongestionMode,
    /// Whether the window adapts to acks and timeouts
    pub adaptive: bool,
    /// Timeout events seen
    pub timeouts: u64,
}
