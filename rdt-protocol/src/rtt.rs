//! Round-trip time estimation and retransmission timeout
//!
//! Smoothed RTT and variance follow the usual exponential averages
//! (α = 1/8, β = 1/4) and give `RTO = SRTT + 4 * RTTVAR`, clamped to the
//! configured bounds. Only one byte range is timed at a time, and a probe
//! is abandoned as soon as anything times out (Karn's algorithm).

use std::time::{Duration, Instant};

/// Smoothing factor for SRTT
const ALPHA: f64 = 0.125;

/// Smoothing factor for the variance
const BETA: f64 = 0.25;

/// The byte range currently being timed
#[derive(Debug, Clone, Copy)]
struct RttProbe {
    /// Absolute offset one past the probed frame
    end_offset: u64,
    /// First transmission time of the probed frame
    sent_at: Instant,
}

/// RTT estimator and RTO state
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT (microseconds)
    srtt: f64,
    /// RTT variance (microseconds)
    rtt_var: f64,
    /// Number of samples
    sample_count: u32,
    /// Current retransmission timeout
    rto: Duration,
    rto_min: Duration,
    rto_max: Duration,
    probe: Option<RttProbe>,
    max_sample: Duration,
    sample_sum: Duration,
}

impl RttEstimator {
    /// Create a new RTT estimator
    ///
    /// # Arguments
    /// * `rto_initial` - RTO used until the first sample
    /// * `rto_min` / `rto_max` - clamp applied to every computed RTO
    pub fn new(rto_initial: Duration, rto_min: Duration, rto_max: Duration) -> Self {
        RttEstimator {
            srtt: 0.0,
            rtt_var: 0.0,
            sample_count: 0,
            rto: rto_initial,
            rto_min,
            rto_max,
            probe: None,
            max_sample: Duration::ZERO,
            sample_sum: Duration::ZERO,
        }
    }

    /// Update with a new RTT sample
    pub fn update(&mut self, sample: Duration) {
        let sample_us = sample.as_micros() as f64;

        if self.sample_count == 0 {
            self.srtt = sample_us;
            self.rtt_var = sample_us / 2.0;
        } else {
            // Variance uses the previous SRTT
            self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * (self.srtt - sample_us).abs();
            self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * sample_us;
        }

        self.sample_count += 1;
        self.max_sample = self.max_sample.max(sample);
        self.sample_sum += sample;

        let rto_us = self.srtt + 4.0 * self.rtt_var;
        self.rto = self.clamp(Duration::from_micros(rto_us.round() as u64));
    }

    /// Start timing the frame ending at `end_offset`, unless a probe is
    /// already running
    pub fn start_probe(&mut self, end_offset: u64, sent_at: Instant) {
        if self.probe.is_none() {
            self.probe = Some(RttProbe {
                end_offset,
                sent_at,
            });
        }
    }

    /// Check if a probe is running
    pub fn probe_active(&self) -> bool {
        self.probe.is_some()
    }

    /// Abandon the running probe
    pub fn cancel_probe(&mut self) {
        self.probe = None;
    }

    /// Feed a cumulative ack; returns the sample taken if it covers the probe
    pub fn on_ack(&mut self, acked_through: u64, now: Instant) -> Option<Duration> {
        let probe = self.probe?;
        if probe.end_offset > acked_through {
            return None;
        }

        self.probe = None;
        let sample = now.saturating_duration_since(probe.sent_at);
        self.update(sample);
        Some(sample)
    }

    /// Back off after a retransmission timeout
    ///
    /// Doubles the RTO and drops the probe; the next valid sample
    /// recomputes the RTO from the estimate.
    pub fn on_timeout(&mut self) {
        self.probe = None;
        self.rto = self.clamp(self.rto.saturating_mul(2));
    }

    /// Get the retransmission timeout
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Get smoothed RTT, if any sample was taken
    pub fn srtt(&self) -> Option<Duration> {
        (self.sample_count > 0).then(|| Duration::from_micros(self.srtt.round() as u64))
    }

    /// Get RTT variance, if any sample was taken
    pub fn rtt_var(&self) -> Option<Duration> {
        (self.sample_count > 0).then(|| Duration::from_micros(self.rtt_var.round() as u64))
    }

    /// Number of samples taken
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Largest sample seen
    pub fn max_sample(&self) -> Duration {
        self.max_sample
    }

    /// Mean of all samples
    pub fn average_sample(&self) -> Option<Duration> {
        (self.sample_count > 0).then(|| self.sample_sum / self.sample_count)
    }

    fn clamp(&self, rto: Duration) -> Duration {
        rto.clamp(self.rto_min, self.rto_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn estimator() -> RttEstimator {
        RttEstimator::new(ms(1000), ms(10), ms(5000))
    }

    #[test]
    fn test_initial_rto() {
        let rtt = estimator();
        assert_eq!(rtt.rto(), ms(1000));
        assert_eq!(rtt.srtt(), None);
        assert_eq!(rtt.average_sample(), None);
    }

    #[test]
    fn test_first_sample() {
        let mut rtt = estimator();
        rtt.update(ms(100));

        assert_eq!(rtt.srtt(), Some(ms(100)));
        assert_eq!(rtt.rtt_var(), Some(ms(50)));
        // 100 + 4 * 50
        assert_eq!(rtt.rto(), ms(300));
    }

    #[test]
    fn test_smoothing() {
        let mut rtt = estimator();
        rtt.update(ms(100));
        rtt.update(ms(200));

        // rttvar = 0.75 * 50 + 0.25 * 100 = 62.5
        // srtt = 0.875 * 100 + 0.125 * 200 = 112.5
        assert_eq!(rtt.srtt(), Some(Duration::from_micros(112_500)));
        assert_eq!(rtt.rtt_var(), Some(Duration::from_micros(62_500)));
        assert_eq!(rtt.rto(), Duration::from_micros(362_500));
        assert_eq!(rtt.max_sample(), ms(200));
        assert_eq!(rtt.average_sample(), Some(ms(150)));
    }

    #[test]
    fn test_rto_clamped() {
        let mut rtt = estimator();
        rtt.update(Duration::from_micros(100));
        assert_eq!(rtt.rto(), ms(10));

        // 4000 + 4 * 2000 = 12000, above the ceiling
        let mut rtt = estimator();
        rtt.update(ms(4000));
        assert_eq!(rtt.rto(), ms(5000));
    }

    #[test]
    fn test_timeout_backoff() {
        let mut rtt = estimator();
        rtt.on_timeout();
        assert_eq!(rtt.rto(), ms(2000));
        rtt.on_timeout();
        assert_eq!(rtt.rto(), ms(4000));
        rtt.on_timeout();
        assert_eq!(rtt.rto(), ms(5000));

        // A fresh sample recomputes from the estimate
        rtt.update(ms(20));
        assert_eq!(rtt.rto(), ms(60));
    }

    #[test]
    fn test_probe() {
        let mut rtt = estimator();
        let start = Instant::now();

        rtt.start_probe(10, start);
        // A second fresh frame does not replace the running probe
        rtt.start_probe(20, start + ms(1));
        assert!(rtt.probe_active());

        assert_eq!(rtt.on_ack(5, start + ms(8)), None);
        assert_eq!(rtt.on_ack(10, start + ms(10)), Some(ms(10)));
        assert!(!rtt.probe_active());
        assert_eq!(rtt.sample_count(), 1);
    }

    #[test]
    fn test_timeout_cancels_probe() {
        let mut rtt = estimator();
        let start = Instant::now();

        rtt.start_probe(10, start);
        rtt.on_timeout();
        assert!(!rtt.probe_active());
        assert_eq!(rtt.on_ack(10, start + ms(50)), None);
        assert_eq!(rtt.sample_count(), 0);
    }
}
