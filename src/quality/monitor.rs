//! Network quality monitor
//!
//! Rolling, exponentially smoothed latency and jitter plus monotonic packet
//! accounting. A 0-100 score is recomputed on a fixed interval by applying
//! the single highest matching penalty per metric; the score maps to a
//! five-way category used by the adaptive controller.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Quality category derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityCategory {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl QualityCategory {
    fn from_score(score: u8) -> Self {
        match score {
            80..=100 => QualityCategory::Excellent,
            60..=79 => QualityCategory::Good,
            40..=59 => QualityCategory::Fair,
            20..=39 => QualityCategory::Poor,
            _ => QualityCategory::Critical,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct NetworkMetrics {
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub loss_rate: f64,
    pub score: u8,
    pub category: QualityCategory,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Rolling network statistics for one session
pub struct NetworkQualityMonitor {
    smoothing: f64,
    assess_interval: Duration,
    latency_ms: f64,
    jitter_ms: f64,
    has_latency_sample: bool,
    packets_sent: u64,
    packets_received: u64,
    packets_lost: u64,
    bytes_sent: u64,
    bytes_received: u64,
    score: u8,
    last_assessment: Instant,
}

impl NetworkQualityMonitor {
    pub fn new(smoothing: f64, assess_interval: Duration) -> Self {
        Self {
            smoothing,
            assess_interval,
            latency_ms: 0.0,
            jitter_ms: 0.0,
            has_latency_sample: false,
            packets_sent: 0,
            packets_received: 0,
            packets_lost: 0,
            bytes_sent: 0,
            bytes_received: 0,
            score: 100,
            last_assessment: Instant::now(),
        }
    }

    /// Reset all rolling state for a new session
    pub fn reset(&mut self) {
        self.latency_ms = 0.0;
        self.jitter_ms = 0.0;
        self.has_latency_sample = false;
        self.packets_sent = 0;
        self.packets_received = 0;
        self.packets_lost = 0;
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.score = 100;
        self.last_assessment = Instant::now();
    }

    /// Feed one per-packet latency sample (ms)
    ///
    /// Latency is an EWMA; jitter is the smoothed absolute deviation of the
    /// sample from the previous latency estimate.
    pub fn record_latency(&mut self, sample_ms: f64) {
        if !self.has_latency_sample {
            self.latency_ms = sample_ms;
            self.has_latency_sample = true;
            return;
        }
        let deviation = (sample_ms - self.latency_ms).abs();
        self.jitter_ms = self.jitter_ms * (1.0 - self.smoothing) + deviation * self.smoothing;
        self.latency_ms = self.latency_ms * (1.0 - self.smoothing) + sample_ms * self.smoothing;
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    /// Count packets presumed or confirmed lost; never decremented within a
    /// session.
    pub fn record_lost(&mut self, count: u64) {
        self.packets_lost += count;
    }

    /// Loss rate as `lost / (received + lost)`
    pub fn loss_rate(&self) -> f64 {
        let total = self.packets_received + self.packets_lost;
        if total == 0 {
            0.0
        } else {
            self.packets_lost as f64 / total as f64
        }
    }

    /// Recompute the score if the assessment interval has elapsed
    pub fn assess(&mut self, now: Instant) -> Option<NetworkMetrics> {
        if now.duration_since(self.last_assessment) < self.assess_interval {
            return None;
        }
        self.last_assessment = now;
        self.score = self.compute_score();
        Some(self.snapshot())
    }

    /// Recompute the score unconditionally
    pub fn assess_now(&mut self) -> NetworkMetrics {
        self.score = self.compute_score();
        self.last_assessment = Instant::now();
        self.snapshot()
    }

    /// Current metrics without recomputing the score
    pub fn snapshot(&self) -> NetworkMetrics {
        NetworkMetrics {
            latency_ms: self.latency_ms,
            jitter_ms: self.jitter_ms,
            loss_rate: self.loss_rate(),
            score: self.score,
            category: QualityCategory::from_score(self.score),
            packets_sent: self.packets_sent,
            packets_received: self.packets_received,
            packets_lost: self.packets_lost,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }

    /// Score 0-100: only the single highest applicable penalty per metric
    /// applies, so overlapping bands never stack.
    fn compute_score(&self) -> u8 {
        let mut score: i32 = 100;

        score -= if self.latency_ms > 200.0 {
            40
        } else if self.latency_ms > 100.0 {
            25
        } else if self.latency_ms > 50.0 {
            10
        } else {
            0
        };

        let loss = self.loss_rate();
        score -= if loss > 0.10 {
            40
        } else if loss > 0.05 {
            25
        } else if loss > 0.02 {
            10
        } else {
            0
        };

        score -= if self.jitter_ms > 50.0 {
            20
        } else if self.jitter_ms > 25.0 {
            10
        } else if self.jitter_ms > 10.0 {
            5
        } else {
            0
        };

        score.max(0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> NetworkQualityMonitor {
        NetworkQualityMonitor::new(0.1, Duration::from_secs(2))
    }

    #[test]
    fn test_latency_smoothing() {
        let mut m = monitor();
        m.record_latency(100.0);
        assert_eq!(m.snapshot().latency_ms, 100.0);

        m.record_latency(200.0);
        // 100 * 0.9 + 200 * 0.1
        assert!((m.snapshot().latency_ms - 110.0).abs() < 1e-9);
        // jitter picks up the 100ms deviation at alpha 0.1
        assert!((m.snapshot().jitter_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_network_scores_excellent() {
        let mut m = monitor();
        for _ in 0..100 {
            m.record_latency(20.0);
            m.record_received(320);
        }
        let metrics = m.assess_now();
        assert_eq!(metrics.score, 100);
        assert_eq!(metrics.category, QualityCategory::Excellent);
    }

    #[test]
    fn test_penalties_do_not_stack_within_metric() {
        let mut m = monitor();
        // Latency over every band: only the 40-point penalty applies
        for _ in 0..200 {
            m.record_latency(500.0);
        }
        let metrics = m.assess_now();
        assert!(metrics.latency_ms > 200.0);
        assert!(metrics.jitter_ms <= 10.0);
        assert_eq!(metrics.score, 60);
        assert_eq!(metrics.category, QualityCategory::Good);
    }

    #[test]
    fn test_loss_rate_and_penalty() {
        let mut m = monitor();
        for _ in 0..90 {
            m.record_received(100);
        }
        m.record_lost(10);
        assert!((m.loss_rate() - 0.1).abs() < 1e-9);

        // 10% is the band edge; just above it costs 40 points
        m.record_lost(5);
        let metrics = m.assess_now();
        assert!(metrics.loss_rate > 0.10);
        assert_eq!(metrics.score, 60);
    }

    #[test]
    fn test_score_floor() {
        let mut m = monitor();
        for i in 0..200 {
            // Alternate wildly to build jitter while keeping latency high
            m.record_latency(if i % 2 == 0 { 100.0 } else { 600.0 });
        }
        m.record_received(1);
        m.record_lost(100);
        let metrics = m.assess_now();
        assert_eq!(metrics.category, QualityCategory::Critical);
        assert!(metrics.score <= 19);
    }

    #[test]
    fn test_assess_is_interval_gated() {
        let mut m = NetworkQualityMonitor::new(0.1, Duration::from_secs(2));
        let start = Instant::now();
        assert!(m.assess(start).is_none());
        assert!(m.assess(start + Duration::from_millis(1000)).is_none());
        assert!(m.assess(start + Duration::from_secs(3)).is_some());
    }
}
