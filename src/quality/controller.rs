//! Adaptive quality controller
//!
//! Steps the active profile up or down one level at a time based on the
//! monitor's metrics and buffer underruns. A cooldown window rate-limits
//! switches so an oscillating network cannot flap the profile.

use std::time::Instant;

use crate::config::QualityConfig;
use crate::protocol::QualityProfile;
use crate::quality::monitor::NetworkMetrics;

/// Why a profile switch happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentReason {
    HighLoss,
    HighLatency,
    BufferUnderruns,
    NetworkImproved,
}

/// A committed profile switch, emitted for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileChange {
    pub old: QualityProfile,
    pub new: QualityProfile,
    pub reason: AdjustmentReason,
}

/// Closed-loop profile adaptation with hysteresis
pub struct AdaptiveQualityController {
    config: QualityConfig,
    profile: QualityProfile,
    last_adjustment: Option<Instant>,
    /// Underrun total at the previous evaluation, for delta computation
    underruns_seen: u64,
}

impl AdaptiveQualityController {
    pub fn new(config: QualityConfig, initial: QualityProfile) -> Self {
        Self {
            config,
            profile: initial,
            last_adjustment: None,
            underruns_seen: 0,
        }
    }

    /// Currently active profile
    pub fn profile(&self) -> QualityProfile {
        self.profile
    }

    /// Reset for a new session, keeping the configured thresholds
    pub fn reset(&mut self, initial: QualityProfile) {
        self.profile = initial;
        self.last_adjustment = None;
        self.underruns_seen = 0;
    }

    /// Evaluate current conditions and possibly step the profile
    pub fn evaluate(&mut self, metrics: &NetworkMetrics, underruns_total: u64) -> Option<ProfileChange> {
        self.evaluate_at(metrics, underruns_total, Instant::now())
    }

    /// Evaluation with an explicit clock, for deterministic tests
    pub fn evaluate_at(
        &mut self,
        metrics: &NetworkMetrics,
        underruns_total: u64,
        now: Instant,
    ) -> Option<ProfileChange> {
        let new_underruns = underruns_total.saturating_sub(self.underruns_seen);
        self.underruns_seen = underruns_total;

        // Hysteresis: at most one adjustment per cooldown window
        if let Some(last) = self.last_adjustment {
            if now.duration_since(last) < self.config.cooldown() {
                return None;
            }
        }

        let reason = if metrics.loss_rate > self.config.degrade_loss {
            Some(AdjustmentReason::HighLoss)
        } else if metrics.latency_ms > self.config.degrade_latency_ms {
            Some(AdjustmentReason::HighLatency)
        } else if new_underruns > self.config.underrun_limit {
            Some(AdjustmentReason::BufferUnderruns)
        } else {
            None
        };

        if let Some(reason) = reason {
            let new = self.profile.step_down()?;
            return Some(self.commit(new, reason, now));
        }

        let can_upgrade = metrics.loss_rate < self.config.upgrade_loss
            && metrics.latency_ms < self.config.upgrade_latency_ms
            && new_underruns == 0;
        if can_upgrade {
            let new = self.profile.step_up()?;
            return Some(self.commit(new, AdjustmentReason::NetworkImproved, now));
        }

        None
    }

    fn commit(&mut self, new: QualityProfile, reason: AdjustmentReason, now: Instant) -> ProfileChange {
        let change = ProfileChange {
            old: self.profile,
            new,
            reason,
        };
        self.profile = new;
        self.last_adjustment = Some(now);
        tracing::info!(
            old = %change.old,
            new = %change.new,
            ?reason,
            "quality profile switched"
        );
        change
    }
}
