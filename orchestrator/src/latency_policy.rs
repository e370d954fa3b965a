//! Latency-tiered gesture selection.
//!
//! Tiers, measured on end-to-end latency:
//! - fast:   `e2e < fast_ms`            -> `nod_fast`
//! - normal: `fast_ms <= e2e < slo_ms`  -> `nod_tilt`
//! - slow:   `e2e >= slo_ms`            -> `thinking_done`
//!
//! A failed turn always maps to `error`.

use serde::Serialize;
use tracing::debug;

use crate::gesture::GestureTag;

pub const DEFAULT_FAST_TIER_MS: f64 = 800.0;
pub const DEFAULT_SLO_MS: f64 = 2500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyTier {
    Fast,
    Normal,
    Slow,
}

impl LatencyTier {
    /// 0 = fast, 1 = normal, 2 = slow
    pub fn index(self) -> u8 {
        match self {
            LatencyTier::Fast => 0,
            LatencyTier::Normal => 1,
            LatencyTier::Slow => 2,
        }
    }

    pub fn gesture(self) -> GestureTag {
        match self {
            LatencyTier::Fast => GestureTag::NOD_FAST,
            LatencyTier::Normal => GestureTag::NOD_TILT,
            LatencyTier::Slow => GestureTag::THINKING_DONE,
        }
    }
}

/// Timing of one turn
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyMeasurement {
    pub inference_call_ms: f64,
    pub end_to_end_ms: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPolicy {
    fast_ms: f64,
    slo_ms: f64,
}

impl Default for LatencyPolicy {
    fn default() -> Self {
        Self {
            fast_ms: DEFAULT_FAST_TIER_MS,
            slo_ms: DEFAULT_SLO_MS,
        }
    }
}

impl LatencyPolicy {
    /// Thresholds are clamped to be non-negative and ordered
    pub fn new(fast_ms: f64, slo_ms: f64) -> Self {
        let fast_ms = sanitize(fast_ms);
        let slo_ms = sanitize(slo_ms).max(fast_ms);
        Self { fast_ms, slo_ms }
    }

    pub fn slo_ms(&self) -> f64 {
        self.slo_ms
    }

    /// Gesture fired as soon as input is accepted
    pub fn choose_pre_gesture(&self) -> GestureTag {
        GestureTag::ACK
    }

    pub fn choose_post_gesture(&self, inference_ms: f64, e2e_ms: f64, success: bool) -> GestureTag {
        if !success {
            debug!(e2e_ms, "Failed turn, selecting error gesture");
            return GestureTag::ERROR;
        }
        let tier = self.latency_tier(e2e_ms);
        let gesture = tier.gesture();
        debug!(?tier, e2e_ms, inference_ms, %gesture, "Selected post gesture");
        gesture
    }

    pub fn choose_for(&self, measurement: &LatencyMeasurement) -> GestureTag {
        self.choose_post_gesture(
            measurement.inference_call_ms,
            measurement.end_to_end_ms,
            measurement.success,
        )
    }

    pub fn latency_tier(&self, e2e_ms: f64) -> LatencyTier {
        let e2e_ms = sanitize(e2e_ms);
        if e2e_ms < self.fast_ms {
            LatencyTier::Fast
        } else if e2e_ms < self.slo_ms {
            LatencyTier::Normal
        } else {
            LatencyTier::Slow
        }
    }
}

/// Negative and NaN durations count as 0
fn sanitize(ms: f64) -> f64 {
    if ms.is_nan() || ms < 0.0 {
        0.0
    } else {
        ms
    }
}
