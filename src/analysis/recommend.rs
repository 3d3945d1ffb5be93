//! Filter-parameter heuristics
//!
//! Turns the worst-case noise of an axis group into driver constants:
//!
//! - **fuzz**: `round(worst_std * 3.5)` so ~3.5σ of resting noise is absorbed
//! - **flat**: `round(worst_peak * 1.3)`, 30% over the worst observed peak
//! - **dead-zone margin** (sticks only): worst peak converted to millivolts,
//!   plus 40%, rounded to 10 mV and floored at 110 mV
//!
//! fuzz and flat are then rounded up to a power of two and floored per group.
//! The multipliers and rounding order are fixed; changing them changes the
//! numbers downstream drivers were tuned against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::stats::AxisStats;
use crate::sampler::{AxisGroup, AxisId};

const FUZZ_STD_MULTIPLIER: f64 = 3.5;
const FLAT_PEAK_MULTIPLIER: f64 = 1.3;
const MARGIN_SAFETY_FACTOR: f64 = 1.4;
const MARGIN_STEP_MV: i64 = 10;
const MARGIN_FLOOR_MV: i64 = 110;

/// Minimum fuzz and flat for one axis group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPolicy {
    pub fuzz_floor: u64,
    pub flat_floor: u64,
}

impl GroupPolicy {
    pub const STICKS: GroupPolicy = GroupPolicy {
        fuzz_floor: 16,
        flat_floor: 128,
    };

    pub const TRIGGERS: GroupPolicy = GroupPolicy {
        fuzz_floor: 64,
        flat_floor: 512,
    };
}

/// Electrical model of the reference hardware.
///
/// A raw reading of `full_scale` corresponds to `swing_mv` millivolts away
/// from center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub full_scale: u32,
    pub swing_mv: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            full_scale: 32767,
            swing_mv: 640.0,
        }
    }
}

/// Dead-zone margin for a voltage-domain stick driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadzoneMargin {
    /// Worst peak expressed as millivolts from center
    pub noise_mv: i64,
    pub margin_mv: i64,
}

impl DeadzoneMargin {
    pub fn margin_uv(&self) -> i64 {
        self.margin_mv * 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub group: AxisGroup,
    pub worst_peak: u32,
    pub worst_std_dev: f64,
    pub fuzz: u64,
    pub flat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadzone: Option<DeadzoneMargin>,
}

/// Round half up, the way the reference outputs were produced
fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Round `n` up to a power of two, never below `floor`.
///
/// Non-positive input falls back to `floor` directly.
pub fn pow2_at_least(n: i64, floor: u64) -> u64 {
    if n <= 0 {
        return floor;
    }
    (n as u64).next_power_of_two().max(floor)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recommender {
    pub sticks: GroupPolicy,
    pub triggers: GroupPolicy,
    pub calibration: Calibration,
}

impl Default for Recommender {
    fn default() -> Self {
        Self {
            sticks: GroupPolicy::STICKS,
            triggers: GroupPolicy::TRIGGERS,
            calibration: Calibration::default(),
        }
    }
}

impl Recommender {
    fn policy(&self, group: AxisGroup) -> GroupPolicy {
        match group {
            AxisGroup::Sticks => self.sticks,
            AxisGroup::Triggers => self.triggers,
        }
    }

    /// Recommendations for sticks then triggers, skipping groups without data
    pub fn recommend(&self, stats: &BTreeMap<AxisId, AxisStats>) -> Vec<Recommendation> {
        [AxisGroup::Sticks, AxisGroup::Triggers]
            .into_iter()
            .filter_map(|group| self.recommend_group(group, stats))
            .collect()
    }

    pub fn recommend_group(
        &self,
        group: AxisGroup,
        stats: &BTreeMap<AxisId, AxisStats>,
    ) -> Option<Recommendation> {
        let populated: Vec<&AxisStats> = group.members().filter_map(|axis| stats.get(&axis)).collect();
        if populated.is_empty() {
            debug!("No data for {:?}, skipping", group);
            return None;
        }

        let worst_peak = populated.iter().map(|s| s.peak).max().unwrap_or(0);
        let worst_std_dev = populated.iter().map(|s| s.std_dev).fold(0.0, f64::max);

        let rec = self.from_worst_case(group, worst_peak, worst_std_dev);
        debug!("{:?}: {:?}", group, rec);
        Some(rec)
    }

    /// Apply the heuristics to a group's worst-case peak and deviation
    pub fn from_worst_case(
        &self,
        group: AxisGroup,
        worst_peak: u32,
        worst_std_dev: f64,
    ) -> Recommendation {
        let policy = self.policy(group);

        let fuzz_raw = round_half_up(worst_std_dev * FUZZ_STD_MULTIPLIER);
        let flat_raw = round_half_up(worst_peak as f64 * FLAT_PEAK_MULTIPLIER);

        let deadzone = match group {
            AxisGroup::Sticks => Some(self.deadzone_margin(worst_peak)),
            AxisGroup::Triggers => None,
        };

        Recommendation {
            group,
            worst_peak,
            worst_std_dev,
            fuzz: pow2_at_least(fuzz_raw, policy.fuzz_floor),
            flat: pow2_at_least(flat_raw, policy.flat_floor),
            deadzone,
        }
    }

    pub fn deadzone_margin(&self, worst_peak: u32) -> DeadzoneMargin {
        let cal = self.calibration;
        let noise_mv = round_half_up(worst_peak as f64 * cal.swing_mv / cal.full_scale as f64);
        let stepped =
            round_half_up(noise_mv as f64 * MARGIN_SAFETY_FACTOR / MARGIN_STEP_MV as f64) * MARGIN_STEP_MV;

        DeadzoneMargin {
            noise_mv,
            margin_mv: stepped.max(MARGIN_FLOOR_MV),
        }
    }
}
