//! Noise analysis: statistics, heuristics and the printed report
//!
//! ```text
//! SampleSet ──► stats ──► recommend ──► report
//!              (per axis)  (per group)
//! ```

pub mod recommend;
pub mod report;
pub mod stats;

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::sampler::{AxisId, SampleSet};
use recommend::{Recommendation, Recommender};
use stats::AxisStats;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No ABS events captured. Is the device correct?")]
    NoData,
}

/// Per-axis statistics plus the group recommendations derived from them
#[derive(Debug, Clone)]
pub struct Analysis {
    pub stats: BTreeMap<AxisId, AxisStats>,
    pub recommendations: Vec<Recommendation>,
}

/// Run the statistics and recommendation engines over a finished session.
///
/// Fails with [`AnalysisError::NoData`] if no tracked axis produced a sample.
pub fn analyze(samples: &SampleSet, recommender: &Recommender) -> Result<Analysis, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let stats = stats::axis_stats(samples);
    for axis in AxisId::ALL {
        match stats.get(&axis) {
            Some(s) => debug!("{}: {:?}", axis.symbol(), s),
            None => debug!("{}: no events", axis.symbol()),
        }
    }

    let recommendations = recommender.recommend(&stats);
    info!(
        "Analyzed {} axes, {} recommendation blocks",
        stats.len(),
        recommendations.len()
    );

    Ok(Analysis {
        stats,
        recommendations,
    })
}
