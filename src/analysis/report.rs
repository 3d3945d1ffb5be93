use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::recommend::Recommendation;
use super::stats::AxisStats;
use crate::sampler::{AxisGroup, AxisId};

const WIDTH: usize = 72;

/// One table row; `stats` is `None` for axes that never reported
#[derive(Debug, Clone, Serialize)]
pub struct AxisRow {
    pub axis: AxisId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AxisStats>,
}

/// Everything printed at the end of a session
#[derive(Debug, Clone, Serialize)]
pub struct NoiseReport {
    pub source: String,
    pub captured_at: DateTime<Local>,
    pub duration_secs: u64,
    pub full_scale: u32,
    pub axes: Vec<AxisRow>,
    pub recommendations: Vec<Recommendation>,
}

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Toml,
}

impl NoiseReport {
    pub fn new(
        source: impl Into<String>,
        duration_secs: u64,
        full_scale: u32,
        stats: &BTreeMap<AxisId, AxisStats>,
        recommendations: Vec<Recommendation>,
    ) -> Self {
        let axes = AxisId::ALL
            .into_iter()
            .map(|axis| AxisRow {
                axis,
                stats: stats.get(&axis).copied(),
            })
            .collect();

        Self {
            source: source.into(),
            captured_at: Local::now(),
            duration_secs,
            full_scale,
            axes,
            recommendations,
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, toml::ser::Error> {
        match format {
            ReportFormat::Text => Ok(self.to_string()),
            ReportFormat::Toml => self.to_toml(),
        }
    }

    fn write_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(WIDTH))?;
        writeln!(
            f,
            "{:<14} {:>6} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "Axis", "Count", "Min", "Max", "Range", "Mean", "StdDev", "|Max|"
        )?;
        writeln!(f, "{}", "-".repeat(WIDTH))?;

        for row in &self.axes {
            match &row.stats {
                Some(s) => writeln!(
                    f,
                    "{:<14} {:>6} {:>8} {:>8} {:>8} {:>8.1} {:>8.1} {:>8}",
                    row.axis.label(),
                    s.count,
                    s.min,
                    s.max,
                    s.range,
                    s.mean,
                    s.std_dev,
                    s.peak
                )?,
                None => writeln!(f, "{:<14}   (no events)", row.axis.label())?,
            }
        }

        writeln!(f, "{}", "=".repeat(WIDTH))?;
        writeln!(f)
    }

    fn write_recommendation(&self, f: &mut fmt::Formatter<'_>, rec: &Recommendation) -> fmt::Result {
        match rec.group {
            AxisGroup::Sticks => {
                writeln!(f, "STICKS:")?;
                writeln!(
                    f,
                    "  Worst-case peak noise: {} (of ±{})",
                    rec.worst_peak, self.full_scale
                )?;
                writeln!(f, "  Worst-case stddev:     {:.0}", rec.worst_std_dev)?;
                if let Some(dz) = &rec.deadzone {
                    writeln!(f, "  → Estimated noise:     ~{} mV from center", dz.noise_mv)?;
                    writeln!(f)?;
                    writeln!(f, "  Recommended STICK_DZ_MARGIN_UV: {}", dz.margin_uv())?;
                } else {
                    writeln!(f)?;
                }
                writeln!(f, "  Recommended stick fuzz:         {}", rec.fuzz)?;
                writeln!(f, "  Recommended stick flat:         {}", rec.flat)?;
            }
            AxisGroup::Triggers => {
                writeln!(f, "TRIGGERS:")?;
                writeln!(
                    f,
                    "  Worst-case peak noise: {} (of 0–{})",
                    rec.worst_peak, self.full_scale
                )?;
                writeln!(f, "  Worst-case stddev:     {:.0}", rec.worst_std_dev)?;
                writeln!(f)?;
                writeln!(f, "  Recommended TRIG_FUZZ_CALIBRATED: {}", rec.fuzz)?;
                writeln!(f, "  Recommended TRIG_FLAT_CALIBRATED:  {}", rec.flat)?;
            }
        }
        writeln!(f)
    }
}

impl fmt::Display for NoiseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_table(f)?;
        for rec in &self.recommendations {
            self.write_recommendation(f, rec)?;
        }
        Ok(())
    }
}
