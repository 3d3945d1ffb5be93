//! On-disk configuration for noise calibration runs
//!
//! Looked up at `--config PATH` or `<config_dir>/noisecal/config.toml`. Every
//! section is optional; missing values fall back to the defaults below, which
//! match the reference handheld.
//!
//! ```toml
//! [sampling]
//! duration_secs = 5
//! device_name_hint = "rg56pro"
//! word_size = 8
//!
//! [calibration]
//! full_scale = 32767
//! swing_mv = 640.0
//!
//! [sticks]
//! fuzz_floor = 16
//! flat_floor = 128
//! ```

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::analysis::recommend::{Calibration, GroupPolicy, Recommender};
use crate::sampler::device_sampler::DeviceSettings;
use crate::sampler::{RecordLayout, WordSize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid sampling setting: {0}")]
    InvalidSampling(String),

    #[error("Invalid calibration setting: {0}")]
    InvalidCalibration(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Length of the sampling window
    pub duration_secs: u64,
    /// Substring matched against sysfs input device names
    pub device_name_hint: String,
    pub sysfs_root: PathBuf,
    pub read_chunk_records: usize,
    pub retry_interval_ms: u64,
    /// Width of the kernel's `long`; the host's when unset
    pub word_size: Option<WordSize>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5,
            device_name_hint: "rg56pro".to_string(),
            sysfs_root: PathBuf::from("/sys"),
            read_chunk_records: 32,
            retry_interval_ms: 1,
            word_size: None,
        }
    }
}

/// Per-group floor overrides; unset fields keep the group's built-in floor
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GroupFloors {
    pub fuzz_floor: Option<u64>,
    pub flat_floor: Option<u64>,
}

impl GroupFloors {
    pub fn resolve(&self, base: GroupPolicy) -> GroupPolicy {
        GroupPolicy {
            fuzz_floor: self.fuzz_floor.unwrap_or(base.fuzz_floor),
            flat_floor: self.flat_floor.unwrap_or(base.flat_floor),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub calibration: Calibration,
    pub sticks: GroupFloors,
    pub triggers: GroupFloors,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("noisecal").join("config.toml"))
    }

    /// Load from `explicit`, or from the default location if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(path) = Self::default_path() else {
                    debug!("No config directory on this system, using defaults");
                    return Ok(Self::default());
                };
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config = Self::parse(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.read_chunk_records == 0 {
            return Err(ConfigError::InvalidSampling(
                "read_chunk_records must be at least 1".to_string(),
            ));
        }
        if self.calibration.full_scale == 0 {
            return Err(ConfigError::InvalidCalibration(
                "full_scale must be positive".to_string(),
            ));
        }
        if !(self.calibration.swing_mv.is_finite() && self.calibration.swing_mv > 0.0) {
            return Err(ConfigError::InvalidCalibration(format!(
                "swing_mv must be a positive number, got {}",
                self.calibration.swing_mv
            )));
        }
        Ok(())
    }

    pub fn record_layout(&self) -> RecordLayout {
        self.sampling
            .word_size
            .map(RecordLayout::new)
            .unwrap_or_else(RecordLayout::native)
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            layout: self.record_layout(),
            read_chunk_records: self.sampling.read_chunk_records,
            retry_interval: Duration::from_millis(self.sampling.retry_interval_ms),
        }
    }

    pub fn recommender(&self) -> Recommender {
        Recommender {
            sticks: self.sticks.resolve(GroupPolicy::STICKS),
            triggers: self.triggers.resolve(GroupPolicy::TRIGGERS),
            calibration: self.calibration,
        }
    }
}
