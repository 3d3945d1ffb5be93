//! Sampler subsystem for resting-noise capture
//!
//! Two ingestion paths feed the same downstream pipeline:
//!
//! 1. [`device_sampler`] - non-blocking reads of raw `input_event` records
//! 2. [`text_sampler`] - parsing of `evtest` style text reports
//!
//! # Architecture
//!
//! ```text
//! /dev/input/eventN ──► EventDecoder ──┐
//!                                      ├──► SampleSet ──► analysis
//! evtest (stdin) ─────► line pattern ──┘
//! ```
//!
//! Both paths implement [`AxisSampleSource`] and stop at a wall-clock deadline
//! computed once when sampling starts.

pub mod device_sampler;
pub mod discovery;
pub mod event_decoder;
pub mod text_sampler;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

pub use device_sampler::DeviceSampler;
pub use event_decoder::{RecordLayout, WordSize};
pub use text_sampler::TextStreamSampler;

/// evdev event class for absolute axes
pub const EV_ABS: u16 = 0x03;

/// The six analog axes tracked on the handheld.
///
/// Ordering follows the evdev code, which is also the canonical report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AxisId {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
}

/// Stick vs. trigger grouping used by the recommendation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisGroup {
    Sticks,
    Triggers,
}

impl AxisId {
    pub const ALL: [AxisId; 6] = [
        AxisId::X,
        AxisId::Y,
        AxisId::Z,
        AxisId::Rx,
        AxisId::Ry,
        AxisId::Rz,
    ];

    pub fn code(self) -> u16 {
        match self {
            AxisId::X => 0x00,
            AxisId::Y => 0x01,
            AxisId::Z => 0x02,
            AxisId::Rx => 0x03,
            AxisId::Ry => 0x04,
            AxisId::Rz => 0x05,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.code() == code)
    }

    /// Kernel symbol as printed by evtest, e.g. `ABS_RX`
    pub fn symbol(self) -> &'static str {
        match self {
            AxisId::X => "ABS_X",
            AxisId::Y => "ABS_Y",
            AxisId::Z => "ABS_Z",
            AxisId::Rx => "ABS_RX",
            AxisId::Ry => "ABS_RY",
            AxisId::Rz => "ABS_RZ",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|axis| axis.symbol() == symbol)
    }

    /// Report label with the physical control in parentheses
    pub fn label(self) -> &'static str {
        match self {
            AxisId::X => "ABS_X  (LX)",
            AxisId::Y => "ABS_Y  (LY)",
            AxisId::Z => "ABS_Z  (L2)",
            AxisId::Rx => "ABS_RX (RX)",
            AxisId::Ry => "ABS_RY (RY)",
            AxisId::Rz => "ABS_RZ (R2)",
        }
    }

    pub fn group(self) -> AxisGroup {
        match self {
            AxisId::Z | AxisId::Rz => AxisGroup::Triggers,
            _ => AxisGroup::Sticks,
        }
    }
}

impl AxisGroup {
    pub fn members(self) -> impl Iterator<Item = AxisId> {
        AxisId::ALL
            .into_iter()
            .filter(move |axis| axis.group() == self)
    }
}

/// Raw readings per axis collected during one session.
///
/// Series are append-only while sampling and handed off read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    series: BTreeMap<AxisId, Vec<i32>>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, axis: AxisId, value: i32) {
        self.series.entry(axis).or_default().push(value);
    }

    /// Samples for `axis`, empty if the axis never reported
    pub fn series(&self, axis: AxisId) -> &[i32] {
        self.series.get(&axis).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Bounded sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingWindow {
    pub duration: Duration,
}

impl SamplingWindow {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }
}

/// Progress snapshot published while a session runs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingProgress {
    pub elapsed: Duration,
    pub total: Duration,
}

/// Errors that can occur while collecting samples
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// The device path could not be opened for reading
    #[error("Cannot open device {}: {source}", .path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Discovery found no input device matching the name hint
    #[error("Could not find an input device whose name contains \"{0}\"")]
    NoDevice(String),

    #[error("Sampling interrupted")]
    Interrupted,

    #[error("Failed to read events: {0}")]
    Read(#[from] std::io::Error),
}

/// A source of per-axis samples for one bounded session.
///
/// `interrupt` resolves when the caller wants to stop early. Implementations
/// decide whether an interrupted session keeps its partial data.
#[allow(async_fn_in_trait)]
pub trait AxisSampleSource {
    fn describe(&self) -> String;

    async fn collect<F>(
        self,
        window: SamplingWindow,
        interrupt: F,
        progress: Option<watch::Sender<SamplingProgress>>,
    ) -> Result<SampleSet, SamplerError>
    where
        F: Future<Output = ()>;
}
