use statum::{machine, state};
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::yield_now;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace};

use super::event_decoder::{EventDecoder, RecordLayout};
use super::{AxisSampleSource, SampleSet, SamplerError, SamplingProgress, SamplingWindow};

// Device sampler settings
#[derive(Clone, Debug)]
pub struct DeviceSettings {
    pub layout: RecordLayout,
    /// Records requested per read() call
    pub read_chunk_records: usize,
    /// Pause after a read that returned no data
    pub retry_interval: Duration,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            layout: RecordLayout::native(),
            read_chunk_records: 32,
            retry_interval: Duration::from_millis(1),
        }
    }
}

// Sampler states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum DeviceState {
    Armed,
    Sampling,
}

#[machine]
#[derive(Debug)]
pub struct DeviceSampler<S: DeviceState> {
    // Path the device was opened from
    path: PathBuf,

    // Non-blocking handle, closed on drop
    device: File,

    // Decoder with carry-over for partial records
    decoder: EventDecoder,

    settings: DeviceSettings,

    // Samples collected so far
    samples: SampleSet,

    // Records decoded, tracked or not
    events_seen: u64,
}

// Methods available in all states
impl<S: DeviceState> DeviceSampler<S> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceSampler<Armed> {
    /// Open `path` read-only and non-blocking.
    pub fn open(
        path: impl Into<PathBuf>,
        settings: Option<DeviceSettings>,
    ) -> Result<Self, SamplerError> {
        let path = path.into();
        let settings = settings.unwrap_or_default();
        debug!(
            "Opening {} with settings: {:?}",
            path.display(),
            settings
        );

        let device = match OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
        {
            Ok(file) => {
                info!("Opened input device {}", path.display());
                file
            }
            Err(e) => {
                error!("Failed to open {}: {}", path.display(), e);
                return Err(SamplerError::DeviceUnavailable { path, source: e });
            }
        };

        let decoder = EventDecoder::new(settings.layout);
        Ok(Self::new(path, device, decoder, settings, SampleSet::new(), 0))
    }

    // Transition to Sampling state
    pub fn start(self) -> DeviceSampler<Sampling> {
        info!(
            "Sampling {} with {}-byte records ({} words)",
            self.path.display(),
            self.settings.layout.record_size(),
            self.settings.layout.word_size
        );
        self.transition()
    }
}

impl DeviceSampler<Sampling> {
    // One non-blocking read of up to a chunk of records; returns bytes read
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, SamplerError> {
        let n = loop {
            match self.device.read(buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Read from {} failed: {}", self.path.display(), e);
                    return Err(SamplerError::Read(e));
                }
            }
        };

        for event in self.decoder.feed(&buf[..n]) {
            if self.events_seen == 0 {
                debug!(
                    "First record stamped {}.{:06}",
                    event.time.sec, event.time.usec
                );
            }
            self.events_seen += 1;
            match event.axis_reading() {
                Some((axis, value)) => self.samples.push(axis, value),
                None => trace!("Ignoring event {:?}", event),
            }
        }

        Ok(n)
    }

    /// Run the poll loop until the window closes.
    ///
    /// If `interrupt` resolves first the session is abandoned with
    /// [`SamplerError::Interrupted`]. The device handle is dropped either way.
    pub async fn run<F>(
        mut self,
        window: SamplingWindow,
        interrupt: F,
        progress: Option<watch::Sender<SamplingProgress>>,
    ) -> Result<SampleSet, SamplerError>
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let deadline = start + window.duration;
        let chunk = self.settings.layout.record_size() * self.settings.read_chunk_records.max(1);
        let mut buf = vec![0u8; chunk];
        let mut last_log = start;
        tokio::pin!(interrupt);

        while Instant::now() < deadline {
            let read = self.read_chunk(&mut buf)?;

            if let Some(tx) = &progress {
                tx.send_replace(SamplingProgress {
                    elapsed: start.elapsed(),
                    total: window.duration,
                });
            }

            if last_log.elapsed() >= Duration::from_secs(1) {
                debug!(
                    "Device sampler: {} events decoded, {} samples kept",
                    self.events_seen,
                    self.samples.total()
                );
                last_log = Instant::now();
            }

            // the interrupt is checked after every read, busy or idle
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    info!("Device sampling interrupted after {:?}", start.elapsed());
                    return Err(SamplerError::Interrupted);
                }
                _ = sleep(self.settings.retry_interval), if read == 0 => {}
                _ = yield_now(), if read > 0 => {}
            }
        }

        if self.decoder.pending_len() > 0 {
            debug!(
                "Dropping {} bytes of an unfinished record",
                self.decoder.pending_len()
            );
        }
        info!(
            "Device sampling finished: {} events decoded, {} samples kept",
            self.events_seen,
            self.samples.total()
        );
        Ok(self.samples)
    }
}

impl AxisSampleSource for DeviceSampler<Armed> {
    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    async fn collect<F>(
        self,
        window: SamplingWindow,
        interrupt: F,
        progress: Option<watch::Sender<SamplingProgress>>,
    ) -> Result<SampleSet, SamplerError>
    where
        F: Future<Output = ()>,
    {
        self.start().run(window, interrupt, progress).await
    }
}
