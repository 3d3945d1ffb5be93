use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use super::{AxisId, AxisSampleSource, SampleSet, SamplerError, SamplingProgress, SamplingWindow};

// evtest prints e.g.
// Event: time 1700000000.123456, type 3 (EV_ABS), code 3 (ABS_RX), value -42
static EVTEST_ABS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"type 3 \(EV_ABS\), code \d+ \((\w+)\), value (-?\d+)")
        .expect("evtest line pattern is valid")
});

/// Extract a tracked axis reading from one line of evtest output.
///
/// Lines that do not match, name an untracked axis, or carry a value outside
/// `i32` yield `None`.
pub fn parse_evtest_line(line: &str) -> Option<(AxisId, i32)> {
    let caps = EVTEST_ABS_LINE.captures(line)?;
    let axis = AxisId::from_symbol(caps.get(1)?.as_str())?;
    let value = caps.get(2)?.as_str().parse::<i32>().ok()?;
    Some((axis, value))
}

/// Samples axes from a line-oriented evtest stream such as stdin
pub struct TextStreamSampler<R> {
    reader: R,
    source: String,
}

impl<R> TextStreamSampler<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
        }
    }

    /// Consume lines until the deadline, end of stream or `interrupt`.
    ///
    /// Every exit path returns what was collected so far.
    pub async fn run<F>(
        self,
        window: SamplingWindow,
        interrupt: F,
        progress: Option<watch::Sender<SamplingProgress>>,
    ) -> SampleSet
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let deadline = start + window.duration;
        let mut reader = self.reader;
        let mut buf = Vec::new();
        let mut samples = SampleSet::new();
        let mut ignored = 0u64;
        tokio::pin!(interrupt);

        info!("Reading evtest output from {} for {:?}", self.source, window.duration);

        loop {
            buf.clear();
            tokio::select! {
                _ = &mut interrupt => {
                    info!("Interrupted after {:?}, keeping {} samples", start.elapsed(), samples.total());
                    break;
                }
                _ = sleep_until(deadline) => break,
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => {
                        debug!("End of stream after {:?}", start.elapsed());
                        break;
                    }
                    Ok(_) => {
                        // garbled bytes just fail to match
                        let line = String::from_utf8_lossy(&buf);
                        match parse_evtest_line(&line) {
                            Some((axis, value)) => samples.push(axis, value),
                            None => {
                                trace!("Skipping line: {}", line.trim_end());
                                ignored += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Stopped reading {}: {}", self.source, e);
                        break;
                    }
                },
            }

            if let Some(tx) = &progress {
                tx.send_replace(SamplingProgress {
                    elapsed: start.elapsed(),
                    total: window.duration,
                });
            }
        }

        debug!("{} lines ignored", ignored);
        info!("Text sampling finished with {} samples", samples.total());
        samples
    }
}

impl<R> AxisSampleSource for TextStreamSampler<R>
where
    R: AsyncBufRead + Unpin,
{
    fn describe(&self) -> String {
        self.source.clone()
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
        Ok(self.run(window, interrupt, progress).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader};

    const TRACE: &str = "\
Input driver version is 1.0.1
Event: time 1700000000.000100, type 3 (EV_ABS), code 0 (ABS_X), value 12
Event: time 1700000000.000100, -------------- SYN_REPORT ------------
Event: time 1700000000.000200, type 3 (EV_ABS), code 3 (ABS_RX), value -40
Event: time 1700000000.000300, type 1 (EV_KEY), code 304 (BTN_SOUTH), value 1
Event: time 1700000000.000400, type 3 (EV_ABS), code 16 (ABS_HAT0X), value -1
Event: time 1700000000.000500, type 3 (EV_ABS), code 0 (ABS_X), value -7
Event: time 1700000000.000600, type 3 (EV_ABS), code 5 (ABS_RZ), value 250
";

    #[test]
    fn parses_tracked_abs_lines() {
        assert_eq!(
            parse_evtest_line("Event: time 1.5, type 3 (EV_ABS), code 4 (ABS_RY), value -1234"),
            Some((AxisId::Ry, -1234))
        );
        assert_eq!(
            parse_evtest_line("type 3 (EV_ABS), code 2 (ABS_Z), value 0"),
            Some((AxisId::Z, 0))
        );
    }

    #[test]
    fn ignores_malformed_and_untracked_lines() {
        assert_eq!(parse_evtest_line(""), None);
        assert_eq!(parse_evtest_line("-------------- SYN_REPORT ------------"), None);
        assert_eq!(
            parse_evtest_line("type 3 (EV_ABS), code 16 (ABS_HAT0X), value 1"),
            None
        );
        assert_eq!(
            parse_evtest_line("type 1 (EV_KEY), code 0 (ABS_X), value 1"),
            None
        );
        assert_eq!(
            parse_evtest_line("type 3 (EV_ABS), code 0 (ABS_X), value 99999999999"),
            None
        );
    }

    #[tokio::test]
    async fn end_of_stream_returns_samples() {
        let sampler = TextStreamSampler::new(TRACE.as_bytes(), "fixture");
        let samples = sampler
            .collect(SamplingWindow::from_secs(5), std::future::pending::<()>(), None)
            .await
            .unwrap();

        assert_eq!(samples.series(AxisId::X), &[12, -7]);
        assert_eq!(samples.series(AxisId::Rx), &[-40]);
        assert_eq!(samples.series(AxisId::Rz), &[250]);
        assert_eq!(samples.total(), 4);
    }

    #[tokio::test]
    async fn interrupt_keeps_partial_samples() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        writer.write_all(TRACE.as_bytes()).await.unwrap();

        // writer stays open, so only the interrupt can end the session early
        let sampler = TextStreamSampler::new(BufReader::new(reader), "pipe");
        let samples = sampler
            .run(
                SamplingWindow::from_secs(10),
                tokio::time::sleep(Duration::from_millis(50)),
                None,
            )
            .await;

        assert_eq!(samples.total(), 4);
        assert_eq!(samples.series(AxisId::X), &[12, -7]);
        drop(writer);
    }

    #[tokio::test]
    async fn deadline_ends_an_open_stream() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        writer.write_all(TRACE.as_bytes()).await.unwrap();
        let (tx, rx) = watch::channel(SamplingProgress::default());

        let window = SamplingWindow {
            duration: Duration::from_millis(40),
        };
        let sampler = TextStreamSampler::new(BufReader::new(reader), "pipe");
        let samples = sampler
            .run(window, std::future::pending::<()>(), Some(tx))
            .await;

        assert_eq!(samples.total(), 4);
        assert_eq!(rx.borrow().total, window.duration);
        drop(writer);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let mut input = b"type 3 (EV_ABS), code 0 (ABS_X), value 1\n".to_vec();
        input.extend_from_slice(b"garbage \xff\xfe\n");
        input.extend_from_slice(b"type 3 (EV_ABS), code 0 (ABS_X), value 2\n");

        let sampler = TextStreamSampler::new(&input[..], "fixture");
        let samples = sampler
            .collect(SamplingWindow::from_secs(5), std::future::pending::<()>(), None)
            .await
            .unwrap();

        assert_eq!(samples.series(AxisId::X), &[1, 2]);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_an_open_stream() {
        let (mut writer, reader) = tokio::io::duplex(4096);
        writer.write_all(b"\xff\xff\n").await.unwrap();
        writer.write_all(TRACE.as_bytes()).await.unwrap();

        let window = SamplingWindow {
            duration: Duration::from_millis(40),
        };
        let start = Instant::now();
        let sampler = TextStreamSampler::new(BufReader::new(reader), "pipe");
        let samples = sampler
            .run(window, std::future::pending::<()>(), None)
            .await;

        assert_eq!(samples.total(), 4);
        assert!(start.elapsed() >= window.duration);
        drop(writer);
    }
}
