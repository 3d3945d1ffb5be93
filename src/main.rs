pub mod analysis;
pub mod config;
pub mod sampler;

use crate::analysis::analyze;
use crate::analysis::report::{NoiseReport, ReportFormat};
use crate::config::Config;
use crate::sampler::discovery::find_device;
use crate::sampler::{
    AxisSampleSource, DeviceSampler, SampleSet, SamplerError, SamplingProgress, SamplingWindow,
    TextStreamSampler,
};
use clap::Parser;
use color_eyre::{Result, Section};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Measure joystick ADC noise at rest to pick dead zone, fuzz and flat values.
///
/// DO NOT TOUCH THE CONTROLS while this runs.
#[derive(Debug, Parser)]
#[command(name = "noisecal", version)]
struct Cli {
    /// Input event device, e.g. /dev/input/event4 (discovered when omitted)
    device: Option<PathBuf>,

    /// Sampling window in seconds
    #[arg(short, long)]
    seconds: Option<u64>,

    /// Read `evtest` output from stdin instead of a device
    #[arg(long, conflicts_with = "device")]
    evtest: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Config file (default: <config dir>/noisecal/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(&cli)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(cli));
    // tokio's stdin reads on a blocking thread that cannot be cancelled
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).await?;
    debug!("Effective config: {:?}", config);

    let duration_secs = cli.seconds.unwrap_or(config.sampling.duration_secs);
    let window = SamplingWindow::from_secs(duration_secs);

    let (progress_tx, progress_rx) = watch::channel(SamplingProgress::default());
    let progress_task = tokio::spawn(show_progress(progress_rx));

    let (source, samples) = if cli.evtest {
        let sampler = TextStreamSampler::new(BufReader::new(tokio::io::stdin()), "stdin");
        run_session(sampler, window, progress_tx).await?
    } else {
        let path = match cli.device {
            Some(path) => path,
            None => find_device(&config.sampling.sysfs_root, &config.sampling.device_name_hint)
                .ok_or_else(|| SamplerError::NoDevice(config.sampling.device_name_hint.clone()))
                .suggestion("Usage: noisecal /dev/input/eventN [--seconds N]")?,
        };
        let sampler = DeviceSampler::open(path, Some(config.device_settings()))?;
        run_session(sampler, window, progress_tx).await?
    };

    if let Err(e) = progress_task.await {
        warn!("Progress display failed: {}", e);
    }

    let analysis = analyze(&samples, &config.recommender())?;
    let report = NoiseReport::new(
        source,
        duration_secs,
        config.calibration.full_scale,
        &analysis.stats,
        analysis.recommendations,
    );

    print!("{}", report.render(cli.format)?);
    Ok(())
}

async fn run_session<S>(
    sampler: S,
    window: SamplingWindow,
    progress: watch::Sender<SamplingProgress>,
) -> Result<(String, SampleSet)>
where
    S: AxisSampleSource,
{
    let source = sampler.describe();
    eprintln!(
        "Reading {} for {}s - DO NOT TOUCH ANYTHING\n",
        source,
        window.duration.as_secs()
    );

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let samples = sampler.collect(window, interrupt, Some(progress)).await?;
    info!("Collected {} samples from {}", samples.total(), source);
    Ok((source, samples))
}

// Ends when the sampler drops its sender
async fn show_progress(mut rx: watch::Receiver<SamplingProgress>) {
    let mut shown = None;

    while rx.changed().await.is_ok() {
        let progress = *rx.borrow_and_update();
        let tenth = progress.elapsed.as_millis() / 100;
        if shown == Some(tenth) {
            continue;
        }
        shown = Some(tenth);

        let mut stderr = std::io::stderr();
        let _ = write!(
            stderr,
            "\r  {:.1}s / {}s",
            progress.elapsed.as_secs_f64(),
            progress.total.as_secs()
        );
        let _ = stderr.flush();
    }

    eprint!("\r{}\r", " ".repeat(40));
}

fn setup(cli: &Cli) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    setup_logging(level);
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_device_and_duration() {
        let cli = Cli::try_parse_from(["noisecal", "/dev/input/event4", "-s", "10"]).unwrap();
        assert_eq!(cli.device, Some(PathBuf::from("/dev/input/event4")));
        assert_eq!(cli.seconds, Some(10));
        assert!(!cli.evtest);
        assert_eq!(cli.format, ReportFormat::Text);
    }

    #[test]
    fn evtest_mode_excludes_a_device() {
        assert!(Cli::try_parse_from(["noisecal", "--evtest", "--seconds", "3"]).is_ok());
        assert!(Cli::try_parse_from(["noisecal", "--evtest", "/dev/input/event4"]).is_err());
    }

    #[test]
    fn toml_format_is_selectable() {
        let cli = Cli::try_parse_from(["noisecal", "--format", "toml", "-vv"]).unwrap();
        assert_eq!(cli.format, ReportFormat::Toml);
        assert_eq!(cli.verbose, 2);
    }
}
