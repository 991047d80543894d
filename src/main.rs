//! Summary Capture Agent
//!
//! Watches the primary display for the squad summary page. When it appears,
//! takes a burst of screenshots, blends them into one composite, saves it
//! under a timestamped name and uploads it to the processing endpoint.

mod agent;
mod capture;
mod clock;
mod composite;
mod detection;
mod logging;
mod paths;
mod storage;
mod upload;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use agent::{
    install_signal_handler, load_config, Agent, AgentConfig, ConfigOverrides, CycleSettings,
    ShutdownToken,
};
use capture::{primary_display, MonitorGrabber};
use detection::{scale_regions, TemplateClassifier};
use storage::ArtifactStore;
use upload::HttpUploader;

/// Capture summary screens in bursts and upload the composite.
#[derive(Parser, Debug)]
#[command(name = "summary-capture", version, about)]
struct Cli {
    /// Seconds to sleep between poll cycles
    #[arg(short, long)]
    interval: Option<u64>,

    /// Number of screenshots per burst
    #[arg(short = 'n', long = "num-images")]
    num_images: Option<u32>,

    /// Endpoint receiving the composite image
    #[arg(short, long)]
    url: Option<String>,

    /// Verbose logging and keep every raw capture on disk
    #[arg(short, long)]
    debug: bool,

    /// Path to config.json (defaults to the one next to the executable)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log failed cycles and keep polling instead of exiting
    #[arg(long)]
    keep_going: bool,

    /// Directory for saved images
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            interval_secs: self.interval,
            num_images: self.num_images,
            upload_url: self.url.clone(),
            data_dir: self.data_dir.clone(),
            keep_going: self.keep_going,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    #[cfg(windows)]
    unsafe {
        windows::Win32::System::WinRT::RoInitialize(
            windows::Win32::System::WinRT::RO_INIT_MULTITHREADED,
        )?
    };

    let config_path = cli.config.clone().unwrap_or_else(paths::get_config_path);
    let log_dir = cli.log_dir.clone().unwrap_or_else(paths::get_logs_dir);

    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let log_path = logging::init_logging(&log_dir, cli.debug)?;
    info!("Logging to {}", log_path.display());

    let mut config = load_config(&config_path);
    config.apply_overrides(cli.overrides());
    config.validate().context("Invalid configuration")?;

    let data_dir = config.data_dir();
    paths::ensure_directories(&log_dir, &data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let shutdown = ShutdownToken::new();
    install_signal_handler(&shutdown)?;

    let mut agent = build_agent(&config, cli.debug, data_dir)?.with_shutdown(shutdown);
    let summary = agent.run()?;

    info!(
        "Exiting: {} cycle(s), {} burst(s) delivered",
        summary.cycles, summary.delivered
    );
    Ok(())
}

fn build_agent(
    config: &AgentConfig,
    debug: bool,
    data_dir: PathBuf,
) -> Result<Agent<TemplateClassifier<MonitorGrabber>, MonitorGrabber, HttpUploader>> {
    let screen = primary_display().context("Failed to locate the primary display")?;
    let (left, top, right, bottom) = screen.bbox();
    info!("Primary display: {} (bounds {}, {}, {}, {})", screen, left, top, right, bottom);

    let regions = scale_regions(&config.regions, &screen);
    info!("Calibrated {} detection region(s)", regions.len());

    let template_dir = config.template_dir();
    let classifier = TemplateClassifier::load(
        MonitorGrabber::new()?,
        screen,
        &regions,
        &config.templates,
        &template_dir,
        config.similarity_threshold,
    )?;

    let uploader = HttpUploader::new(config.upload_url.clone(), config.upload_timeout())?;
    info!("Uploading composites to {}", uploader.url());

    Ok(Agent::new(
        classifier,
        MonitorGrabber::new()?,
        uploader,
        ArtifactStore::new(data_dir),
        screen,
        CycleSettings::from_config(config, debug),
    ))
}
