//! Poll loop: classify → capture burst → composite → persist → upload.
//!
//! The loop is single-threaded and synchronous. A cycle always runs to
//! completion before the stop flag is checked again, so bursts never overlap
//! and a stop request never cuts a burst or upload short.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agent::config::{AgentConfig, CycleErrorPolicy};
use crate::agent::shutdown::ShutdownToken;
use crate::capture::{capture_burst, DisplayRect, ScreenGrabber};
use crate::clock::{Clock, SystemClock};
use crate::composite::{composite_burst, CompositeMode};
use crate::detection::{SummaryClassifier, SummaryType};
use crate::storage::{ArtifactStore, PersistedArtifacts, TimestampKey};
use crate::upload::{UploadRecord, UploadSink};

/// The page that triggers a capture burst.
pub const TARGET_SUMMARY: SummaryType = SummaryType::Squad;

/// A failed cycle, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("summary classification failed: {0:#}")]
    Classify(anyhow::Error),
    #[error("burst capture failed: {0:#}")]
    Capture(anyhow::Error),
    #[error("compositing failed: {0:#}")]
    Composite(anyhow::Error),
    #[error("saving artifacts failed: {0:#}")]
    Persist(anyhow::Error),
    #[error("upload failed: {0:#}")]
    Upload(anyhow::Error),
}

impl CycleError {
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Classify(_) => "classify",
            CycleError::Capture(_) => "capture",
            CycleError::Composite(_) => "composite",
            CycleError::Persist(_) => "persist",
            CycleError::Upload(_) => "upload",
        }
    }
}

/// Result of one full pipeline pass.
#[derive(Debug)]
pub struct CycleReport {
    pub key: TimestampKey,
    pub burst_size: usize,
    pub artifacts: PersistedArtifacts,
    pub upload: UploadRecord,
}

/// What a successful cycle did.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The target page was not on screen
    Idle(SummaryType),
    /// A burst was captured, stored and uploaded
    Delivered(CycleReport),
}

/// Counters returned when the loop stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Per-cycle settings derived from the config and the debug flag.
#[derive(Clone, Debug)]
pub struct CycleSettings {
    pub interval: Duration,
    pub burst_size: usize,
    pub capture_delay: Duration,
    pub composite_mode: CompositeMode,
    pub mask_value: u8,
    pub debug: bool,
    pub on_error: CycleErrorPolicy,
    pub upload_retries: u32,
    pub upload_retry_delay: Duration,
}

impl CycleSettings {
    pub fn from_config(config: &AgentConfig, debug: bool) -> Self {
        Self {
            interval: config.interval(),
            burst_size: config.num_images as usize,
            capture_delay: config.capture_delay(),
            composite_mode: config.composite_mode,
            mask_value: config.mask_value,
            debug,
            on_error: config.on_cycle_error,
            upload_retries: config.upload_retries,
            upload_retry_delay: config.upload_retry_delay(),
        }
    }
}

/// The capture agent: owns its collaborators and drives the poll loop.
pub struct Agent<S, G, U, C = SystemClock> {
    classifier: S,
    grabber: G,
    uploader: U,
    clock: C,
    store: ArtifactStore,
    display: DisplayRect,
    settings: CycleSettings,
    shutdown: ShutdownToken,
}

impl<S, G, U> Agent<S, G, U, SystemClock>
where
    S: SummaryClassifier,
    G: ScreenGrabber,
    U: UploadSink,
{
    pub fn new(
        classifier: S,
        grabber: G,
        uploader: U,
        store: ArtifactStore,
        display: DisplayRect,
        settings: CycleSettings,
    ) -> Self {
        Self {
            classifier,
            grabber,
            uploader,
            clock: SystemClock,
            store,
            display,
            settings,
            shutdown: ShutdownToken::new(),
        }
    }
}

impl<S, G, U, C> Agent<S, G, U, C>
where
    S: SummaryClassifier,
    G: ScreenGrabber,
    U: UploadSink,
    C: Clock,
{
    /// Replaces the time source used for sleeps and timestamps.
    #[cfg(test)]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Agent<S, G, U, C2> {
        Agent {
            classifier: self.classifier,
            grabber: self.grabber,
            uploader: self.uploader,
            clock,
            store: self.store,
            display: self.display,
            settings: self.settings,
            shutdown: self.shutdown,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Polls until the shutdown token is cleared.
    ///
    /// Every iteration ends with the inter-cycle sleep. Under the `abort`
    /// policy the first failed cycle ends the run with that error.
    pub fn run(&mut self) -> Result<RunSummary> {
        info!(
            "Polling every {}s, {} capture(s) per burst, saving to {}",
            self.settings.interval.as_secs(),
            self.settings.burst_size,
            self.store.data_dir().display()
        );

        let mut summary = RunSummary::default();

        while self.shutdown.is_running() {
            summary.cycles += 1;

            match self.run_cycle() {
                Ok(CycleOutcome::Idle(page)) => {
                    debug!("Current screen: {}", page);
                }
                Ok(CycleOutcome::Delivered(report)) => {
                    summary.delivered += 1;
                    info!(
                        "Burst {} delivered: {} ({} captures, {} file(s) saved, HTTP {})",
                        report.key,
                        report.artifacts.composite.display(),
                        report.burst_size,
                        report.artifacts.file_count(),
                        report.upload.status
                    );
                    info!("Server response: {}", report.upload.response);
                }
                Err(e) => match self.settings.on_error {
                    CycleErrorPolicy::Abort => {
                        error!("Cycle failed at {} stage, stopping: {}", e.stage(), e);
                        return Err(e.into());
                    }
                    CycleErrorPolicy::Skip => {
                        summary.failed += 1;
                        error!("Cycle failed at {} stage, continuing: {}", e.stage(), e);
                    }
                },
            }

            self.clock.sleep(self.settings.interval);
        }

        info!(
            "Stopped after {} cycle(s): {} delivered, {} failed",
            summary.cycles, summary.delivered, summary.failed
        );
        Ok(summary)
    }

    /// Runs one poll cycle without the trailing inter-cycle sleep.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        debug!("Detecting summary page on screen...");
        let summary = self
            .classifier
            .classify(self.settings.debug)
            .map_err(CycleError::Classify)?;

        if summary != TARGET_SUMMARY {
            return Ok(CycleOutcome::Idle(summary));
        }
        info!("Squad summary page detected");

        let burst = capture_burst(
            &mut self.grabber,
            &self.display,
            self.settings.burst_size,
            self.settings.capture_delay,
            &self.clock,
        )
        .map_err(CycleError::Capture)?;

        let composite = composite_burst(
            &burst,
            self.settings.composite_mode,
            self.settings.mask_value,
        )
        .map_err(CycleError::Composite)?;

        let key = TimestampKey::from_datetime(self.clock.now());
        let artifacts = self
            .store
            .persist(&key, &composite, &burst, self.settings.debug)
            .map_err(CycleError::Persist)?;
        debug!("Saved {} file(s) for burst {}", artifacts.file_count(), key);

        let upload = self
            .upload_with_retries(&artifacts.composite)
            .map_err(CycleError::Upload)?;
        info!("Sent file to server");

        Ok(CycleOutcome::Delivered(CycleReport {
            key,
            burst_size: burst.len(),
            artifacts,
            upload,
        }))
    }

    fn upload_with_retries(&self, path: &Path) -> Result<UploadRecord> {
        let attempts = self.settings.upload_retries + 1;
        let mut attempt = 1;

        loop {
            match self.uploader.upload(path) {
                Ok(record) => return Ok(record),
                Err(e) if attempt < attempts => {
                    warn!("Upload attempt {}/{} failed: {:#}", attempt, attempts, e);
                    self.clock.sleep(self.settings.upload_retry_delay);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("Giving up after {} attempt(s)", attempts)));
                }
            }
        }
    }
}
