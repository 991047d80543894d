//! Configuration types for the capture agent.
//!
//! Loads settings from config.json at startup. Provides poll timing, burst
//! size, upload endpoint, compositing options and detection templates.
//! Command-line flags are applied on top of the loaded file.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::composite::{CompositeMode, DEFAULT_MASK_VALUE};
use crate::detection::{RelativeRect, SummaryType, TemplateSpec};

/// What to do when a poll cycle fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleErrorPolicy {
    /// Stop the agent and exit with an error
    #[default]
    Abort,
    /// Log the failure and keep polling
    Skip,
}

/// Complete agent configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds to sleep between poll cycles
    pub interval_secs: u64,
    /// Number of captures per burst
    pub num_images: u32,
    /// Delay between captures within a burst (milliseconds)
    pub capture_delay_ms: u64,
    /// Endpoint receiving the composite as multipart field `file`
    pub upload_url: String,
    /// Per-request timeout for uploads (seconds)
    pub upload_timeout_secs: u64,
    /// Extra upload attempts after a failure
    pub upload_retries: u32,
    /// Delay between upload attempts (milliseconds)
    pub upload_retry_delay_ms: u64,
    /// Error handling for a failed cycle
    pub on_cycle_error: CycleErrorPolicy,
    /// How a burst is reduced to one image
    pub composite_mode: CompositeMode,
    /// Gray level of the blend mask (weight of the running composite)
    pub mask_value: u8,
    /// Where artifacts are written (defaults to `<exe_dir>/data`)
    pub data_dir: Option<PathBuf>,
    /// Where reference images live (defaults to `<exe_dir>/resources/template`)
    pub template_dir: Option<PathBuf>,
    /// Histogram similarity at or above which a template matches (0.0-1.0)
    pub similarity_threshold: f32,
    /// Named detection regions in relative coordinates
    pub regions: BTreeMap<String, RelativeRect>,
    /// Reference templates checked on every poll, in order
    pub templates: Vec<TemplateSpec>,
}

pub const DEFAULT_UPLOAD_URL: &str = "http://localhost:8000/uploadfile/";

fn default_regions() -> BTreeMap<String, RelativeRect> {
    let mut regions = BTreeMap::new();
    // Header banner of the squad summary page
    regions.insert("squad_header".to_string(), RelativeRect::new(0.05, 0.08, 0.25, 0.06));
    regions.insert("personal_header".to_string(), RelativeRect::new(0.05, 0.02, 0.25, 0.06));
    regions
}

fn default_templates() -> Vec<TemplateSpec> {
    vec![
        TemplateSpec {
            summary: SummaryType::Squad,
            region: "squad_header".to_string(),
            reference: "squad_summary.png".to_string(),
        },
        TemplateSpec {
            summary: SummaryType::Personal,
            region: "personal_header".to_string(),
            reference: "personal_summary.png".to_string(),
        },
    ]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            num_images: 5,
            capture_delay_ms: 500,
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            upload_timeout_secs: 30,
            upload_retries: 0,
            upload_retry_delay_ms: 1000,
            on_cycle_error: CycleErrorPolicy::default(),
            composite_mode: CompositeMode::default(),
            mask_value: DEFAULT_MASK_VALUE,
            data_dir: None,
            template_dir: None,
            similarity_threshold: 0.85,
            regions: default_regions(),
            templates: default_templates(),
        }
    }
}

/// Values given on the command line; `None` keeps the config-file value.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub interval_secs: Option<u64>,
    pub num_images: Option<u32>,
    pub upload_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub keep_going: bool,
}

impl AgentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn upload_retry_delay(&self) -> Duration {
        Duration::from_millis(self.upload_retry_delay_ms)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(crate::paths::get_data_dir)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.template_dir
            .clone()
            .unwrap_or_else(crate::paths::get_template_dir)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(interval) = overrides.interval_secs {
            self.interval_secs = interval;
        }
        if let Some(n) = overrides.num_images {
            self.num_images = n;
        }
        if let Some(url) = overrides.upload_url {
            self.upload_url = url;
        }
        if let Some(dir) = overrides.data_dir {
            self.data_dir = Some(dir);
        }
        if overrides.keep_going {
            self.on_cycle_error = CycleErrorPolicy::Skip;
        }
    }

    /// Rejects settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_images == 0 {
            return Err(anyhow!("num_images must be at least 1"));
        }
        reqwest::Url::parse(&self.upload_url)
            .map_err(|e| anyhow!("Invalid upload URL \"{}\": {}", self.upload_url, e))?;
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(anyhow!(
                "similarity_threshold must be between 0.0 and 1.0, got {}",
                self.similarity_threshold
            ));
        }
        for template in &self.templates {
            if !self.regions.contains_key(&template.region) {
                return Err(anyhow!(
                    "Template for {} refers to unknown region \"{}\"",
                    template.summary,
                    template.region
                ));
            }
        }
        Ok(())
    }
}

/// Loads configuration from `path`, falling back to defaults.
///
/// A missing file is normal. An unreadable or malformed file is logged and
/// replaced by defaults so the agent still starts.
pub fn load_config(path: &Path) -> AgentConfig {
    info!("Looking for config at: {}", path.display());

    if !path.exists() {
        info!("{} not found. Using default config.", path.display());
        return AgentConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                AgentConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            AgentConfig::default()
        }
    }
}
