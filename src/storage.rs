//! Artifact persistence.
//!
//! Files follow the Steam screenshot numbering convention so tools that
//! already understand it can pick them up: the composite of a burst is
//! `YYYYMMDDHHmmss_1.png`, raw captures (debug only) follow as `_2`, `_3`, ...

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::capture::CaptureBurst;

/// Extension of every artifact written by the store.
pub const ARTIFACT_EXTENSION: &str = "png";

/// UTC second-resolution key shared by every file of one burst.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimestampKey(String);

impl TimestampKey {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for sequence number `seq` (1 = composite).
    pub fn file_name(&self, seq: usize) -> String {
        format!("{}_{}.{}", self.as_str(), seq, ARTIFACT_EXTENSION)
    }
}

impl std::fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths written for one burst.
#[derive(Clone, Debug)]
pub struct PersistedArtifacts {
    /// The composite, always `{key}_1.png`
    pub composite: PathBuf,
    /// Raw captures in burst order (empty unless debug)
    pub raw: Vec<PathBuf>,
}

impl PersistedArtifacts {
    pub fn file_count(&self) -> usize {
        1 + self.raw.len()
    }
}

/// Writes composites (and optionally raw captures) into the data directory.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    data_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persists a burst's composite, plus every raw capture when `debug` is set.
    ///
    /// Refuses to overwrite an existing composite for the same key, which can
    /// only happen if two bursts land in the same wall-clock second.
    pub fn persist(
        &self,
        key: &TimestampKey,
        composite: &RgbaImage,
        burst: &CaptureBurst,
        debug: bool,
    ) -> Result<PersistedArtifacts> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory {}", self.data_dir.display())
        })?;

        let composite_path = self.data_dir.join(key.file_name(1));
        if composite_path.exists() {
            return Err(anyhow!(
                "Refusing to overwrite existing artifact {}",
                composite_path.display()
            ));
        }

        composite
            .save(&composite_path)
            .with_context(|| format!("Failed to save composite {}", composite_path.display()))?;
        debug!("Saved composite to {}", composite_path.display());

        let mut raw = Vec::new();
        if debug {
            for (i, capture) in burst.captures().iter().enumerate() {
                let path = self.data_dir.join(key.file_name(i + 2));
                capture
                    .save(&path)
                    .with_context(|| format!("Failed to save raw capture {}", path.display()))?;
                debug!("Saved raw capture {} to {}", i + 1, path.display());
                raw.push(path);
            }
        }

        Ok(PersistedArtifacts {
            composite: composite_path,
            raw,
        })
    }
}
