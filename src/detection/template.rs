//! Reference-image summary classifier.
//!
//! Each template pairs a summary type with a calibrated screen region and a
//! reference PNG of that region. A poll captures the display once and compares
//! the luma histogram of every template region against its reference.

use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use super::classifier::{SummaryClassifier, SummaryType};
use super::regions::{PixelRect, ScaledRegions};
use crate::capture::{DisplayRect, ScreenGrabber};

/// Number of luma buckets used for histogram comparison.
const HISTOGRAM_BINS: usize = 32;

/// One entry of the `templates` config list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Summary type reported when this template matches
    pub summary: SummaryType,
    /// Name of the detection region to compare
    pub region: String,
    /// Reference image file name inside the template directory
    pub reference: String,
}

/// Normalized luma histogram of an image region.
#[derive(Clone, Debug, PartialEq)]
pub struct LumaHistogram([f32; HISTOGRAM_BINS]);

impl LumaHistogram {
    pub fn from_gray(img: &GrayImage) -> Self {
        let mut bins = [0f32; HISTOGRAM_BINS];
        let total = (img.width() * img.height()) as f32;
        if total == 0.0 {
            return Self(bins);
        }

        for pixel in img.pixels() {
            bins[pixel[0] as usize * HISTOGRAM_BINS / 256] += 1.0;
        }
        for bin in bins.iter_mut() {
            *bin /= total;
        }

        Self(bins)
    }

    pub fn from_rgba(img: &RgbaImage) -> Self {
        Self::from_gray(&image::imageops::grayscale(img))
    }

    /// Histogram intersection: 1.0 for identical distributions, 0.0 for disjoint ones.
    pub fn similarity(&self, other: &LumaHistogram) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a.min(*b))
            .sum()
    }
}

/// A loaded template ready for comparison.
struct Template {
    summary: SummaryType,
    region_name: String,
    region: PixelRect,
    reference: LumaHistogram,
}

/// Classifier that matches calibrated screen regions against reference images.
pub struct TemplateClassifier<G> {
    grabber: G,
    display: DisplayRect,
    templates: Vec<Template>,
    threshold: f32,
}

impl<G: ScreenGrabber> TemplateClassifier<G> {
    /// Loads every template's reference image from `template_dir`.
    ///
    /// Templates naming an unknown region are an error. Missing reference
    /// files are skipped with a warning.
    pub fn load(
        grabber: G,
        display: DisplayRect,
        regions: &ScaledRegions,
        specs: &[TemplateSpec],
        template_dir: &Path,
        threshold: f32,
    ) -> Result<Self> {
        let mut templates = Vec::new();

        for spec in specs {
            let region = regions
                .get(&spec.region)
                .with_context(|| format!("Template for {} is misconfigured", spec.summary))?;

            let path = template_dir.join(&spec.reference);
            if !path.exists() {
                warn!(
                    "Reference image {} for {} not found, skipping",
                    path.display(),
                    spec.summary
                );
                continue;
            }

            let reference = image::open(&path)
                .with_context(|| format!("Failed to load reference image {}", path.display()))?
                .to_luma8();

            templates.push(Template {
                summary: spec.summary,
                region_name: spec.region.clone(),
                region,
                reference: LumaHistogram::from_gray(&reference),
            });
        }

        if templates.is_empty() {
            warn!("{}", missing_templates_hint(template_dir, specs));
        } else {
            info!("Loaded {} summary template(s)", templates.len());
        }

        Ok(Self {
            grabber,
            display,
            templates,
            threshold,
        })
    }

    #[cfg(test)]
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

/// Startup message for a classifier that loaded no reference images.
///
/// Lists the files the config expects so the user knows what to capture.
pub fn missing_templates_hint(template_dir: &Path, specs: &[TemplateSpec]) -> String {
    if specs.is_empty() {
        return format!(
            "No templates configured; every poll will report no summary. \
             Add entries to \"templates\" in config.json and put their reference \
             images in {}",
            template_dir.display()
        );
    }

    let expected: Vec<String> = specs
        .iter()
        .map(|spec| format!("{} ({} region \"{}\")", spec.reference, spec.summary, spec.region))
        .collect();
    format!(
        "No reference images loaded; every poll will report no summary. \
         Crop each detection region from a screenshot of its page and save it \
         as PNG in {}: {}",
        template_dir.display(),
        expected.join(", ")
    )
}

impl<G: ScreenGrabber> SummaryClassifier for TemplateClassifier<G> {
    fn classify(&mut self, debug: bool) -> Result<SummaryType> {
        if self.templates.is_empty() {
            return Ok(SummaryType::None);
        }

        let screen = self
            .grabber
            .grab(&self.display)
            .context("Failed to capture screen for classification")?;

        for template in &self.templates {
            if template.region.is_empty() {
                continue;
            }
            let region = template.region.crop(&screen);
            let similarity = LumaHistogram::from_rgba(&region).similarity(&template.reference);

            if debug {
                debug!(
                    "{} similarity in region {}: {:.3} (threshold {:.3})",
                    template.summary, template.region_name, similarity, self.threshold
                );
            }

            if similarity >= self.threshold {
                return Ok(template.summary);
            }
        }

        Ok(SummaryType::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::screenshot::Capture;
    use crate::detection::regions::{scale_regions, RelativeRect};
    use image::{Luma, Rgba};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    /// Grabber returning a fixed frame.
    struct StaticGrabber(Capture);

    impl ScreenGrabber for StaticGrabber {
        fn grab(&mut self, _display: &DisplayRect) -> Result<Capture> {
            Ok(self.0.clone())
        }
    }

    fn display() -> DisplayRect {
        DisplayRect::new(0, 0, 40, 20)
    }

    /// Left half of the screen is the header region.
    fn regions() -> ScaledRegions {
        let mut map = BTreeMap::new();
        map.insert("header".to_string(), RelativeRect::new(0.0, 0.0, 0.5, 1.0));
        scale_regions(&map, &display())
    }

    fn squad_spec() -> TemplateSpec {
        TemplateSpec {
            summary: SummaryType::Squad,
            region: "header".to_string(),
            reference: "squad.png".to_string(),
        }
    }

    /// Screen whose header region is bright and the rest dark.
    fn summary_screen() -> Capture {
        Capture::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgba([230, 230, 230, 255])
            } else {
                Rgba([10, 10, 10, 255])
            }
        })
    }

    #[test]
    fn test_histogram_similarity_bounds() {
        let bright = GrayImage::from_pixel(4, 4, Luma([240]));
        let dark = GrayImage::from_pixel(4, 4, Luma([5]));

        let a = LumaHistogram::from_gray(&bright);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.similarity(&LumaHistogram::from_gray(&dark)), 0.0);
    }

    #[test]
    fn test_histogram_of_empty_image() {
        let empty = GrayImage::new(0, 0);
        let h = LumaHistogram::from_gray(&empty);
        assert_eq!(h.similarity(&h), 0.0);
    }

    #[test]
    fn test_classify_matches_reference() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(20, 20, Luma([230]))
            .save(dir.path().join("squad.png"))
            .unwrap();

        let mut classifier = TemplateClassifier::load(
            StaticGrabber(summary_screen()),
            display(),
            &regions(),
            &[squad_spec()],
            dir.path(),
            0.85,
        )
        .unwrap();

        assert_eq!(classifier.template_count(), 1);
        assert_eq!(classifier.classify(true).unwrap(), SummaryType::Squad);
    }

    #[test]
    fn test_classify_reports_none_on_other_screens() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(20, 20, Luma([230]))
            .save(dir.path().join("squad.png"))
            .unwrap();

        let gameplay = Capture::from_pixel(40, 20, Rgba([60, 60, 60, 255]));
        let mut classifier = TemplateClassifier::load(
            StaticGrabber(gameplay),
            display(),
            &regions(),
            &[squad_spec()],
            dir.path(),
            0.85,
        )
        .unwrap();

        assert_eq!(classifier.classify(false).unwrap(), SummaryType::None);
    }

    #[test]
    fn test_missing_reference_is_skipped() {
        let dir = tempdir().unwrap();
        let mut classifier = TemplateClassifier::load(
            StaticGrabber(summary_screen()),
            display(),
            &regions(),
            &[squad_spec()],
            dir.path(),
            0.85,
        )
        .unwrap();

        assert_eq!(classifier.template_count(), 0);
        assert_eq!(classifier.classify(false).unwrap(), SummaryType::None);
    }

    #[test]
    fn test_missing_templates_hint_names_expected_files() {
        let dir = Path::new("/opt/agent/resources/template");
        let hint = missing_templates_hint(dir, &[squad_spec()]);

        assert!(hint.contains("/opt/agent/resources/template"));
        assert!(hint.contains(&squad_spec().reference));
        assert!(hint.contains("squad summary"));

        let empty = missing_templates_hint(dir, &[]);
        assert!(empty.contains("\"templates\""));
    }

    #[test]
    fn test_unknown_region_is_an_error() {
        let dir = tempdir().unwrap();
        let mut spec = squad_spec();
        spec.region = "nowhere".to_string();

        let result = TemplateClassifier::load(
            StaticGrabber(summary_screen()),
            display(),
            &regions(),
            &[spec],
            dir.path(),
            0.85,
        );
        assert!(result.is_err());
    }
}
