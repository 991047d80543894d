//! Summary page detection.
//!
//! This module provides:
//! - The classifier contract (`SummaryClassifier`, `SummaryType`)
//! - Detection region calibration (`scale_regions`)
//! - A reference-image classifier (`TemplateClassifier`)

pub mod classifier;
pub mod regions;
pub mod template;

pub use classifier::{SummaryClassifier, SummaryType};
pub use regions::{scale_regions, RelativeRect};
pub use template::{TemplateClassifier, TemplateSpec};
