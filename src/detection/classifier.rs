//! Summary page categories and the classifier contract.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Post-match page currently on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    /// Squad summary (the page the agent captures)
    Squad,
    /// Personal summary
    Personal,
    /// No summary page detected
    None,
}

impl std::fmt::Display for SummaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryType::Squad => write!(f, "squad summary"),
            SummaryType::Personal => write!(f, "personal summary"),
            SummaryType::None => write!(f, "no summary"),
        }
    }
}

/// Inspects the current screen and reports which summary page is showing.
pub trait SummaryClassifier {
    /// `debug` enables diagnostic output from the classifier.
    fn classify(&mut self, debug: bool) -> Result<SummaryType>;
}
