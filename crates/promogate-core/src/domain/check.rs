//! Outcome of a single quality check.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Fail,
    /// The check could not produce a verdict (crash, timeout, unknown check).
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
    pub detail: String,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_outcome(name, CheckOutcome::Pass, detail, duration_ms)
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_outcome(name, CheckOutcome::Fail, detail, duration_ms)
    }

    pub fn error(name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self::with_outcome(name, CheckOutcome::Error, detail, duration_ms)
    }

    fn with_outcome(
        name: impl Into<String>,
        outcome: CheckOutcome,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            outcome,
            detail: detail.into(),
            duration_ms,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == CheckOutcome::Pass
    }
}
