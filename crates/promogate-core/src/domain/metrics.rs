//! Model metric snapshots compared by the dev→test gate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which side of the comparison a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotRole {
    Candidate,
    Baseline,
}

/// Metric name → value for one model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Registry reference of the model these metrics describe.
    pub model_ref: String,
    pub role: SnapshotRole,
    pub metrics: BTreeMap<String, f64>,
}

impl MetricsSnapshot {
    pub fn new(model_ref: impl Into<String>, role: SnapshotRole) -> Self {
        Self {
            model_ref: model_ref.into(),
            role,
            metrics: BTreeMap::new(),
        }
    }

    pub fn baseline(model_ref: impl Into<String>) -> Self {
        Self::new(model_ref, SnapshotRole::Baseline)
    }

    pub fn candidate(model_ref: impl Into<String>) -> Self {
        Self::new(model_ref, SnapshotRole::Candidate)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Finite value of `name`, if present. NaN and infinities count as absent.
    pub fn finite(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }
}
