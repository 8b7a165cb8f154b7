//! Per-edge gate policies.
//!
//! A [`PolicySet`] holds at most one [`GatePolicy`] per [`Transition`]. The
//! serialized form is keyed by transition name so it reads naturally in TOML:
//!
//! ```toml
//! [policies.feature_to_dev]
//! required_checks = ["lint", "unittests"]
//!
//! [policies.dev_to_test.metrics.accuracy]
//! direction = "higher_is_better"
//! tolerance = 0.05
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{PromotionError, Result};
use super::stage::Transition;

/// Which way a metric is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Allowed relative regression for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricTolerance {
    pub direction: MetricDirection,
    /// Fraction of the baseline the metric may move in the unfavorable
    /// direction (0.05 = five percent).
    pub tolerance: f64,
}

impl MetricTolerance {
    pub fn higher_is_better(tolerance: f64) -> Self {
        Self {
            direction: MetricDirection::HigherIsBetter,
            tolerance,
        }
    }

    pub fn lower_is_better(tolerance: f64) -> Self {
        Self {
            direction: MetricDirection::LowerIsBetter,
            tolerance,
        }
    }
}

/// Configuration for one gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Checks that must all pass (quality gate). Declared order is the order
    /// reasons are reported in.
    #[serde(default)]
    pub required_checks: Vec<String>,
    /// Metric tolerance table (model gate).
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricTolerance>,
}

impl GatePolicy {
    pub fn with_check(mut self, name: impl Into<String>) -> Self {
        self.required_checks.push(name.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, tolerance: MetricTolerance) -> Self {
        self.metrics.insert(name.into(), tolerance);
        self
    }

    fn validate(&self, transition: Transition) -> Result<()> {
        if let Some(empty) = self.required_checks.iter().find(|c| c.trim().is_empty()) {
            return Err(PromotionError::Config(format!(
                "policies.{transition}: empty check name {empty:?}"
            )));
        }
        for (name, tol) in &self.metrics {
            if name.trim().is_empty() {
                return Err(PromotionError::Config(format!(
                    "policies.{transition}: empty metric name"
                )));
            }
            if !tol.tolerance.is_finite() {
                return Err(PromotionError::Config(format!(
                    "policies.{transition}.metrics.{name}: tolerance must be finite"
                )));
            }
        }
        Ok(())
    }
}

/// One optional policy per promotion edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_to_dev: Option<GatePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_to_test: Option<GatePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_to_master: Option<GatePolicy>,
}

impl PolicySet {
    pub fn get(&self, transition: Transition) -> Option<&GatePolicy> {
        match transition {
            Transition::FeatureToDev => self.feature_to_dev.as_ref(),
            Transition::DevToTest => self.dev_to_test.as_ref(),
            Transition::TestToMaster => self.test_to_master.as_ref(),
        }
    }

    pub fn insert(&mut self, transition: Transition, policy: GatePolicy) {
        let slot = match transition {
            Transition::FeatureToDev => &mut self.feature_to_dev,
            Transition::DevToTest => &mut self.dev_to_test,
            Transition::TestToMaster => &mut self.test_to_master,
        };
        *slot = Some(policy);
    }

    pub fn with(mut self, transition: Transition, policy: GatePolicy) -> Self {
        self.insert(transition, policy);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for transition in Transition::ALL {
            if let Some(policy) = self.get(transition) {
                policy.validate(transition)?;
            }
        }
        Ok(())
    }
}
