//! The allow/block verdict returned to the CI platform.
//!
//! Serialized decisions are rendered verbatim by callers, so field names and
//! reason codes are part of the external contract.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Allow,
    Block,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Block => "block",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable cause attached to every blocking reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InvalidStageTransition,
    MissingPolicy,
    CheckFailed,
    CheckErrored,
    MetricRegressed,
    MissingMetric,
    BaselineUnavailable,
    CandidateMetricsUnavailable,
    MissingCredentials,
    BuildFailed,
    PublishFailed,
    HealthCheckTimeout,
    RollbackFailed,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidStageTransition => "invalid_stage_transition",
            ReasonCode::MissingPolicy => "missing_policy",
            ReasonCode::CheckFailed => "check_failed",
            ReasonCode::CheckErrored => "check_errored",
            ReasonCode::MetricRegressed => "metric_regressed",
            ReasonCode::MissingMetric => "missing_metric",
            ReasonCode::BaselineUnavailable => "baseline_unavailable",
            ReasonCode::CandidateMetricsUnavailable => "candidate_metrics_unavailable",
            ReasonCode::MissingCredentials => "missing_credentials",
            ReasonCode::BuildFailed => "build_failed",
            ReasonCode::PublishFailed => "publish_failed",
            ReasonCode::HealthCheckTimeout => "health_check_timeout",
            ReasonCode::RollbackFailed => "rollback_failed",
        }
    }

    /// Configuration errors are reported before any side effect and are
    /// never worth retrying without changing the request or the config.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ReasonCode::InvalidStageTransition
                | ReasonCode::MissingPolicy
                | ReasonCode::MissingCredentials
                | ReasonCode::MissingMetric
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub message: String,
}

impl Reason {
    pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// What happened to the compensating re-publish after a failed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackStatus {
    NoPriorDeployment,
    Succeeded {
        artifact: String,
        published_ref: String,
    },
    Failed {
        artifact: String,
        detail: String,
    },
}

/// Verdict of one evaluation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reasons: Vec<Reason>,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackStatus>,
}

impl Decision {
    pub fn allow(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            outcome: Outcome::Allow,
            reasons: Vec::new(),
            evaluated_at,
            rollback: None,
        }
    }

    /// A decision whose outcome follows from `reasons`: empty means allow.
    pub fn from_reasons(reasons: Vec<Reason>, evaluated_at: DateTime<Utc>) -> Self {
        let outcome = if reasons.is_empty() {
            Outcome::Allow
        } else {
            Outcome::Block
        };
        Self {
            outcome,
            reasons,
            evaluated_at,
            rollback: None,
        }
    }

    pub fn block(reason: Reason, evaluated_at: DateTime<Utc>) -> Self {
        Self::from_reasons(vec![reason], evaluated_at)
    }

    pub fn with_rollback(mut self, rollback: Option<RollbackStatus>) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    pub fn reason_codes(&self) -> Vec<ReasonCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.reasons.iter().map(|r| r.message.as_str()).collect()
    }
}
