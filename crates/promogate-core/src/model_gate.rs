//! dev → test gate: candidate model metrics against the production baseline.
//!
//! For each metric in the policy's tolerance table:
//!
//! ```text
//! delta = (candidate - baseline) / |baseline|
//! higher_is_better: regressed iff delta < -tolerance
//! lower_is_better:  regressed iff delta >  tolerance
//! ```
//!
//! A zero baseline has no relative scale. If the candidate equals it the
//! delta is 0; otherwise the delta is unbounded (`delta: None`) and the
//! metric regresses exactly when the candidate moved the unfavorable way.
//!
//! The gate fails closed: an unreachable baseline, a missing candidate
//! snapshot, or a metric absent from either side blocks without comparing.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::MetricsRegistry;
use crate::domain::{
    CandidateRef, GateEvidence, GatePolicy, MetricDirection, MetricTolerance, MetricsSnapshot,
    Reason, ReasonCode,
};

/// Comparison of one metric between candidate and baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: String,
    pub direction: MetricDirection,
    pub tolerance: f64,
    pub baseline: f64,
    pub candidate: f64,
    /// Relative change; `None` when the baseline is zero and the candidate
    /// differs from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    pub regressed: bool,
}

impl MetricComparison {
    pub fn compute(metric: &str, rule: MetricTolerance, baseline: f64, candidate: f64) -> Self {
        let delta = relative_delta(baseline, candidate);
        let regressed = match (rule.direction, delta) {
            (MetricDirection::HigherIsBetter, Some(d)) => d < -rule.tolerance,
            (MetricDirection::LowerIsBetter, Some(d)) => d > rule.tolerance,
            (MetricDirection::HigherIsBetter, None) => candidate < baseline,
            (MetricDirection::LowerIsBetter, None) => candidate > baseline,
        };
        Self {
            metric: metric.to_string(),
            direction: rule.direction,
            tolerance: rule.tolerance,
            baseline,
            candidate,
            delta,
            regressed,
        }
    }

    fn reason(&self) -> Reason {
        let delta = match self.delta {
            Some(d) => format!("{d:+.4}"),
            None if self.candidate > self.baseline => "+inf".to_string(),
            None => "-inf".to_string(),
        };
        Reason::new(
            ReasonCode::MetricRegressed,
            format!(
                "metric {} regressed: baseline {} -> candidate {}, delta {} exceeds tolerance {}",
                self.metric, self.baseline, self.candidate, delta, self.tolerance
            ),
        )
    }
}

fn relative_delta(baseline: f64, candidate: f64) -> Option<f64> {
    if baseline == 0.0 {
        (candidate == 0.0).then_some(0.0)
    } else {
        Some((candidate - baseline) / baseline.abs())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelVerdict {
    pub baseline: Option<MetricsSnapshot>,
    pub candidate: Option<MetricsSnapshot>,
    pub comparisons: Vec<MetricComparison>,
    pub reasons: Vec<Reason>,
}

impl ModelVerdict {
    fn blocked(
        baseline: Option<MetricsSnapshot>,
        candidate: Option<MetricsSnapshot>,
        reasons: Vec<Reason>,
    ) -> Self {
        Self {
            baseline,
            candidate,
            comparisons: Vec::new(),
            reasons,
        }
    }

    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn into_evidence(self) -> (GateEvidence, Vec<Reason>) {
        (
            GateEvidence::Model {
                baseline: self.baseline,
                candidate: self.candidate,
                comparisons: self.comparisons,
            },
            self.reasons,
        )
    }
}

/// Compare two snapshots under `policy`. Pure; no I/O.
pub fn compare_snapshots(
    policy: &GatePolicy,
    baseline: MetricsSnapshot,
    candidate: MetricsSnapshot,
) -> ModelVerdict {
    let mut missing = Vec::new();
    for name in policy.metrics.keys() {
        let sides: Vec<&str> = [("baseline", &baseline), ("candidate", &candidate)]
            .into_iter()
            .filter(|(_, snap)| snap.finite(name).is_none())
            .map(|(side, _)| side)
            .collect();
        if !sides.is_empty() {
            missing.push(Reason::new(
                ReasonCode::MissingMetric,
                format!("metric {name} missing from {}", sides.join(" and ")),
            ));
        }
    }
    if !missing.is_empty() {
        return ModelVerdict::blocked(Some(baseline), Some(candidate), missing);
    }

    let mut comparisons = Vec::with_capacity(policy.metrics.len());
    let mut reasons = Vec::new();
    for (name, rule) in &policy.metrics {
        let (Some(b), Some(c)) = (baseline.finite(name), candidate.finite(name)) else {
            continue;
        };
        let cmp = MetricComparison::compute(name, *rule, b, c);
        debug!(metric = %name, baseline = b, candidate = c, delta = ?cmp.delta, regressed = cmp.regressed, "metric compared");
        if cmp.regressed {
            reasons.push(cmp.reason());
        }
        comparisons.push(cmp);
    }

    ModelVerdict {
        baseline: Some(baseline),
        candidate: Some(candidate),
        comparisons,
        reasons,
    }
}

/// Fetch both snapshots and compare them.
pub async fn run_model_gate(
    registry: &dyn MetricsRegistry,
    model_name: &str,
    policy: &GatePolicy,
    candidate: &CandidateRef,
) -> ModelVerdict {
    let baseline = match registry.fetch_baseline(model_name).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(model = %model_name, error = %err, "baseline fetch failed");
            return ModelVerdict::blocked(
                None,
                None,
                vec![Reason::new(
                    ReasonCode::BaselineUnavailable,
                    format!("baseline unavailable: {}", err),
                )],
            );
        }
    };

    let candidate_snapshot = match registry.fetch_candidate(model_name, candidate).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(model = %model_name, candidate = %candidate, error = %err, "candidate metrics fetch failed");
            return ModelVerdict::blocked(
                Some(baseline),
                None,
                vec![Reason::new(
                    ReasonCode::CandidateMetricsUnavailable,
                    format!("candidate metrics unavailable: {}", err),
                )],
            );
        }
    };

    compare_snapshots(policy, baseline, candidate_snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accuracy_policy(tolerance: f64) -> GatePolicy {
        GatePolicy::default().with_metric("accuracy", MetricTolerance::higher_is_better(tolerance))
    }

    #[test]
    fn relative_delta_uses_absolute_baseline() {
        assert_eq!(relative_delta(-2.0, -1.0), Some(0.5));
        assert_eq!(relative_delta(0.0, 0.0), Some(0.0));
        assert_eq!(relative_delta(0.0, 0.1), None);
    }

    #[test]
    fn small_drop_within_tolerance_allows() {
        let v = compare_snapshots(
            &accuracy_policy(0.05),
            MetricsSnapshot::baseline("prod").with_metric("accuracy", 0.80),
            MetricsSnapshot::candidate("cand").with_metric("accuracy", 0.78),
        );
        assert!(v.passed());
        let delta = v.comparisons[0].delta.unwrap();
        assert!((delta - -0.025).abs() < 1e-9);
    }

    #[test]
    fn drop_beyond_tolerance_blocks_with_values() {
        let v = compare_snapshots(
            &accuracy_policy(0.05),
            MetricsSnapshot::baseline("prod").with_metric("accuracy", 0.80),
            MetricsSnapshot::candidate("cand").with_metric("accuracy", 0.70),
        );
        assert!(!v.passed());
        assert_eq!(v.reasons.len(), 1);
        let msg = &v.reasons[0].message;
        assert!(msg.contains("accuracy"), "{msg}");
        assert!(msg.contains("0.8 -> candidate 0.7"), "{msg}");
        assert!(msg.contains("-0.1250"), "{msg}");
    }

    #[test]
    fn lower_is_better_regresses_upwards() {
        let policy =
            GatePolicy::default().with_metric("rmse", MetricTolerance::lower_is_better(0.1));
        let ok = compare_snapshots(
            &policy,
            MetricsSnapshot::baseline("b").with_metric("rmse", 10.0),
            MetricsSnapshot::candidate("c").with_metric("rmse", 10.5),
        );
        assert!(ok.passed());
        let bad = compare_snapshots(
            &policy,
            MetricsSnapshot::baseline("b").with_metric("rmse", 10.0),
            MetricsSnapshot::candidate("c").with_metric("rmse", 12.0),
        );
        assert!(!bad.passed());
    }

    #[test]
    fn zero_baseline_degrading_candidate_blocks_unbounded() {
        let policy =
            GatePolicy::default().with_metric("error_rate", MetricTolerance::lower_is_better(0.5));
        let v = compare_snapshots(
            &policy,
            MetricsSnapshot::baseline("b").with_metric("error_rate", 0.0),
            MetricsSnapshot::candidate("c").with_metric("error_rate", 0.01),
        );
        assert!(!v.passed());
        assert_eq!(v.comparisons[0].delta, None);
        assert!(v.reasons[0].message.contains("+inf"));
    }

    #[test]
    fn zero_baseline_improving_candidate_allows() {
        let v = compare_snapshots(
            &accuracy_policy(0.0),
            MetricsSnapshot::baseline("b").with_metric("accuracy", 0.0),
            MetricsSnapshot::candidate("c").with_metric("accuracy", 0.3),
        );
        assert!(v.passed());
        assert!(!v.comparisons[0].regressed);
    }

    #[test]
    fn missing_metric_blocks_without_comparing() {
        let v = compare_snapshots(
            &accuracy_policy(0.05),
            MetricsSnapshot::baseline("b").with_metric("accuracy", 0.8),
            MetricsSnapshot::candidate("c").with_metric("f1", 0.9),
        );
        assert!(v.comparisons.is_empty());
        assert_eq!(v.reasons[0].code, ReasonCode::MissingMetric);
        assert_eq!(v.reasons[0].message, "metric accuracy missing from candidate");
    }

    #[test]
    fn non_finite_metric_counts_as_missing() {
        let v = compare_snapshots(
            &accuracy_policy(0.05),
            MetricsSnapshot::baseline("b").with_metric("accuracy", f64::NAN),
            MetricsSnapshot::candidate("c").with_metric("accuracy", 0.9),
        );
        assert_eq!(v.reasons[0].code, ReasonCode::MissingMetric);
        assert!(v.reasons[0].message.contains("baseline"));
    }

    #[test]
    fn empty_tolerance_table_allows() {
        let v = compare_snapshots(
            &GatePolicy::default(),
            MetricsSnapshot::baseline("b"),
            MetricsSnapshot::candidate("c"),
        );
        assert!(v.passed());
    }
}
