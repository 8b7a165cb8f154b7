use promogate_core::fakes::StaticMetricsRegistry;
use promogate_core::{
    run_model_gate, CandidateRef, GatePolicy, MetricTolerance, MetricsError, MetricsSnapshot,
    ReasonCode,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const MODEL: &str = "temperature_predictor";

fn accuracy_policy() -> GatePolicy {
    GatePolicy::default().with_metric("accuracy", MetricTolerance::higher_is_better(0.05))
}

fn registry(baseline: f64, candidate: f64) -> StaticMetricsRegistry {
    StaticMetricsRegistry::new(
        Ok(MetricsSnapshot::baseline("prod-v3").with_metric("accuracy", baseline)),
        Ok(MetricsSnapshot::candidate("run-42").with_metric("accuracy", candidate)),
    )
}

fn candidate() -> CandidateRef {
    CandidateRef::new("run-42")
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn candidate_within_tolerance_allows() {
    let reg = registry(0.80, 0.78);
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert!(verdict.passed());
    let delta = verdict.comparisons[0].delta.expect("finite delta");
    assert!((delta + 0.025).abs() < 1e-9, "delta was {delta}");
}

#[tokio::test]
async fn candidate_beyond_tolerance_blocks_citing_values() {
    let reg = registry(0.80, 0.70);
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert!(!verdict.passed());
    assert_eq!(verdict.reasons.len(), 1);
    let reason = &verdict.reasons[0];
    assert_eq!(reason.code, ReasonCode::MetricRegressed);
    assert!(reason.message.contains("baseline 0.8 -> candidate 0.7"), "{}", reason.message);
    assert!(reason.message.contains("delta -0.1250"), "{}", reason.message);
    let delta = verdict.comparisons[0].delta.expect("finite delta");
    assert!((delta + 0.125).abs() < 1e-9);
}

#[tokio::test]
async fn only_regressing_metrics_are_reported() {
    let reg = StaticMetricsRegistry::new(
        Ok(MetricsSnapshot::baseline("b")
            .with_metric("accuracy", 0.9)
            .with_metric("rmse", 2.0)),
        Ok(MetricsSnapshot::candidate("c")
            .with_metric("accuracy", 0.91)
            .with_metric("rmse", 2.5)),
    );
    let policy = accuracy_policy().with_metric("rmse", MetricTolerance::lower_is_better(0.1));
    let verdict = run_model_gate(&reg, MODEL, &policy, &candidate()).await;
    assert_eq!(verdict.comparisons.len(), 2);
    assert_eq!(verdict.reasons.len(), 1);
    assert!(verdict.reasons[0].message.starts_with("metric rmse regressed"));
}

// ---------------------------------------------------------------------------
// Zero baseline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_baseline_with_degrading_candidate_blocks() {
    let reg = registry(0.0, -0.01);
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert!(!verdict.passed());
    assert_eq!(verdict.comparisons[0].delta, None);
    assert!(verdict.reasons[0].message.contains("delta -inf"));
}

#[tokio::test]
async fn zero_baseline_with_non_regressing_candidate_allows() {
    for candidate_value in [0.0, 0.2] {
        let reg = registry(0.0, candidate_value);
        let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
        assert!(verdict.passed(), "candidate {candidate_value}");
    }
}

// ---------------------------------------------------------------------------
// Fail closed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn baseline_unavailable_blocks_without_fetching_candidate() {
    let reg = StaticMetricsRegistry::new(
        Err(MetricsError::Unavailable("connection refused".into())),
        Ok(MetricsSnapshot::candidate("c").with_metric("accuracy", 0.99)),
    );
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert!(!verdict.passed());
    assert_eq!(verdict.reasons[0].code, ReasonCode::BaselineUnavailable);
    assert!(verdict.reasons[0].message.starts_with("baseline unavailable"));
    assert_eq!(reg.candidate_calls(), 0);
}

#[tokio::test]
async fn baseline_not_found_also_fails_closed() {
    let reg = StaticMetricsRegistry::new(
        Err(MetricsError::NotFound(MODEL.into())),
        Ok(MetricsSnapshot::candidate("c").with_metric("accuracy", 0.99)),
    );
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert_eq!(verdict.reasons[0].code, ReasonCode::BaselineUnavailable);
}

#[tokio::test]
async fn missing_candidate_snapshot_blocks() {
    let reg = StaticMetricsRegistry::new(
        Ok(MetricsSnapshot::baseline("b").with_metric("accuracy", 0.8)),
        Err(MetricsError::NotFound("run-42".into())),
    );
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert_eq!(verdict.reasons[0].code, ReasonCode::CandidateMetricsUnavailable);
    assert!(verdict.baseline.is_some());
}

#[tokio::test]
async fn metric_missing_from_baseline_blocks() {
    let reg = StaticMetricsRegistry::new(
        Ok(MetricsSnapshot::baseline("b").with_metric("f1", 0.8)),
        Ok(MetricsSnapshot::candidate("c").with_metric("accuracy", 0.9)),
    );
    let verdict = run_model_gate(&reg, MODEL, &accuracy_policy(), &candidate()).await;
    assert_eq!(verdict.reasons.len(), 1);
    assert_eq!(verdict.reasons[0].code, ReasonCode::MissingMetric);
    assert_eq!(verdict.reasons[0].message, "metric accuracy missing from baseline");
}
