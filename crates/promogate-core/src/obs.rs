//! Structured observability hooks for promotion lifecycle events.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Evaluations run inside [`request_span`]; attach it with
//! `tracing::Instrument` so the span survives across await points.

use tracing::{info, warn, Span};

use crate::domain::{Decision, Outcome, ReasonCode};

/// Span tagging all events of one evaluation with its request id.
pub fn request_span(request_id: &str, transition: &str) -> Span {
    tracing::info_span!("promogate.evaluate", request_id = %request_id, transition = %transition)
}

fn codes(codes: &[ReasonCode]) -> String {
    codes
        .iter()
        .map(ReasonCode::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Emit event: a request entered evaluation.
///
/// # Example
///
/// ```ignore
/// emit_promotion_started("req-7", "dev", "test", "run-42");
/// // logs: event=promotion.started request_id=req-7 source=dev target=test candidate=run-42
/// ```
pub fn emit_promotion_started(request_id: &str, source: &str, target: &str, candidate: &str) {
    info!(
        event = "promotion.started",
        request_id = %request_id,
        source = %source,
        target = %target,
        candidate = %candidate,
    );
}

/// Emit event: one gate reached its outcome, with its reason codes in order.
pub fn emit_gate_evaluated(request_id: &str, transition: &str, outcome: Outcome, reasons: &[ReasonCode]) {
    info!(
        event = "gate.evaluated",
        request_id = %request_id,
        transition = %transition,
        outcome = %outcome,
        reason_codes = %codes(reasons),
    );
}

/// Emit event: deployment state machine moved from `from` to `to`.
pub fn emit_deploy_transition(stage: &str, from: &str, to: &str) {
    info!(event = "deploy.transition", stage = %stage, from = %from, to = %to);
}

/// Emit event: a transient publish failure will be retried after `delay_ms`
/// (warning level).
///
/// # Example
///
/// ```ignore
/// emit_publish_retry("artifact-v2", 2, 1000, &err);
/// // logs: event=publish.retry artifact=artifact-v2 attempt=2 delay_ms=1000 error="transient: 503"
/// ```
pub fn emit_publish_retry(artifact: &str, attempt: u32, delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "publish.retry",
        artifact = %artifact,
        attempt = attempt,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: the compensating re-publish finished. Failures log at warning
/// level.
pub fn emit_rollback_finished(stage: &str, artifact: &str, success: bool) {
    if success {
        info!(event = "rollback.finished", stage = %stage, artifact = %artifact, success = true);
    } else {
        warn!(event = "rollback.finished", stage = %stage, artifact = %artifact, success = false);
    }
}

/// Emit event: the final decision was appended to the log at `seq`.
pub fn emit_promotion_decided(request_id: &str, decision: &Decision, seq: u64) {
    info!(
        event = "promotion.decided",
        request_id = %request_id,
        outcome = %decision.outcome,
        reason_codes = %codes(&decision.reason_codes()),
        seq = seq,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_join_in_order() {
        assert_eq!(
            codes(&[ReasonCode::CheckFailed, ReasonCode::CheckErrored]),
            "check_failed,check_errored"
        );
        assert_eq!(codes(&[]), "");
    }

    #[test]
    fn span_creation_does_not_panic() {
        let _span = request_span("req-1", "dev_to_test");
    }
}
