//! feature → dev gate: required code-quality checks.
//!
//! Checks run concurrently, one task each, but results and reasons are
//! always reported in the policy's declared order.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::collaborators::CheckExecutor;
use crate::domain::{
    CandidateRef, CheckOutcome, CheckResult, GateEvidence, GatePolicy, Reason, ReasonCode,
};

#[derive(Debug, Clone, PartialEq)]
pub struct QualityVerdict {
    pub checks: Vec<CheckResult>,
    pub reasons: Vec<Reason>,
}

impl QualityVerdict {
    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn into_evidence(self) -> (GateEvidence, Vec<Reason>) {
        (GateEvidence::Quality { checks: self.checks }, self.reasons)
    }
}

/// Trimmed check names, first occurrence wins.
fn declared_checks(policy: &GatePolicy) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(policy.required_checks.len());
    for raw in &policy.required_checks {
        let name = raw.trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn reason_for(check: &CheckResult) -> Option<Reason> {
    let suffix = |verb: &str| {
        if check.detail.is_empty() {
            format!("check {} {verb}", check.name)
        } else {
            format!("check {} {verb}: {}", check.name, check.detail)
        }
    };
    match check.outcome {
        CheckOutcome::Pass => None,
        CheckOutcome::Fail => Some(Reason::new(ReasonCode::CheckFailed, suffix("failed"))),
        CheckOutcome::Error => Some(Reason::new(ReasonCode::CheckErrored, suffix("errored"))),
    }
}

/// Run every required check and decide.
///
/// A collaborator error or a panicking check task is recorded as an
/// `error` result for that check; it never aborts the others.
pub async fn run_quality_gate(
    executor: Arc<dyn CheckExecutor>,
    policy: &GatePolicy,
    candidate: &CandidateRef,
) -> QualityVerdict {
    let names = declared_checks(policy);

    let handles: Vec<_> = names
        .iter()
        .map(|name| {
            let executor = Arc::clone(&executor);
            let name = name.clone();
            let candidate = candidate.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = executor.run(&name, &candidate).await;
                (result, started.elapsed().as_millis() as u64)
            })
        })
        .collect();

    let joined = futures::future::join_all(handles).await;

    let mut checks = Vec::with_capacity(names.len());
    for (name, joined) in names.into_iter().zip(joined) {
        let check = match joined {
            Ok((Ok(mut result), _)) => {
                result.name = name;
                result
            }
            Ok((Err(err), elapsed)) => CheckResult::error(name, err.to_string(), elapsed),
            Err(join_err) => CheckResult::error(name, format!("check task aborted: {join_err}"), 0),
        };
        debug!(check = %check.name, outcome = ?check.outcome, duration_ms = check.duration_ms, "check finished");
        checks.push(check);
    }

    let reasons = checks.iter().filter_map(reason_for).collect();
    QualityVerdict { checks, reasons }
}
