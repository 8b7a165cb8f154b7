//! Decision artifacts for the CI platform.
//!
//! `write_decision_artifact` lays out one directory per request:
//!
//! ```text
//! <dir>/<request_id>/decision.json   the Decision, rendered verbatim by CI
//! <dir>/<request_id>/record.json     the full PromotionRecord
//! <dir>/<request_id>/record.digest   sha-256 of record.json's canonical form
//! <dir>/<request_id>/summary.md      human summary for PR comments
//! ```

use std::path::{Path, PathBuf};

use promogate_state::ContentDigest;

use crate::domain::{GateEvidence, PromotionError, PromotionRecord, Result};

pub const DECISION_FILE: &str = "decision.json";
pub const RECORD_FILE: &str = "record.json";
pub const DIGEST_FILE: &str = "record.digest";
pub const SUMMARY_FILE: &str = "summary.md";

fn artifact_dir(dir: &Path, request_id: &str) -> Result<PathBuf> {
    let usable = !request_id.is_empty()
        && request_id != "."
        && request_id != ".."
        && !request_id.contains(['/', '\\']);
    if !usable {
        return Err(PromotionError::Config(format!(
            "request id {request_id:?} cannot be used as a directory name"
        )));
    }
    Ok(dir.join(request_id))
}

/// Write the artifact set for `record`; returns the directory written.
pub fn write_decision_artifact(record: &PromotionRecord, dir: &Path) -> Result<PathBuf> {
    let out = artifact_dir(dir, &record.request.id)?;
    std::fs::create_dir_all(&out)?;

    let digest = record.digest()?;
    std::fs::write(
        out.join(DECISION_FILE),
        serde_json::to_string_pretty(&record.decision)?,
    )?;
    std::fs::write(out.join(RECORD_FILE), serde_json::to_string_pretty(record)?)?;
    std::fs::write(out.join(DIGEST_FILE), digest.as_str())?;
    std::fs::write(out.join(SUMMARY_FILE), render_summary_md(record))?;
    Ok(out)
}

/// Read a record back and verify it against the stored digest.
pub fn read_decision_artifact(dir: &Path, request_id: &str) -> Result<PromotionRecord> {
    let out = artifact_dir(dir, request_id)?;
    let raw = std::fs::read_to_string(out.join(RECORD_FILE))?;
    let expected = std::fs::read_to_string(out.join(DIGEST_FILE))?;
    let expected = expected.trim();

    let record: PromotionRecord = serde_json::from_str(&raw)?;
    let actual: ContentDigest = record.digest()?;
    if actual.as_str() != expected {
        return Err(PromotionError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(record)
}

pub fn render_summary_md(record: &PromotionRecord) -> String {
    let request = &record.request;
    let decision = &record.decision;
    let mut out = String::new();
    out.push_str(&format!(
        "# Promotion {}: {}\n\n",
        request.id,
        decision.outcome.as_str().to_uppercase()
    ));
    out.push_str(&format!(
        "- transition: {} -> {}\n- candidate: `{}`\n- evaluated at: {}\n",
        request.source,
        request.target,
        request.candidate,
        decision.evaluated_at.to_rfc3339()
    ));

    if !decision.reasons.is_empty() {
        out.push_str("\n## Reasons\n");
        for reason in &decision.reasons {
            out.push_str(&format!("- `{}` {}\n", reason.code, reason.message));
        }
    }

    for gate in &record.gates {
        out.push_str(&format!("\n## Gate {} ({})\n", gate.transition, gate.outcome));
        match &gate.evidence {
            GateEvidence::Quality { checks } => {
                for check in checks {
                    out.push_str(&format!(
                        "- {}: {:?} ({} ms)\n",
                        check.name, check.outcome, check.duration_ms
                    ));
                }
            }
            GateEvidence::Model { comparisons, .. } => {
                for cmp in comparisons {
                    let delta = cmp
                        .delta
                        .map(|d| format!("{d:+.4}"))
                        .unwrap_or_else(|| "unbounded".to_string());
                    out.push_str(&format!(
                        "- {}: {} -> {} (delta {delta}, tolerance {})\n",
                        cmp.metric, cmp.baseline, cmp.candidate, cmp.tolerance
                    ));
                }
            }
            GateEvidence::Deployment(report) => {
                let trail: Vec<&str> = report.states.iter().map(|s| s.name()).collect();
                out.push_str(&format!("- states: {}\n", trail.join(" -> ")));
                out.push_str(&format!(
                    "- publish attempts: {}, health probes: {}\n",
                    report.publish_attempts, report.health_probes
                ));
            }
        }
    }
    out
}
