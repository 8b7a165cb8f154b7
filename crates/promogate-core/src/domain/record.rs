//! Append-only audit entries.
//!
//! A `PromotionRecord` is assembled in memory by the evaluation that owns it
//! and reaches the log exactly once, as a single entry. Its digest is taken
//! over the canonical JSON form (see [`canonical_json`]): keys sorted, `null`
//! members dropped. A record read back from any backend is canonicalized
//! again before its digest is checked, so storage that reorders keys or omits
//! absent fields still verifies.

use serde::{Deserialize, Serialize};

use promogate_state::{canonical_json, ContentDigest, RecordEntry, StoredRecord};

use super::check::CheckResult;
use super::decision::{Decision, Outcome};
use super::error::{PromotionError, Result};
use super::metrics::MetricsSnapshot;
use super::request::PromotionRequest;
use super::stage::Transition;
use crate::deploy::DeploymentReport;
use crate::model_gate::MetricComparison;

/// Evidence a gate collected while deciding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateEvidence {
    Quality {
        checks: Vec<CheckResult>,
    },
    Model {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        baseline: Option<MetricsSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<MetricsSnapshot>,
        comparisons: Vec<MetricComparison>,
    },
    Deployment(DeploymentReport),
}

/// Result of one gate for one stage traversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub transition: Transition,
    pub outcome: Outcome,
    pub evidence: GateEvidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub request: PromotionRequest,
    pub gates: Vec<GateReport>,
    pub decision: Decision,
}

impl PromotionRecord {
    /// Canonical JSON value of this record.
    pub fn canonical(&self) -> Result<serde_json::Value> {
        Ok(canonical_json(&serde_json::to_value(self)?))
    }

    pub fn digest(&self) -> Result<ContentDigest> {
        digest_of(&self.canonical()?)
    }

    /// Log entry for this record.
    pub fn to_entry(&self) -> Result<RecordEntry> {
        let payload = self.canonical()?;
        let digest = digest_of(&payload)?;
        Ok(RecordEntry {
            request_id: self.request.id.clone(),
            transition: self
                .request
                .transition()
                .map(|t| t.name().to_string())
                .unwrap_or_else(|| {
                    format!("{}_to_{}", self.request.source, self.request.target)
                }),
            outcome: self.decision.outcome.as_str().to_string(),
            digest,
            payload,
        })
    }

    /// Decode a stored entry, failing if its payload no longer matches the
    /// digest it was written with.
    pub fn from_stored(stored: &StoredRecord) -> Result<Self> {
        let actual = digest_of(&stored.payload)?;
        if actual != stored.digest {
            return Err(PromotionError::DigestMismatch {
                expected: stored.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(serde_json::from_value(stored.payload.clone())?)
    }
}

fn digest_of(payload: &serde_json::Value) -> Result<ContentDigest> {
    Ok(ContentDigest::from_bytes(&serde_json::to_vec(&canonical_json(payload))?))
}

/// Accumulates gate reports for one evaluation.
#[derive(Debug)]
pub struct RecordBuilder {
    request: PromotionRequest,
    gates: Vec<GateReport>,
}

impl RecordBuilder {
    pub fn new(request: PromotionRequest) -> Self {
        Self {
            request,
            gates: Vec::new(),
        }
    }

    pub fn push_gate(&mut self, report: GateReport) {
        self.gates.push(report);
    }

    pub fn finish(self, decision: Decision) -> PromotionRecord {
        PromotionRecord {
            request: self.request,
            gates: self.gates,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{Reason, ReasonCode};
    use crate::domain::request::CandidateRef;
    use crate::domain::stage::Stage;
    use chrono::{TimeZone, Utc};

    fn sample() -> PromotionRecord {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let request = PromotionRequest::at("req-1", Stage::Feature, Stage::Dev, CandidateRef::new("abc"), at);
        let mut builder = RecordBuilder::new(request);
        builder.push_gate(GateReport {
            transition: Transition::FeatureToDev,
            outcome: Outcome::Block,
            evidence: GateEvidence::Quality {
                checks: vec![
                    CheckResult::pass("lint", "", 3),
                    CheckResult::fail("unittests", "2 failed", 40),
                ],
            },
        });
        builder.finish(Decision::block(
            Reason::new(ReasonCode::CheckFailed, "check unittests failed: 2 failed"),
            at,
        ))
    }

    #[test]
    fn entry_carries_summary_fields() {
        let entry = sample().to_entry().unwrap();
        assert_eq!(entry.request_id, "req-1");
        assert_eq!(entry.transition, "feature_to_dev");
        assert_eq!(entry.outcome, "block");
        assert_eq!(entry.digest, sample().digest().unwrap());
    }

    #[test]
    fn digest_is_stable_across_calls() {
        assert_eq!(sample().digest().unwrap(), sample().digest().unwrap());
    }

    #[test]
    fn invalid_transition_entry_names_both_stages() {
        let mut record = sample();
        record.request.target = Stage::Master;
        let entry = record.to_entry().unwrap();
        assert_eq!(entry.transition, "feature_to_master");
    }

    #[test]
    fn evidence_is_tagged_by_gate() {
        let json = sample().canonical().unwrap();
        assert_eq!(json["gates"][0]["evidence"]["gate"], "quality");
        assert_eq!(json["gates"][0]["evidence"]["checks"][1]["outcome"], "fail");
    }

    #[test]
    fn stored_payload_verifies_after_key_reorder_and_null_drop() {
        let record = sample();
        let entry = record.to_entry().unwrap();

        // Rebuild the payload with reversed key order at every level, the
        // way a document store may hand it back.
        fn reshuffle(value: &serde_json::Value) -> serde_json::Value {
            match value {
                serde_json::Value::Object(map) => {
                    let mut out = serde_json::Map::new();
                    for (k, v) in map.iter().rev() {
                        out.insert(k.clone(), reshuffle(v));
                    }
                    serde_json::Value::Object(out)
                }
                serde_json::Value::Array(items) => {
                    serde_json::Value::Array(items.iter().map(reshuffle).collect())
                }
                other => other.clone(),
            }
        }

        let stored = StoredRecord {
            seq: 1,
            request_id: entry.request_id.clone(),
            transition: entry.transition.clone(),
            outcome: entry.outcome.clone(),
            digest: entry.digest.clone(),
            payload: {
                let mut payload = reshuffle(&entry.payload);
                payload["annotations"] = serde_json::Value::Null;
                payload
            },
            recorded_at: Utc::now(),
        };
        let back = PromotionRecord::from_stored(&stored).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let entry = sample().to_entry().unwrap();
        let mut payload = entry.payload.clone();
        payload["decision"]["outcome"] = serde_json::json!("allow");
        let stored = StoredRecord {
            seq: 1,
            request_id: entry.request_id,
            transition: entry.transition,
            outcome: entry.outcome,
            digest: entry.digest,
            payload,
            recorded_at: Utc::now(),
        };
        let err = PromotionRecord::from_stored(&stored).unwrap_err();
        assert!(matches!(err, PromotionError::DigestMismatch { .. }));
    }
}
