//! Promotion requests and the opaque references they carry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{Stage, Transition};

/// Opaque identifier of the candidate being promoted (commit, model version,
/// image tag...). The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateRef(pub String);

impl CandidateRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to move a candidate from `source` to `target`.
///
/// Requests are values: the controller only ever reads them, and the copy
/// embedded in a `PromotionRecord` is the one that was evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub id: String,
    pub source: Stage,
    pub target: Stage,
    pub candidate: CandidateRef,
    pub requested_at: DateTime<Utc>,
}

impl PromotionRequest {
    /// Create a request stamped with the current UTC time.
    pub fn new(
        id: impl Into<String>,
        source: Stage,
        target: Stage,
        candidate: CandidateRef,
    ) -> Self {
        Self::at(id, source, target, candidate, Utc::now())
    }

    /// Create a request with a fixed timestamp (used for deterministic tests).
    pub fn at(
        id: impl Into<String>,
        source: Stage,
        target: Stage,
        candidate: CandidateRef,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            target,
            candidate,
            requested_at,
        }
    }

    /// Create a request with a random id.
    pub fn generated(source: Stage, target: Stage, candidate: CandidateRef) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), source, target, candidate)
    }

    /// The edge this request asks to cross; `None` for out-of-order or
    /// skip-stage requests.
    pub fn transition(&self) -> Option<Transition> {
        Transition::between(self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_request_has_transition() {
        let req = PromotionRequest::new("r1", Stage::Dev, Stage::Test, CandidateRef::new("m-7"));
        assert_eq!(req.transition(), Some(Transition::DevToTest));
    }

    #[test]
    fn skip_stage_request_has_no_transition() {
        let req = PromotionRequest::new("r1", Stage::Feature, Stage::Test, CandidateRef::new("c"));
        assert_eq!(req.transition(), None);

        let backwards = PromotionRequest::new("r2", Stage::Master, Stage::Test, CandidateRef::new("c"));
        assert_eq!(backwards.transition(), None);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = PromotionRequest::generated(Stage::Feature, Stage::Dev, CandidateRef::new("c"));
        let b = PromotionRequest::generated(Stage::Feature, Stage::Dev, CandidateRef::new("c"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn candidate_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&CandidateRef::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
    }
}
