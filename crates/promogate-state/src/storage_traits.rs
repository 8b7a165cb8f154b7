//! Storage trait definitions for promogate
//!
//! These traits define the two durable stores the promotion engine needs:
//! - `PromotionLog`: append-only audit trail of promotion records
//! - `DeploymentRegistry`: per-stage pointer to the last deployed artifact
//!
//! Both traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest of a JSON value's canonical bytes (see [`canonical_json`]).
    pub fn of_json(value: &serde_json::Value) -> StorageResult<Self> {
        let bytes = serde_json::to_vec(&canonical_json(value))
            .map_err(|e| StorageError::Corrupt(format!("payload not serializable: {e}")))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

/// Canonical form of a JSON value used for digests.
///
/// - object keys sorted by UTF-16 code units
/// - `null` object members dropped (arrays keep their `null` elements)
/// - integer-valued floats written as integers
///
/// A payload read back from a backend that reorders keys or omits absent
/// fields canonicalizes to the same bytes as the one that was written.
pub fn canonical_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            let mut sorted = serde_json::Map::new();
            for key in keys {
                match map.get(key) {
                    Some(Value::Null) | None => {}
                    Some(v) => {
                        sorted.insert(key.clone(), canonical_json(v));
                    }
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_json).collect()),
        Value::Number(n) => match n.as_f64() {
            Some(f)
                if !(n.is_i64() || n.is_u64())
                    && f.fract() == 0.0
                    && f >= i64::MIN as f64
                    && f <= i64::MAX as f64 =>
            {
                Value::Number(serde_json::Number::from(f as i64))
            }
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PromotionLog: append-only audit trail
// ---------------------------------------------------------------------------

/// A finished promotion record handed to the log for appending.
///
/// `payload` is the serialized record; `digest` is
/// [`ContentDigest::of_json`] of it, computed by the producer. Backends may
/// return the payload with reordered keys or without `null` members; the
/// digest still matches because it is taken over the canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEntry {
    pub request_id: String,
    pub transition: String,
    pub outcome: String,
    pub digest: ContentDigest,
    pub payload: serde_json::Value,
}

/// A record as stored by the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Position in the log (1-based, strictly increasing).
    pub seq: u64,
    pub request_id: String,
    pub transition: String,
    pub outcome: String,
    pub digest: ContentDigest,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only promotion record log.
///
/// Guarantees:
/// - `append` stores the whole entry or nothing; entries are never updated
///   or deleted.
/// - Concurrent appends are serialized; each receives a distinct `seq`.
/// - Reads return entries in `seq` order.
#[async_trait]
pub trait PromotionLog: Send + Sync {
    /// Append a finished record, returning it with its assigned position.
    async fn append(&self, entry: RecordEntry) -> StorageResult<StoredRecord>;

    /// All records for a request id, oldest first.
    async fn records_for(&self, request_id: &str) -> StorageResult<Vec<StoredRecord>>;

    /// Every record in the log, oldest first.
    async fn list(&self) -> StorageResult<Vec<StoredRecord>>;
}

// ---------------------------------------------------------------------------
// DeploymentRegistry: previously-deployed pointer per stage
// ---------------------------------------------------------------------------

/// A successful deployment to be recorded as the stage's current artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentEntry {
    pub stage: String,
    pub artifact: String,
    pub published_ref: String,
    pub request_id: String,
}

/// A recorded deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub seq: u64,
    pub stage: String,
    pub artifact: String,
    pub published_ref: String,
    pub request_id: String,
    pub deployed_at: DateTime<Utc>,
}

/// Per-stage deployment pointer.
///
/// Semantics:
/// - `record` appends a new deployment which becomes the stage's current one.
/// - `current` returns the most recent deployment for a stage, if any.
/// - `history` returns the full chain for a stage, newest first.
#[async_trait]
pub trait DeploymentRegistry: Send + Sync {
    async fn record(&self, entry: DeploymentEntry) -> StorageResult<DeploymentRecord>;

    async fn current(&self, stage: &str) -> StorageResult<Option<DeploymentRecord>>;

    async fn history(&self, stage: &str) -> StorageResult<Vec<DeploymentRecord>>;
}
