//! Domain models for promogate.
//!
//! - `Stage` / `Transition`: the linear feature → dev → test → master topology
//! - `PromotionRequest`: what the CI platform asks to promote
//! - `CheckResult`, `MetricsSnapshot`: gate inputs
//! - `PolicySet`: per-edge gate configuration
//! - `Decision`, `PromotionRecord`: gate outputs

pub mod check;
pub mod decision;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod record;
pub mod request;
pub mod stage;

pub use check::{CheckOutcome, CheckResult};
pub use decision::{Decision, Outcome, Reason, ReasonCode, RollbackStatus};
pub use error::{PromotionError, Result};
pub use metrics::{MetricsSnapshot, SnapshotRole};
pub use policy::{GatePolicy, MetricDirection, MetricTolerance, PolicySet};
pub use record::{GateEvidence, GateReport, PromotionRecord, RecordBuilder};
pub use request::{CandidateRef, PromotionRequest};
pub use stage::{Stage, Transition};
