//! promogate core library
//!
//! A promotion gate engine for the linear feature → dev → test → master
//! topology. Each edge is owned by one gate:
//!
//! - feature → dev: [`quality_gate`], required code-quality checks
//! - dev → test: [`model_gate`], candidate metrics against the production baseline
//! - test → master: [`deploy`], build, publish, health verification and rollback
//!
//! The [`PromotionController`] validates requests, dispatches to the gate,
//! and appends an auditable [`PromotionRecord`] for every evaluation.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod deploy;
pub mod domain;
pub mod fakes;
pub mod http;
pub mod metrics;
pub mod model_gate;
pub mod obs;
pub mod quality_gate;
pub mod reporting;
pub mod telemetry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, BuildError, CheckError, CheckExecutor,
    HealthProbe, MetricsError, MetricsRegistry, ProbeStatus, PublishError, PublishedRef,
    RegistryCredentials,
};
pub use config::{DeployConfig, PromotionConfig};
pub use controller::{Collaborators, PromotionController};
pub use deploy::{
    DeployState, DeploymentOutcome, DeploymentReport, DeploymentVerifier, RetryPolicy, StageLocks,
};
pub use domain::{
    CandidateRef, CheckOutcome, CheckResult, Decision, GateEvidence, GatePolicy, GateReport,
    MetricDirection, MetricTolerance, MetricsSnapshot, Outcome, PolicySet, PromotionError,
    PromotionRecord, PromotionRequest, Reason, ReasonCode, RecordBuilder, Result, RollbackStatus,
    SnapshotRole, Stage, Transition,
};
pub use http::{HttpHealthProbe, HttpMetricsRegistry};
pub use model_gate::{compare_snapshots, run_model_gate, MetricComparison, ModelVerdict};
pub use quality_gate::{run_quality_gate, QualityVerdict};
pub use reporting::{read_decision_artifact, write_decision_artifact};
pub use telemetry::init_tracing;
