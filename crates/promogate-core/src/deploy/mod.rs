//! Deployment gate: stage locks, publish retries and the verifier state machine.

pub mod lock;
pub mod retry;
pub mod state;
pub mod verifier;

pub use lock::{StageGuard, StageLocks};
pub use retry::{publish_with_retry, PublishAttempts, RetryPolicy};
pub use state::DeployState;
pub use verifier::{DeploymentOutcome, DeploymentReport, DeploymentVerifier};
