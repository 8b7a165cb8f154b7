//! Interfaces to the systems the gates delegate to.
//!
//! The engine never builds, trains, or deploys anything itself; it calls
//! these traits and decides on what they report. Process-backed
//! implementations live in `promogate-ci`, HTTP-backed ones in [`crate::http`],
//! and scripted ones in [`crate::fakes`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{CandidateRef, CheckResult, MetricsSnapshot};

// ---------------------------------------------------------------------------
// Quality checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CheckError(pub String);

#[async_trait]
pub trait CheckExecutor: Send + Sync {
    /// Run the check called `name` against `candidate`.
    ///
    /// `Err` means the check could not run at all; a check that ran and
    /// found problems returns `Ok` with a `fail` outcome.
    async fn run(&self, name: &str, candidate: &CandidateRef) -> Result<CheckResult, CheckError>;
}

// ---------------------------------------------------------------------------
// Metrics registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MetricsRegistry: Send + Sync {
    /// Metrics of the model currently serving production.
    async fn fetch_baseline(&self, model_name: &str) -> Result<MetricsSnapshot, MetricsError>;

    /// Metrics recorded for `candidate` at training time.
    async fn fetch_candidate(
        &self,
        model_name: &str,
        candidate: &CandidateRef,
    ) -> Result<MetricsSnapshot, MetricsError>;
}

// ---------------------------------------------------------------------------
// Build / publish
// ---------------------------------------------------------------------------

/// Opaque handle to a built artifact (image id, tarball path...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(pub String);

impl ArtifactHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry reference returned by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedRef(pub String);

impl PublishedRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublishedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry login. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BuildError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Worth retrying (registry hiccup, rate limit, network).
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, candidate: &CandidateRef) -> Result<ArtifactHandle, BuildError>;
}

#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        credentials: &RegistryCredentials,
    ) -> Result<PublishedRef, PublishError>;
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy(String),
    Unreachable(String),
}

impl ProbeStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeStatus::Healthy)
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &str) -> ProbeStatus;
}
