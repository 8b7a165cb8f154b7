//! Scripted in-memory collaborators (testing only).
//!
//! Every fake counts its calls so tests can assert that a short-circuited
//! gate never reached it. A shared [`Journal`] records ordered events across
//! fakes for interleaving assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, BuildError, CheckError, CheckExecutor,
    HealthProbe, MetricsError, MetricsRegistry, ProbeStatus, PublishError, PublishedRef,
    RegistryCredentials,
};
use crate::domain::{CandidateRef, CheckResult, MetricsSnapshot};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered, shared event log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ScriptedCheck {
    Pass,
    Fail(String),
    /// Collaborator error (check could not run).
    Error(String),
    /// The check task panics.
    Panic,
}

#[derive(Debug, Default)]
pub struct ScriptedChecks {
    scripts: HashMap<String, (ScriptedCheck, Duration)>,
    calls: AtomicUsize,
}

impl ScriptedChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: &str, script: ScriptedCheck) -> Self {
        self.with_delay(name, script, Duration::ZERO)
    }

    /// Script `name` to finish after `delay`.
    pub fn with_delay(mut self, name: &str, script: ScriptedCheck, delay: Duration) -> Self {
        self.scripts.insert(name.to_string(), (script, delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckExecutor for ScriptedChecks {
    async fn run(&self, name: &str, _candidate: &CandidateRef) -> Result<CheckResult, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some((script, delay)) = self.scripts.get(name).cloned() else {
            return Err(CheckError(format!("unknown check {name}")));
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let ms = delay.as_millis() as u64;
        match script {
            ScriptedCheck::Pass => Ok(CheckResult::pass(name, "", ms)),
            ScriptedCheck::Fail(detail) => Ok(CheckResult::fail(name, detail, ms)),
            ScriptedCheck::Error(detail) => Err(CheckError(detail)),
            ScriptedCheck::Panic => panic!("scripted panic in check {name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StaticMetricsRegistry {
    baseline: Mutex<Result<MetricsSnapshot, MetricsError>>,
    candidate: Mutex<Result<MetricsSnapshot, MetricsError>>,
    baseline_calls: AtomicUsize,
    candidate_calls: AtomicUsize,
}

impl StaticMetricsRegistry {
    pub fn new(
        baseline: Result<MetricsSnapshot, MetricsError>,
        candidate: Result<MetricsSnapshot, MetricsError>,
    ) -> Self {
        Self {
            baseline: Mutex::new(baseline),
            candidate: Mutex::new(candidate),
            baseline_calls: AtomicUsize::new(0),
            candidate_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the baseline between evaluations.
    pub fn set_baseline(&self, baseline: Result<MetricsSnapshot, MetricsError>) {
        *lock(&self.baseline) = baseline;
    }

    pub fn baseline_calls(&self) -> usize {
        self.baseline_calls.load(Ordering::SeqCst)
    }

    pub fn candidate_calls(&self) -> usize {
        self.candidate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsRegistry for StaticMetricsRegistry {
    async fn fetch_baseline(&self, _model_name: &str) -> Result<MetricsSnapshot, MetricsError> {
        self.baseline_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.baseline).clone()
    }

    async fn fetch_candidate(
        &self,
        _model_name: &str,
        _candidate: &CandidateRef,
    ) -> Result<MetricsSnapshot, MetricsError> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.candidate).clone()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds `artifact-<candidate>`, or fails with the scripted error.
#[derive(Debug, Default)]
pub struct FakeBuilder {
    failure: Option<String>,
    delay: Duration,
    journal: Option<Journal>,
    calls: AtomicUsize,
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(detail: impl Into<String>) -> Self {
        Self {
            failure: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactBuilder for FakeBuilder {
    async fn build(&self, candidate: &CandidateRef) -> Result<ArtifactHandle, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.record(format!("build:start:{candidate}"));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(journal) = &self.journal {
            journal.record(format!("build:end:{candidate}"));
        }
        match &self.failure {
            Some(detail) => Err(BuildError(detail.clone())),
            None => Ok(ArtifactHandle::new(format!("artifact-{candidate}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Replays scripted responses in order, then succeeds with
/// `registry.local/<artifact>`.
#[derive(Debug, Default)]
pub struct ScriptedPublisher {
    responses: Mutex<VecDeque<Result<PublishedRef, PublishError>>>,
    published: Mutex<Vec<String>>,
    journal: Option<Journal>,
    calls: AtomicUsize,
}

impl ScriptedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(
        responses: impl IntoIterator<Item = Result<PublishedRef, PublishError>>,
    ) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Artifacts passed to `publish`, in call order.
    pub fn attempted(&self) -> Vec<String> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl ArtifactPublisher for ScriptedPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        _credentials: &RegistryCredentials,
    ) -> Result<PublishedRef, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.published).push(artifact.to_string());
        if let Some(journal) = &self.journal {
            journal.record(format!("publish:{artifact}"));
        }
        let scripted = lock(&self.responses).pop_front();
        scripted.unwrap_or_else(|| Ok(PublishedRef::new(format!("registry.local/{artifact}"))))
    }
}

// ---------------------------------------------------------------------------
// Health probe
// ---------------------------------------------------------------------------

/// Replays scripted statuses; the last one repeats forever. Empty means
/// always healthy.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    statuses: Mutex<VecDeque<ProbeStatus>>,
    journal: Option<Journal>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = ProbeStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::with_statuses([ProbeStatus::Unreachable("connection refused".to_string())])
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, endpoint: &str) -> ProbeStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = {
            let mut statuses = lock(&self.statuses);
            if statuses.len() > 1 {
                statuses.pop_front()
            } else {
                statuses.front().cloned()
            }
        }
        .unwrap_or(ProbeStatus::Healthy);
        if let Some(journal) = &self.journal {
            journal.record(format!("probe:{endpoint}"));
        }
        status
    }
}
