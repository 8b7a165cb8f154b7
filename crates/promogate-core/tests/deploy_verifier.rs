use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promogate_core::fakes::{FakeBuilder, ScriptedProbe, ScriptedPublisher};
use promogate_core::{
    ArtifactHandle, ArtifactPublisher, CandidateRef, DeployConfig, DeployState,
    DeploymentVerifier, ProbeStatus, PublishError, PublishedRef, ReasonCode, RegistryCredentials,
    RetryPolicy, RollbackStatus, Stage,
};
use promogate_state::fakes::MemoryDeploymentRegistry;
use promogate_state::{DeploymentEntry, DeploymentRegistry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> DeployConfig {
    DeployConfig {
        health_endpoint: "http://serving.local/health".to_string(),
        verification_timeout_ms: 1_000,
        probe_interval_ms: 100,
        publish: RetryPolicy {
            max_attempts: 3,
            backoff_base_ms: 200,
            backoff_cap_ms: 1_000,
        },
        credentials: Some(RegistryCredentials::new("ci-bot", "token")),
    }
}

struct Harness {
    builder: Arc<FakeBuilder>,
    publisher: Arc<ScriptedPublisher>,
    probe: Arc<ScriptedProbe>,
    registry: Arc<MemoryDeploymentRegistry>,
}

impl Harness {
    fn new(builder: FakeBuilder, publisher: ScriptedPublisher, probe: ScriptedProbe) -> Self {
        Self {
            builder: Arc::new(builder),
            publisher: Arc::new(publisher),
            probe: Arc::new(probe),
            registry: Arc::new(MemoryDeploymentRegistry::new()),
        }
    }

    fn verifier(&self, config: DeployConfig) -> DeploymentVerifier {
        DeploymentVerifier::new(
            self.builder.clone(),
            self.publisher.clone(),
            self.probe.clone(),
            self.registry.clone(),
            config,
        )
    }

    async fn with_prior_deployment(self, artifact: &str) -> Self {
        self.registry
            .record(DeploymentEntry {
                stage: "master".to_string(),
                artifact: artifact.to_string(),
                published_ref: format!("registry.local/{artifact}"),
                request_id: "earlier".to_string(),
            })
            .await
            .expect("seed deployment");
        self
    }
}

fn candidate() -> CandidateRef {
    CandidateRef::new("v2")
}

/// Answers the first `answered` publishes, then never returns.
struct StallingPublisher {
    answered: usize,
    calls: AtomicUsize,
}

impl StallingPublisher {
    fn after(answered: usize) -> Self {
        Self {
            answered,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArtifactPublisher for StallingPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        _credentials: &RegistryCredentials,
    ) -> Result<PublishedRef, PublishError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.answered {
            return Ok(PublishedRef::new(format!("registry.local/{artifact}")));
        }
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn healthy_deployment_succeeds() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::healthy());
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert!(outcome.succeeded());
    assert!(outcome.reasons.is_empty());
    assert_eq!(
        outcome.report.states,
        vec![
            DeployState::Pending,
            DeployState::Building,
            DeployState::Publishing,
            DeployState::Verifying,
            DeployState::Succeeded,
        ]
    );
    assert_eq!(
        outcome.report.published_ref,
        Some(PublishedRef::new("registry.local/artifact-v2"))
    );
    assert_eq!(outcome.report.publish_attempts, 1);
    assert_eq!(outcome.report.health_probes, 1);
    assert!(outcome.report.rollback.is_none());
}

#[tokio::test(start_paused = true)]
async fn becomes_healthy_after_a_few_probes() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::new(),
        ScriptedProbe::with_statuses([
            ProbeStatus::Unhealthy("HTTP 503: Model not loaded".into()),
            ProbeStatus::Unhealthy("HTTP 503: Model not loaded".into()),
            ProbeStatus::Healthy,
        ]),
    );
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");
    assert!(outcome.succeeded());
    assert_eq!(outcome.report.health_probes, 3);
}

// ---------------------------------------------------------------------------
// Health timeout and rollback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unreachable_with_prior_deployment_rolls_back() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::unreachable())
        .with_prior_deployment("artifact-v1")
        .await;
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert!(!outcome.succeeded());
    assert_eq!(outcome.report.terminal_state(), DeployState::RolledBack);
    assert_eq!(outcome.reasons.len(), 1);
    assert_eq!(outcome.reasons[0].code, ReasonCode::HealthCheckTimeout);
    assert!(outcome.reasons[0].message.contains("unreachable"));
    assert_eq!(
        outcome.report.rollback,
        Some(RollbackStatus::Succeeded {
            artifact: "artifact-v1".into(),
            published_ref: "registry.local/artifact-v1".into(),
        })
    );
    assert_eq!(h.publisher.attempted(), vec!["artifact-v2", "artifact-v1"]);
    assert!(h.probe.calls() >= 2);
}

#[tokio::test(start_paused = true)]
async fn unreachable_without_prior_deployment_fails() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::unreachable());
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert_eq!(outcome.report.terminal_state(), DeployState::Failed);
    assert_eq!(outcome.report.rollback, Some(RollbackStatus::NoPriorDeployment));
    assert_eq!(outcome.reasons[0].code, ReasonCode::HealthCheckTimeout);
    assert_eq!(h.publisher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_rollback_is_an_extra_reason() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::with_responses([
            Ok(PublishedRef::new("registry.local/artifact-v2")),
            Err(PublishError::Fatal("manifest unknown".into())),
        ]),
        ScriptedProbe::unreachable(),
    )
    .with_prior_deployment("artifact-v1")
    .await;
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    let states = &outcome.report.states;
    assert_eq!(&states[states.len() - 2..], &[DeployState::RollingBack, DeployState::Failed]);
    let codes: Vec<ReasonCode> = outcome.reasons.iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![ReasonCode::HealthCheckTimeout, ReasonCode::RollbackFailed]);
    assert!(matches!(outcome.report.rollback, Some(RollbackStatus::Failed { .. })));
}

#[tokio::test(start_paused = true)]
async fn verification_respects_timeout() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::unreachable());
    let started = tokio::time::Instant::now();
    let _ = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1_000));
    assert!(elapsed < Duration::from_millis(1_200), "took {elapsed:?}");
}

// ---------------------------------------------------------------------------
// Build and publish failures
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn build_failure_is_fatal_and_stops_pipeline() {
    let h = Harness::new(
        FakeBuilder::failing("docker build exited with 1"),
        ScriptedPublisher::new(),
        ScriptedProbe::healthy(),
    );
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert_eq!(outcome.report.terminal_state(), DeployState::Failed);
    assert_eq!(outcome.reasons[0].code, ReasonCode::BuildFailed);
    assert_eq!(outcome.reasons[0].message, "build failed: docker build exited with 1");
    assert_eq!(h.builder.calls(), 1);
    assert_eq!(h.publisher.calls(), 0);
    assert_eq!(h.probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_publish_errors_retry_with_backoff() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::with_responses([
            Err(PublishError::Transient("503".into())),
            Err(PublishError::Transient("503".into())),
        ]),
        ScriptedProbe::healthy(),
    );
    let started = tokio::time::Instant::now();
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert!(outcome.succeeded());
    assert_eq!(outcome.report.publish_attempts, 3);
    // 200 ms then 400 ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn exhausted_publish_retries_fail() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::with_responses(
            std::iter::repeat_with(|| Err(PublishError::Transient("timeout".into()))).take(5),
        ),
        ScriptedProbe::healthy(),
    );
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");

    assert_eq!(outcome.report.terminal_state(), DeployState::Failed);
    assert_eq!(outcome.report.publish_attempts, 3);
    assert_eq!(outcome.reasons[0].code, ReasonCode::PublishFailed);
    assert!(outcome.reasons[0].message.contains("after 3 attempt(s)"));
    assert_eq!(h.probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_publish_error_is_not_retried() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::with_responses([Err(PublishError::Fatal("denied".into()))]),
        ScriptedProbe::healthy(),
    );
    let outcome = h.verifier(config()).run(Stage::Master, &candidate()).await.expect("run");
    assert_eq!(outcome.report.publish_attempts, 1);
    assert_eq!(h.publisher.calls(), 1);
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_credentials_fail_before_building() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::healthy());
    let mut cfg = config();
    cfg.credentials = None;
    let outcome = h.verifier(cfg).run(Stage::Master, &candidate()).await.expect("run");

    assert_eq!(outcome.report.states, vec![DeployState::Pending, DeployState::Failed]);
    assert_eq!(outcome.reasons[0].code, ReasonCode::MissingCredentials);
    assert!(outcome.reasons[0].code.is_configuration_error());
    assert_eq!(h.builder.calls(), 0);
}

// ---------------------------------------------------------------------------
// Stage lock
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn outcome_holds_stage_lock_until_released() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::healthy());
    let verifier = h.verifier(config());
    let outcome = verifier.run(Stage::Master, &candidate()).await.expect("run");
    assert!(verifier.locks().try_acquire(Stage::Master).is_none());
    let _ = outcome.release();
    assert!(verifier.locks().try_acquire(Stage::Master).is_some());
}

// ---------------------------------------------------------------------------
// Verification deadline
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn publish_backoff_cannot_hold_lock_past_verification_timeout() {
    let h = Harness::new(
        FakeBuilder::new(),
        ScriptedPublisher::with_responses(
            std::iter::repeat_with(|| Err(PublishError::Transient("503".into()))).take(6),
        ),
        ScriptedProbe::healthy(),
    );
    let mut cfg = config();
    cfg.publish = RetryPolicy {
        max_attempts: 6,
        backoff_base_ms: 5_000,
        backoff_cap_ms: 60_000,
    };
    let verifier = h.verifier(cfg);

    let started = tokio::time::Instant::now();
    let outcome = verifier.run(Stage::Master, &candidate()).await.expect("run");
    let held = started.elapsed();
    assert!(held <= Duration::from_millis(1_000), "lock held for {held:?}");

    assert_eq!(
        outcome.report.states,
        vec![
            DeployState::Pending,
            DeployState::Building,
            DeployState::Publishing,
            DeployState::Failed,
        ]
    );
    assert_eq!(outcome.reasons[0].code, ReasonCode::PublishFailed);
    assert!(outcome.reasons[0].message.contains("did not finish within 1000 ms"));
    assert_eq!(h.probe.calls(), 0);

    let _ = outcome.release();
    assert!(verifier.locks().try_acquire(Stage::Master).is_some());
}

#[tokio::test(start_paused = true)]
async fn stalled_publish_is_cut_at_verification_timeout() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::healthy());
    let verifier = DeploymentVerifier::new(
        h.builder.clone(),
        Arc::new(StallingPublisher::after(0)),
        h.probe.clone(),
        h.registry.clone(),
        config(),
    );

    let started = tokio::time::Instant::now();
    let outcome = verifier.run(Stage::Master, &candidate()).await.expect("run");
    let held = started.elapsed();
    assert!(held >= Duration::from_millis(1_000));
    assert!(held < Duration::from_millis(1_100), "lock held for {held:?}");

    assert_eq!(outcome.report.terminal_state(), DeployState::Failed);
    assert_eq!(outcome.report.publish_attempts, 1);
    assert_eq!(outcome.reasons[0].code, ReasonCode::PublishFailed);
    assert!(outcome.reasons[0].message.contains("still pending at deadline"));

    let _ = outcome.release();
    assert!(verifier.locks().try_acquire(Stage::Master).is_some());
}

#[tokio::test(start_paused = true)]
async fn stalled_rollback_publish_fails_within_its_window() {
    let h = Harness::new(FakeBuilder::new(), ScriptedPublisher::new(), ScriptedProbe::unreachable())
        .with_prior_deployment("artifact-v1")
        .await;
    let verifier = DeploymentVerifier::new(
        h.builder.clone(),
        Arc::new(StallingPublisher::after(1)),
        h.probe.clone(),
        h.registry.clone(),
        config(),
    );

    let started = tokio::time::Instant::now();
    let outcome = verifier.run(Stage::Master, &candidate()).await.expect("run");
    let held = started.elapsed();
    // One window for publish plus health, one for the rollback publish.
    assert!(held <= Duration::from_millis(2_000), "lock held for {held:?}");

    let states = &outcome.report.states;
    assert_eq!(&states[states.len() - 2..], &[DeployState::RollingBack, DeployState::Failed]);
    let codes: Vec<ReasonCode> = outcome.reasons.iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![ReasonCode::HealthCheckTimeout, ReasonCode::RollbackFailed]);
    match &outcome.report.rollback {
        Some(RollbackStatus::Failed { artifact, detail }) => {
            assert_eq!(artifact, "artifact-v1");
            assert!(detail.starts_with("timed out after 1000 ms"), "detail: {detail}");
        }
        other => panic!("expected failed rollback, got {other:?}"),
    }

    let _ = outcome.release();
    assert!(verifier.locks().try_acquire(Stage::Master).is_some());
}
