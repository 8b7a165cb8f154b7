//! test → master gate: build, publish, verify health, roll back on timeout.
//!
//! Each run holds the target stage's lock from before `Building` until the
//! returned [`DeploymentOutcome`] is dropped, so the caller can record the
//! new deployment pointer before another run starts.
//!
//! Publishing and health verification share one deadline, set when the run
//! enters `Publishing` and `verification_timeout_ms` away. A rollback
//! re-publish gets a fresh window of the same length. No collaborator call
//! or backoff sleep outlives its window, so the lock is held for at most
//! the build plus two windows.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use promogate_state::DeploymentRegistry;

use super::lock::{StageGuard, StageLocks};
use super::retry::publish_with_retry;
use super::state::{DeployState, StateTrail};
use crate::collaborators::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, HealthProbe, ProbeStatus, PublishedRef,
    RegistryCredentials,
};
use crate::config::DeployConfig;
use crate::domain::{CandidateRef, GateEvidence, Reason, ReasonCode, Result, RollbackStatus, Stage};
use crate::metrics::METRICS;
use crate::obs;

/// What one deployment run did, as recorded on the PromotionRecord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub stage: Stage,
    pub states: Vec<DeployState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_ref: Option<PublishedRef>,
    pub publish_attempts: u32,
    pub health_probes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<ProbeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackStatus>,
}

impl DeploymentReport {
    pub fn terminal_state(&self) -> DeployState {
        self.states.last().copied().unwrap_or(DeployState::Pending)
    }
}

/// Result of a deployment run. Holds the stage lock while alive.
#[derive(Debug)]
pub struct DeploymentOutcome {
    pub report: DeploymentReport,
    pub reasons: Vec<Reason>,
    guard: Option<StageGuard>,
}

impl DeploymentOutcome {
    pub fn succeeded(&self) -> bool {
        self.report.terminal_state() == DeployState::Succeeded
    }

    /// Release the stage lock and hand back the evidence.
    pub fn release(self) -> (GateEvidence, Vec<Reason>) {
        drop(self.guard);
        (GateEvidence::Deployment(self.report), self.reasons)
    }
}

struct Run {
    trail: StateTrail,
    stage: Stage,
    artifact: Option<ArtifactHandle>,
    published_ref: Option<PublishedRef>,
    publish_attempts: u32,
    health_probes: u32,
    last_probe: Option<ProbeStatus>,
    previous_artifact: Option<String>,
    rollback: Option<RollbackStatus>,
}

impl Run {
    fn new(stage: Stage) -> Self {
        Self {
            trail: StateTrail::new(stage),
            stage,
            artifact: None,
            published_ref: None,
            publish_attempts: 0,
            health_probes: 0,
            last_probe: None,
            previous_artifact: None,
            rollback: None,
        }
    }

    fn finish(self, reasons: Vec<Reason>, guard: Option<StageGuard>) -> DeploymentOutcome {
        DeploymentOutcome {
            report: DeploymentReport {
                stage: self.stage,
                states: self.trail.into_states(),
                artifact: self.artifact,
                published_ref: self.published_ref,
                publish_attempts: self.publish_attempts,
                health_probes: self.health_probes,
                last_probe: self.last_probe,
                previous_artifact: self.previous_artifact,
                rollback: self.rollback,
            },
            reasons,
            guard,
        }
    }

    fn fail(mut self, reason: Reason, guard: Option<StageGuard>) -> DeploymentOutcome {
        self.trail.advance(DeployState::Failed);
        self.finish(vec![reason], guard)
    }
}

fn describe_probe(status: Option<&ProbeStatus>) -> String {
    match status {
        None => "no probe completed".to_string(),
        Some(ProbeStatus::Healthy) => "healthy".to_string(),
        Some(ProbeStatus::Unhealthy(detail)) => format!("unhealthy: {detail}"),
        Some(ProbeStatus::Unreachable(detail)) => format!("unreachable: {detail}"),
    }
}

pub struct DeploymentVerifier {
    builder: Arc<dyn ArtifactBuilder>,
    publisher: Arc<dyn ArtifactPublisher>,
    probe: Arc<dyn HealthProbe>,
    deployments: Arc<dyn DeploymentRegistry>,
    locks: Arc<StageLocks>,
    config: DeployConfig,
}

impl DeploymentVerifier {
    pub fn new(
        builder: Arc<dyn ArtifactBuilder>,
        publisher: Arc<dyn ArtifactPublisher>,
        probe: Arc<dyn HealthProbe>,
        deployments: Arc<dyn DeploymentRegistry>,
        config: DeployConfig,
    ) -> Self {
        Self {
            builder,
            publisher,
            probe,
            deployments,
            locks: Arc::new(StageLocks::new()),
            config,
        }
    }

    /// Share stage locks with other verifiers in the same process.
    pub fn with_locks(mut self, locks: Arc<StageLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<StageLocks> {
        &self.locks
    }

    fn verification_window(&self) -> Duration {
        Duration::from_millis(self.config.verification_timeout_ms)
    }

    fn credentials(&self) -> Option<&RegistryCredentials> {
        self.config
            .credentials
            .as_ref()
            .filter(|c| !c.username.is_empty() && !c.password.is_empty())
    }

    /// Deploy `candidate` to `stage`.
    ///
    /// Every gate outcome, including failures, is `Ok`; `Err` only when the
    /// deployment registry cannot be read.
    pub async fn run(&self, stage: Stage, candidate: &CandidateRef) -> Result<DeploymentOutcome> {
        let mut run = Run::new(stage);

        let Some(credentials) = self.credentials() else {
            return Ok(run.fail(
                Reason::new(
                    ReasonCode::MissingCredentials,
                    "missing registry credentials: set PROMOGATE_REGISTRY_USERNAME and PROMOGATE_REGISTRY_PASSWORD",
                ),
                None,
            ));
        };

        let guard = self.locks.acquire(stage).await;
        let previous = self.deployments.current(stage.name()).await?;
        run.previous_artifact = previous.as_ref().map(|p| p.artifact.clone());

        run.trail.advance(DeployState::Building);
        let artifact = match self.builder.build(candidate).await {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(stage = %stage, candidate = %candidate, error = %err, "build failed");
                return Ok(run.fail(
                    Reason::new(ReasonCode::BuildFailed, format!("build failed: {err}")),
                    Some(guard),
                ));
            }
        };
        run.artifact = Some(artifact.clone());

        run.trail.advance(DeployState::Publishing);
        let deadline = Instant::now() + self.verification_window();
        let publish = publish_with_retry(
            &*self.publisher,
            &artifact,
            credentials,
            &self.config.publish,
            deadline,
        )
        .await;
        run.publish_attempts = publish.attempts;
        let published = match publish.result {
            Ok(published) => published,
            Err(err) => {
                let message = if publish.timed_out {
                    format!(
                        "publish of {artifact} did not finish within {} ms after {} attempt(s): {err}",
                        self.config.verification_timeout_ms, publish.attempts
                    )
                } else {
                    format!(
                        "publish of {artifact} failed after {} attempt(s): {err}",
                        publish.attempts
                    )
                };
                warn!(
                    stage = %stage,
                    artifact = %artifact,
                    timed_out = publish.timed_out,
                    "publish failed"
                );
                return Ok(run.fail(Reason::new(ReasonCode::PublishFailed, message), Some(guard)));
            }
        };
        info!(stage = %stage, artifact = %artifact, published = %published, "artifact published");
        run.published_ref = Some(published);

        run.trail.advance(DeployState::Verifying);
        if self.await_healthy(&mut run, deadline).await {
            run.trail.advance(DeployState::Succeeded);
            return Ok(run.finish(Vec::new(), Some(guard)));
        }

        let mut reasons = vec![Reason::new(
            ReasonCode::HealthCheckTimeout,
            format!(
                "health check at {} did not pass within {} ms ({})",
                self.config.health_endpoint,
                self.config.verification_timeout_ms,
                describe_probe(run.last_probe.as_ref())
            ),
        )];

        match previous {
            None => {
                run.trail.advance(DeployState::Failed);
                run.rollback = Some(RollbackStatus::NoPriorDeployment);
            }
            Some(prev) => {
                run.trail.advance(DeployState::RollingBack);
                METRICS.inc_rollbacks_attempted();
                let handle = ArtifactHandle::new(prev.artifact.clone());
                let attempt = publish_with_retry(
                    &*self.publisher,
                    &handle,
                    credentials,
                    &self.config.publish,
                    Instant::now() + self.verification_window(),
                )
                .await;
                match attempt.result {
                    Ok(restored) => {
                        run.trail.advance(DeployState::RolledBack);
                        obs::emit_rollback_finished(stage.name(), &prev.artifact, true);
                        run.rollback = Some(RollbackStatus::Succeeded {
                            artifact: prev.artifact,
                            published_ref: restored.0,
                        });
                    }
                    Err(err) => {
                        run.trail.advance(DeployState::Failed);
                        METRICS.inc_rollbacks_failed();
                        obs::emit_rollback_finished(stage.name(), &prev.artifact, false);
                        let detail = if attempt.timed_out {
                            format!(
                                "timed out after {} ms: {err}",
                                self.config.verification_timeout_ms
                            )
                        } else {
                            err.to_string()
                        };
                        reasons.push(Reason::new(
                            ReasonCode::RollbackFailed,
                            format!(
                                "rollback to {} failed: {detail}; manual intervention required",
                                prev.artifact
                            ),
                        ));
                        run.rollback = Some(RollbackStatus::Failed {
                            artifact: prev.artifact,
                            detail,
                        });
                    }
                }
            }
        }

        Ok(run.finish(reasons, Some(guard)))
    }

    /// Poll until healthy or `deadline` passes. The deadline covers the probe
    /// calls themselves, so a hanging endpoint cannot hold the stage lock
    /// past it.
    async fn await_healthy(&self, run: &mut Run, deadline: Instant) -> bool {
        let interval = Duration::from_millis(self.config.probe_interval_ms);
        let endpoint = self.config.health_endpoint.as_str();

        let polled = tokio::time::timeout_at(deadline, async {
            loop {
                let status = self.probe.probe(endpoint).await;
                run.health_probes += 1;
                let healthy = status.is_healthy();
                run.last_probe = Some(status);
                if healthy {
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        })
        .await;

        polled.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_description() {
        assert_eq!(describe_probe(None), "no probe completed");
        assert_eq!(
            describe_probe(Some(&ProbeStatus::Unreachable("connection refused".into()))),
            "unreachable: connection refused"
        );
    }

    #[test]
    fn report_terminal_state_is_last() {
        let report = DeploymentReport {
            stage: Stage::Master,
            states: vec![DeployState::Pending, DeployState::Failed],
            artifact: None,
            published_ref: None,
            publish_attempts: 0,
            health_probes: 0,
            last_probe: None,
            previous_artifact: None,
            rollback: None,
        };
        assert_eq!(report.terminal_state(), DeployState::Failed);
    }
}
