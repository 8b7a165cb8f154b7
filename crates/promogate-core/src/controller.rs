//! Promotion controller: validates the requested edge, dispatches to the
//! gate that owns it, and appends exactly one record per evaluation.
//!
//! The controller is the only writer of the promotion log. Everything an
//! evaluation learns is collected in a [`RecordBuilder`] it owns and is
//! appended in one call at the end, so concurrent evaluations never
//! interleave inside a record.

use std::sync::Arc;

use tracing::Instrument;

use promogate_state::{DeploymentEntry, DeploymentRecord, DeploymentRegistry, PromotionLog};

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    ArtifactBuilder, ArtifactPublisher, CheckExecutor, HealthProbe, MetricsRegistry,
};
use crate::config::PromotionConfig;
use crate::deploy::{DeploymentOutcome, DeploymentVerifier, StageLocks};
use crate::domain::{
    Decision, GateEvidence, GatePolicy, GateReport, PromotionRecord, PromotionRequest, Reason,
    ReasonCode, RecordBuilder, Result, RollbackStatus, Stage, Transition,
};
use crate::metrics::METRICS;
use crate::model_gate::run_model_gate;
use crate::obs;
use crate::quality_gate::run_quality_gate;

/// External systems the gates delegate to.
#[derive(Clone)]
pub struct Collaborators {
    pub checks: Arc<dyn CheckExecutor>,
    pub metrics: Arc<dyn MetricsRegistry>,
    pub builder: Arc<dyn ArtifactBuilder>,
    pub publisher: Arc<dyn ArtifactPublisher>,
    pub probe: Arc<dyn HealthProbe>,
}

pub struct PromotionController {
    config: PromotionConfig,
    checks: Arc<dyn CheckExecutor>,
    metrics: Arc<dyn MetricsRegistry>,
    verifier: DeploymentVerifier,
    deployments: Arc<dyn DeploymentRegistry>,
    log: Arc<dyn PromotionLog>,
    clock: Arc<dyn Clock>,
}

fn invalid_transition(source: Stage, target: Stage) -> Reason {
    let expected = match source.next() {
        Some(next) => format!("{source} may only be promoted to {next}"),
        None => format!("{source} is the last stage"),
    };
    Reason::new(
        ReasonCode::InvalidStageTransition,
        format!("invalid stage transition: {source} -> {target} ({expected})"),
    )
}

impl PromotionController {
    pub fn new(
        config: PromotionConfig,
        collaborators: Collaborators,
        log: Arc<dyn PromotionLog>,
        deployments: Arc<dyn DeploymentRegistry>,
    ) -> Self {
        let verifier = DeploymentVerifier::new(
            collaborators.builder,
            collaborators.publisher,
            collaborators.probe,
            Arc::clone(&deployments),
            config.deploy.clone(),
        );
        Self {
            config,
            checks: collaborators.checks,
            metrics: collaborators.metrics,
            verifier,
            deployments,
            log,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share deployment locks with other controllers in this process.
    pub fn with_stage_locks(mut self, locks: Arc<StageLocks>) -> Self {
        self.verifier = self.verifier.with_locks(locks);
        self
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Evaluate `request` and return the decision.
    ///
    /// Blocking outcomes are `Ok`. `Err` means the record log or the
    /// deployment registry could not be used.
    pub async fn evaluate(&self, request: &PromotionRequest) -> Result<Decision> {
        Ok(self.evaluate_recorded(request).await?.decision)
    }

    /// Like [`evaluate`](Self::evaluate) but returns the full record that was
    /// appended.
    pub async fn evaluate_recorded(&self, request: &PromotionRequest) -> Result<PromotionRecord> {
        let edge = request.transition().map(|t| t.name()).unwrap_or("invalid");
        let span = obs::request_span(&request.id, edge);
        self.evaluate_inner(request).instrument(span).await
    }

    async fn evaluate_inner(&self, request: &PromotionRequest) -> Result<PromotionRecord> {
        obs::emit_promotion_started(
            &request.id,
            request.source.name(),
            request.target.name(),
            request.candidate.as_str(),
        );
        let evaluated_at = self.clock.now();
        let mut builder = RecordBuilder::new(request.clone());

        let decision = match request.transition() {
            None => Decision::block(invalid_transition(request.source, request.target), evaluated_at),
            Some(transition) => match self.config.policies.get(transition) {
                None => Decision::block(
                    Reason::new(
                        ReasonCode::MissingPolicy,
                        format!("no gate policy configured for {transition}"),
                    ),
                    evaluated_at,
                ),
                Some(policy) => {
                    let (evidence, reasons, rollback) =
                        self.run_gate(transition, policy, request).await?;
                    let decision =
                        Decision::from_reasons(reasons, evaluated_at).with_rollback(rollback);
                    obs::emit_gate_evaluated(
                        &request.id,
                        transition.name(),
                        decision.outcome,
                        &decision.reason_codes(),
                    );
                    builder.push_gate(GateReport {
                        transition,
                        outcome: decision.outcome,
                        evidence,
                    });
                    decision
                }
            },
        };

        let record = builder.finish(decision);
        let stored = self.log.append(record.to_entry()?).await?;
        METRICS.record_decision(record.decision.outcome);
        obs::emit_promotion_decided(&request.id, &record.decision, stored.seq);
        Ok(record)
    }

    async fn run_gate(
        &self,
        transition: Transition,
        policy: &GatePolicy,
        request: &PromotionRequest,
    ) -> Result<(GateEvidence, Vec<Reason>, Option<RollbackStatus>)> {
        match transition {
            Transition::FeatureToDev => {
                let verdict =
                    run_quality_gate(Arc::clone(&self.checks), policy, &request.candidate).await;
                let (evidence, reasons) = verdict.into_evidence();
                Ok((evidence, reasons, None))
            }
            Transition::DevToTest => {
                let verdict = run_model_gate(
                    &*self.metrics,
                    &self.config.model_name,
                    policy,
                    &request.candidate,
                )
                .await;
                let (evidence, reasons) = verdict.into_evidence();
                Ok((evidence, reasons, None))
            }
            Transition::TestToMaster => {
                let outcome = self.verifier.run(transition.target(), &request.candidate).await?;
                self.record_deployment(&outcome, &request.id).await?;
                let rollback = outcome.report.rollback.clone();
                let (evidence, reasons) = outcome.release();
                Ok((evidence, reasons, rollback))
            }
        }
    }

    /// Move the stage pointer to a successful deployment while its stage
    /// lock is still held.
    async fn record_deployment(&self, outcome: &DeploymentOutcome, request_id: &str) -> Result<()> {
        if !outcome.succeeded() {
            return Ok(());
        }
        let report = &outcome.report;
        if let (Some(artifact), Some(published)) = (&report.artifact, &report.published_ref) {
            self.deployments
                .record(DeploymentEntry {
                    stage: report.stage.name().to_string(),
                    artifact: artifact.to_string(),
                    published_ref: published.to_string(),
                    request_id: request_id.to_string(),
                })
                .await?;
        }
        Ok(())
    }

    /// Every record for `request_id`, oldest first, each re-verified against
    /// its digest.
    pub async fn history(&self, request_id: &str) -> Result<Vec<PromotionRecord>> {
        self.log
            .records_for(request_id)
            .await?
            .iter()
            .map(PromotionRecord::from_stored)
            .collect()
    }

    /// Deployment pointer chain for `stage`, newest first.
    pub async fn deployments(&self, stage: Stage) -> Result<Vec<DeploymentRecord>> {
        Ok(self.deployments.history(stage.name()).await?)
    }
}
