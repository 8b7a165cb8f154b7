//! promogate - promotion gate CLI
//!
//! ## Commands
//!
//! - `evaluate`: run the gate for one promotion request and print the decision
//! - `history`: show every recorded evaluation of a request
//! - `deployments`: show the deployment pointer chain of a stage
//! - `config`: validate a config file and print the effective settings
//!
//! `evaluate` exits 0 on allow and 2 on block.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};

use promogate_ci::CiConfig;
use promogate_core::config::read_config_file;
use promogate_core::metrics::METRICS;
use promogate_core::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, BuildError, CandidateRef, Collaborators,
    Decision, HttpHealthProbe, HttpMetricsRegistry, PromotionConfig, PromotionController,
    PromotionRequest, PublishError, PublishedRef, RegistryCredentials, Stage,
};
use promogate_state::SurrealPromotionStore;

/// Overrides `metrics_url` from the config file.
const ENV_METRICS_URL: &str = "PROMOGATE_METRICS_URL";

const DEFAULT_METRICS_URL: &str = "http://localhost:5000";

/// Per-request timeout for the metrics registry; also caps health probes.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_BLOCK: u8 = 2;

#[derive(Parser)]
#[command(name = "promogate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Promotion gates for feature → dev → test → master", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Database URL (mem://, surrealkv://path, ws://host); falls back to
    /// PROMOGATE_DB_* settings
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one promotion request
    Evaluate {
        /// Path to the promogate TOML config
        #[arg(short, long, default_value = "promogate.toml")]
        config: PathBuf,

        /// Request id (random when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Source stage
        #[arg(long)]
        from: Stage,

        /// Target stage
        #[arg(long)]
        to: Stage,

        /// Candidate reference (commit sha, model version...)
        #[arg(long)]
        candidate: String,

        /// Directory for decision.json, record.json and summary.md
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show recorded evaluations of a request, oldest first
    History {
        /// Request id
        #[arg(long)]
        id: String,
    },

    /// Show the deployment pointer chain of a stage, newest first
    Deployments {
        #[arg(long, default_value = "master")]
        stage: Stage,
    },

    /// Validate a config file and print the effective settings
    Config {
        #[arg(short, long, default_value = "promogate.toml")]
        config: PathBuf,
    },
}

/// Everything a promogate TOML file may contain.
#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
    #[serde(flatten)]
    promotion: PromotionConfig,

    #[serde(default)]
    ci: CiConfig,

    metrics_url: Option<String>,
}

impl CliConfig {
    fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid config")
    }

    fn load(path: &Path) -> Result<Self> {
        let raw = read_config_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config = Self::parse(&raw)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_METRICS_URL) {
            self.metrics_url = Some(url);
        }
        self.promotion.apply_env_overrides(lookup)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.promotion.validate()?;
        self.ci.validate()
    }

    fn metrics_url(&self) -> &str {
        self.metrics_url.as_deref().unwrap_or(DEFAULT_METRICS_URL)
    }
}

/// Stands in for a build or publish command missing from `[ci]`.
struct NotConfigured(&'static str);

#[async_trait]
impl ArtifactBuilder for NotConfigured {
    async fn build(&self, _candidate: &CandidateRef) -> Result<ArtifactHandle, BuildError> {
        Err(BuildError(format!("no {} command configured", self.0)))
    }
}

#[async_trait]
impl ArtifactPublisher for NotConfigured {
    async fn publish(
        &self,
        _artifact: &ArtifactHandle,
        _credentials: &RegistryCredentials,
    ) -> Result<PublishedRef, PublishError> {
        Err(PublishError::Fatal(format!(
            "no {} command configured",
            self.0
        )))
    }
}

fn build_collaborators(config: &CliConfig) -> Result<Collaborators> {
    Ok(Collaborators {
        checks: config.ci.check_executor(),
        metrics: Arc::new(HttpMetricsRegistry::new(config.metrics_url(), HTTP_TIMEOUT)?),
        builder: config
            .ci
            .builder()
            .unwrap_or_else(|| Arc::new(NotConfigured("ci.build"))),
        publisher: config
            .ci
            .publisher()
            .unwrap_or_else(|| Arc::new(NotConfigured("ci.publish"))),
        probe: Arc::new(HttpHealthProbe::new(probe_timeout(&config.promotion))?),
    })
}

/// A single probe never outlives the polling interval.
fn probe_timeout(config: &PromotionConfig) -> Duration {
    Duration::from_millis(config.deploy.probe_interval_ms).min(HTTP_TIMEOUT)
}

async fn open_store(db: Option<&str>) -> Result<Arc<SurrealPromotionStore>> {
    let store = match db {
        Some(url) => SurrealPromotionStore::connect(url).await,
        None => SurrealPromotionStore::from_env().await,
    }
    .context("failed to connect to the promotion store")?;
    Ok(Arc::new(store))
}

fn build_controller(
    config: PromotionConfig,
    collaborators: Collaborators,
    store: Arc<SurrealPromotionStore>,
) -> PromotionController {
    PromotionController::new(config, collaborators, store.clone(), store)
}

fn exit_code_for(decision: &Decision) -> u8 {
    if decision.allowed() {
        0
    } else {
        EXIT_BLOCK
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    promogate_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Evaluate {
            config,
            id,
            from,
            to,
            candidate,
            out,
        } => {
            let config = CliConfig::load(&config)?;
            let collaborators = build_collaborators(&config)?;
            let store = open_store(cli.db.as_deref()).await?;
            let controller = build_controller(config.promotion, collaborators, store);
            let candidate = CandidateRef::new(candidate);
            let request = match id {
                Some(id) => PromotionRequest::new(id, from, to, candidate),
                None => PromotionRequest::generated(from, to, candidate),
            };
            let decision = cmd_evaluate(&controller, &request, out.as_deref()).await?;
            exit_code_for(&decision)
        }
        Commands::History { id } => {
            let store = open_store(cli.db.as_deref()).await?;
            let controller = build_controller(
                PromotionConfig::default(),
                history_only_collaborators()?,
                store,
            );
            cmd_history(&controller, &id).await?;
            0
        }
        Commands::Deployments { stage } => {
            let store = open_store(cli.db.as_deref()).await?;
            let controller = build_controller(
                PromotionConfig::default(),
                history_only_collaborators()?,
                store,
            );
            cmd_deployments(&controller, stage).await?;
            0
        }
        Commands::Config { config } => {
            cmd_config(&config)?;
            0
        }
    };

    METRICS.flush();
    Ok(ExitCode::from(code))
}

/// Collaborators for read-only commands; none of them is ever called.
fn history_only_collaborators() -> Result<Collaborators> {
    build_collaborators(&CliConfig {
        promotion: PromotionConfig::default(),
        ci: CiConfig::default(),
        metrics_url: None,
    })
}

async fn cmd_evaluate(
    controller: &PromotionController,
    request: &PromotionRequest,
    out: Option<&Path>,
) -> Result<Decision> {
    let record = controller
        .evaluate_recorded(request)
        .await
        .with_context(|| format!("evaluation of {} failed", request.id))?;

    if let Some(dir) = out {
        let path = promogate_core::write_decision_artifact(&record, dir)?;
        info!(path = %path.display(), "decision artifacts written");
    }

    println!("{}", serde_json::to_string_pretty(&record.decision)?);
    Ok(record.decision)
}

async fn cmd_history(controller: &PromotionController, request_id: &str) -> Result<()> {
    let records = controller.history(request_id).await?;
    if records.is_empty() {
        anyhow::bail!("no records for request {request_id}");
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn cmd_deployments(controller: &PromotionController, stage: Stage) -> Result<()> {
    let chain = controller.deployments(stage).await?;
    if chain.is_empty() {
        println!("No deployments recorded for {stage}");
        return Ok(());
    }
    for (i, d) in chain.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "{marker} #{} {} -> {} (request {}, {})",
            d.seq,
            d.artifact,
            d.published_ref,
            d.request_id,
            d.deployed_at.to_rfc3339()
        );
    }
    Ok(())
}

fn cmd_config(path: &Path) -> Result<()> {
    let config = CliConfig::load(path)?;
    println!("{}", serde_json::to_string_pretty(&config.promotion)?);
    println!("metrics_url: {}", config.metrics_url());
    println!("checks: {}", config.ci.catalog().names().join(", "));
    println!(
        "registry credentials: {}",
        if config.promotion.credentials_configured() {
            "configured"
        } else {
            "missing"
        }
    );
    Ok(())
}
