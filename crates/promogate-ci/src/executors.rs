//! Process-backed [`CheckExecutor`], [`ArtifactBuilder`] and
//! [`ArtifactPublisher`].

use async_trait::async_trait;
use tracing::{debug, warn};

use promogate_core::collaborators::{
    ArtifactBuilder, ArtifactHandle, ArtifactPublisher, BuildError, CheckError, CheckExecutor,
    PublishError, PublishedRef, RegistryCredentials,
};
use promogate_core::config::{ENV_REGISTRY_PASSWORD, ENV_REGISTRY_USERNAME};
use promogate_core::domain::{CandidateRef, CheckResult};

use crate::command::{CheckCatalog, CommandSpec};
use crate::runner::{CommandOutput, CommandRunner, CommandTimeout};

/// Exit code a publish command uses to ask for a retry (`EX_TEMPFAIL`).
pub const DEFAULT_TRANSIENT_EXIT_CODES: &[i32] = &[75];

fn failure_detail(output: &CommandOutput) -> String {
    let tail = output.stderr_tail();
    if tail.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        format!("exit code {}: {}", output.exit_code, tail)
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Runs each required check as a command from a [`CheckCatalog`].
pub struct CommandCheckExecutor {
    catalog: CheckCatalog,
}

impl CommandCheckExecutor {
    pub fn new(catalog: CheckCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CheckExecutor for CommandCheckExecutor {
    async fn run(&self, name: &str, candidate: &CandidateRef) -> Result<CheckResult, CheckError> {
        let spec = self
            .catalog
            .get(name)
            .ok_or_else(|| CheckError(format!("no command configured for check {name}")))?;

        let output = CommandRunner::run(spec, &[("candidate", candidate.as_str())], &[])
            .await
            .map_err(|e| CheckError(e.to_string()))?;

        debug!(check = %name, exit_code = output.exit_code, duration_ms = output.duration_ms, "check finished");

        if output.success() {
            Ok(CheckResult::pass(name, "", output.duration_ms))
        } else {
            Ok(CheckResult::fail(
                name,
                failure_detail(&output),
                output.duration_ms,
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Builds by running a command; the last non-empty stdout line names the
/// artifact.
pub struct CommandArtifactBuilder {
    spec: CommandSpec,
}

impl CommandArtifactBuilder {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ArtifactBuilder for CommandArtifactBuilder {
    async fn build(&self, candidate: &CandidateRef) -> Result<ArtifactHandle, BuildError> {
        let output = CommandRunner::run(&self.spec, &[("candidate", candidate.as_str())], &[])
            .await
            .map_err(|e| BuildError(e.to_string()))?;

        if !output.success() {
            return Err(BuildError(failure_detail(&output)));
        }

        output
            .last_stdout_line()
            .map(ArtifactHandle::new)
            .ok_or_else(|| BuildError("build command printed no artifact".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// Publishes by running a command with the registry login in its environment.
///
/// Exit codes listed in `transient_exit_codes` and timeouts are reported as
/// [`PublishError::Transient`]; anything else is fatal. The last non-empty
/// stdout line is the published reference, or the artifact itself when the
/// command prints nothing.
pub struct CommandPublisher {
    spec: CommandSpec,
    transient_exit_codes: Vec<i32>,
}

impl CommandPublisher {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            transient_exit_codes: DEFAULT_TRANSIENT_EXIT_CODES.to_vec(),
        }
    }

    pub fn with_transient_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.transient_exit_codes = codes;
        self
    }
}

#[async_trait]
impl ArtifactPublisher for CommandPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        credentials: &RegistryCredentials,
    ) -> Result<PublishedRef, PublishError> {
        let envs = [
            (ENV_REGISTRY_USERNAME, credentials.username.as_str()),
            (ENV_REGISTRY_PASSWORD, credentials.password.as_str()),
        ];

        let output = match CommandRunner::run(&self.spec, &[("artifact", artifact.as_str())], &envs)
            .await
        {
            Ok(output) => output,
            Err(e) if e.is::<CommandTimeout>() => return Err(PublishError::Transient(e.to_string())),
            Err(e) => return Err(PublishError::Fatal(e.to_string())),
        };

        if !output.success() {
            let detail = failure_detail(&output);
            if self.transient_exit_codes.contains(&output.exit_code) {
                warn!(artifact = %artifact, exit_code = output.exit_code, "publish command asked for retry");
                return Err(PublishError::Transient(detail));
            }
            return Err(PublishError::Fatal(detail));
        }

        Ok(PublishedRef::new(
            output.last_stdout_line().unwrap_or(artifact.as_str()),
        ))
    }
}
