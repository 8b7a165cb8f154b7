//! `[ci]` configuration section.
//!
//! ```toml
//! [ci]
//! check_timeout_secs = 900
//! transient_exit_codes = [75]
//!
//! [[ci.checks]]
//! name = "typecheck"
//! command = ["mypy", "src"]
//!
//! [ci.build]
//! command = ["./scripts/build.sh", "{candidate}"]
//!
//! [ci.publish]
//! command = ["./scripts/push.sh", "{artifact}"]
//! ```

use std::sync::Arc;

use serde::Deserialize;

use promogate_core::collaborators::{ArtifactBuilder, ArtifactPublisher, CheckExecutor};

use crate::command::{CheckCatalog, CommandSpec, DEFAULT_TIMEOUT_SECS};
use crate::executors::{
    CommandArtifactBuilder, CommandCheckExecutor, CommandPublisher, DEFAULT_TRANSIENT_EXIT_CODES,
};

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_transient_exit_codes() -> Vec<i32> {
    DEFAULT_TRANSIENT_EXIT_CODES.to_vec()
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CiConfig {
    /// Timeout for the builtin cargo checks.
    #[serde(default = "default_timeout")]
    pub check_timeout_secs: u64,

    /// Extra or overriding check commands, matched by name.
    #[serde(default)]
    pub checks: Vec<CommandSpec>,

    pub build: Option<CommandSpec>,
    pub publish: Option<CommandSpec>,

    #[serde(default = "default_transient_exit_codes")]
    pub transient_exit_codes: Vec<i32>,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: DEFAULT_TIMEOUT_SECS,
            checks: Vec::new(),
            build: None,
            publish: None,
            transient_exit_codes: default_transient_exit_codes(),
        }
    }
}

impl CiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for spec in &self.checks {
            if spec.name.trim().is_empty() {
                anyhow::bail!("ci.checks entries need a name");
            }
            if spec.command.is_empty() {
                anyhow::bail!("ci check {} has an empty command", spec.name);
            }
        }
        for (section, spec) in [("build", &self.build), ("publish", &self.publish)] {
            if matches!(spec, Some(s) if s.command.is_empty()) {
                anyhow::bail!("ci.{section} has an empty command");
            }
        }
        Ok(())
    }

    pub fn catalog(&self) -> CheckCatalog {
        self.checks
            .iter()
            .cloned()
            .fold(CheckCatalog::builtin(self.check_timeout_secs), CheckCatalog::with)
    }

    pub fn check_executor(&self) -> Arc<dyn CheckExecutor> {
        Arc::new(CommandCheckExecutor::new(self.catalog()))
    }

    /// `None` when no build command is configured.
    pub fn builder(&self) -> Option<Arc<dyn ArtifactBuilder>> {
        self.build.as_ref().map(|spec| {
            let spec = named(spec, "build");
            Arc::new(CommandArtifactBuilder::new(spec)) as Arc<dyn ArtifactBuilder>
        })
    }

    /// `None` when no publish command is configured.
    pub fn publisher(&self) -> Option<Arc<dyn ArtifactPublisher>> {
        self.publish.as_ref().map(|spec| {
            let publisher = CommandPublisher::new(named(spec, "publish"))
                .with_transient_exit_codes(self.transient_exit_codes.clone());
            Arc::new(publisher) as Arc<dyn ArtifactPublisher>
        })
    }
}

fn named(spec: &CommandSpec, fallback: &str) -> CommandSpec {
    let mut spec = spec.clone();
    if spec.name.is_empty() {
        spec.name = fallback.to_string();
    }
    spec
}
