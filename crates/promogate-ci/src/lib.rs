//! promogate-ci: run quality checks, builds and publishes as external
//! commands.
//!
//! Each collaborator wraps [`CommandRunner`], which spawns the command with
//! piped output and a per-command timeout. Placeholders `{candidate}` and
//! `{artifact}` in arguments are substituted before spawning.

pub mod command;
pub mod config;
pub mod executors;
pub mod runner;

pub use command::{BuiltinCheck, CheckCatalog, CommandSpec};
pub use config::CiConfig;
pub use executors::{CommandArtifactBuilder, CommandCheckExecutor, CommandPublisher};
pub use runner::{CommandOutput, CommandRunner, CommandTimeout};
