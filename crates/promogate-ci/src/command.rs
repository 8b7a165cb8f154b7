//! Command definitions: builtin cargo checks and configured commands.

use serde::{Deserialize, Serialize};

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Builtin quality checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// cargo fmt --all -- --check
    Fmt,

    /// cargo clippy --workspace --all-targets -- -D warnings
    Lint,

    /// cargo test --workspace
    UnitTests,
}

impl BuiltinCheck {
    pub const ALL: [BuiltinCheck; 3] = [BuiltinCheck::Fmt, BuiltinCheck::Lint, BuiltinCheck::UnitTests];

    /// Name used in `required_checks`.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::Fmt => "fmt",
            BuiltinCheck::Lint => "lint",
            BuiltinCheck::UnitTests => "unittests",
        }
    }

    pub fn command(&self) -> Vec<String> {
        let args: &[&str] = match self {
            BuiltinCheck::Fmt => &["cargo", "fmt", "--all", "--", "--check"],
            BuiltinCheck::Lint => &[
                "cargo",
                "clippy",
                "--workspace",
                "--all-targets",
                "--",
                "-D",
                "warnings",
            ],
            BuiltinCheck::UnitTests => &["cargo", "test", "--workspace"],
        };
        args.iter().map(|a| a.to_string()).collect()
    }
}

/// A named external command.
///
/// Arguments may contain `{candidate}` or `{artifact}` placeholders, which
/// are substituted before the command runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    #[serde(default)]
    pub name: String,

    /// Executable followed by its arguments.
    pub command: Vec<String>,

    /// 0 disables the timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
        }
    }

    pub fn from_builtin(check: BuiltinCheck, timeout_secs: u64) -> Self {
        Self::new(check.name(), check.command(), timeout_secs)
    }

    /// Append one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    /// Copy with every `{key}` placeholder replaced.
    pub fn substituted(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{key}}}"), value)
                })
            })
            .collect()
    }
}

/// Check commands by name: builtins first, configured commands override or
/// extend them.
#[derive(Debug, Clone, Default)]
pub struct CheckCatalog {
    commands: Vec<CommandSpec>,
}

impl CheckCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The builtin cargo checks.
    pub fn builtin(timeout_secs: u64) -> Self {
        Self {
            commands: BuiltinCheck::ALL
                .iter()
                .map(|c| CommandSpec::from_builtin(*c, timeout_secs))
                .collect(),
        }
    }

    /// Add `spec`, replacing any command with the same name.
    pub fn with(mut self, spec: CommandSpec) -> Self {
        self.commands.retain(|c| c.name != spec.name);
        self.commands.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }
}
