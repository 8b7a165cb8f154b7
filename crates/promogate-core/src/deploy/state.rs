//! Deployment run state machine.
//!
//! ```text
//! Pending → Building → Publishing → Verifying → Succeeded
//!    │         │           │            ├─────→ RollingBack → RolledBack
//!    │         │           │            │            └──────→ Failed
//!    └─────────┴───────────┴────────────┴─────────────────────→ Failed
//! ```
//!
//! No state is entered twice in one run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Stage;
use crate::obs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Pending,
    Building,
    Publishing,
    Verifying,
    Succeeded,
    RollingBack,
    RolledBack,
    Failed,
}

impl DeployState {
    pub fn name(&self) -> &'static str {
        match self {
            DeployState::Pending => "pending",
            DeployState::Building => "building",
            DeployState::Publishing => "publishing",
            DeployState::Verifying => "verifying",
            DeployState::Succeeded => "succeeded",
            DeployState::RollingBack => "rolling_back",
            DeployState::RolledBack => "rolled_back",
            DeployState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployState::Succeeded | DeployState::RolledBack | DeployState::Failed
        )
    }

    pub fn can_transition_to(&self, next: DeployState) -> bool {
        use DeployState::*;
        matches!(
            (self, next),
            (Pending, Building)
                | (Pending, Failed)
                | (Building, Publishing)
                | (Building, Failed)
                | (Publishing, Verifying)
                | (Publishing, Failed)
                | (Verifying, Succeeded)
                | (Verifying, RollingBack)
                | (Verifying, Failed)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
        )
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of states one run passed through.
#[derive(Debug, Clone)]
pub(crate) struct StateTrail {
    stage: Stage,
    states: Vec<DeployState>,
}

impl StateTrail {
    pub(crate) fn new(stage: Stage) -> Self {
        Self {
            stage,
            states: vec![DeployState::Pending],
        }
    }

    pub(crate) fn current(&self) -> DeployState {
        self.states
            .last()
            .copied()
            .unwrap_or(DeployState::Pending)
    }

    pub(crate) fn advance(&mut self, next: DeployState) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(next),
            "illegal deploy transition {from} -> {next}"
        );
        obs::emit_deploy_transition(self.stage.name(), from.name(), next.name());
        self.states.push(next);
    }

    pub(crate) fn into_states(self) -> Vec<DeployState> {
        self.states
    }
}
