//! Promotion stages and the transitions between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PromotionError;

/// One step of the promotion topology, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Feature,
    Dev,
    Test,
    Master,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Feature, Stage::Dev, Stage::Test, Stage::Master];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Feature => "feature",
            Stage::Dev => "dev",
            Stage::Test => "test",
            Stage::Master => "master",
        }
    }

    /// The stage a promotion out of `self` must target, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Feature => Some(Stage::Dev),
            Stage::Dev => Some(Stage::Test),
            Stage::Test => Some(Stage::Master),
            Stage::Master => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PromotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PromotionError::InvalidStage(s.to_string()))
    }
}

/// An inter-stage edge. Exactly one gate owns each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Code quality and tests.
    FeatureToDev,
    /// Candidate model vs. production baseline.
    DevToTest,
    /// Build, publish and deployment verification.
    TestToMaster,
}

impl Transition {
    pub const ALL: [Transition; 3] = [
        Transition::FeatureToDev,
        Transition::DevToTest,
        Transition::TestToMaster,
    ];

    /// The transition from `source` to `target`, or `None` unless
    /// `target` is exactly the stage after `source`.
    pub fn between(source: Stage, target: Stage) -> Option<Transition> {
        if source.next() != Some(target) {
            return None;
        }
        match source {
            Stage::Feature => Some(Transition::FeatureToDev),
            Stage::Dev => Some(Transition::DevToTest),
            Stage::Test => Some(Transition::TestToMaster),
            Stage::Master => None,
        }
    }

    pub fn source(&self) -> Stage {
        match self {
            Transition::FeatureToDev => Stage::Feature,
            Transition::DevToTest => Stage::Dev,
            Transition::TestToMaster => Stage::Test,
        }
    }

    pub fn target(&self) -> Stage {
        match self {
            Transition::FeatureToDev => Stage::Dev,
            Transition::DevToTest => Stage::Test,
            Transition::TestToMaster => Stage::Master,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::FeatureToDev => "feature_to_dev",
            Transition::DevToTest => "dev_to_test",
            Transition::TestToMaster => "test_to_master",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
