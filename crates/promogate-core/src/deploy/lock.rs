//! Exclusive per-stage deployment locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::Stage;

/// One async mutex per target stage, created on first use.
#[derive(Debug, Default)]
pub struct StageLocks {
    locks: Mutex<HashMap<Stage, Arc<AsyncMutex<()>>>>,
}

/// Held for the whole deployment run on `stage`; released on drop.
#[derive(Debug)]
pub struct StageGuard {
    stage: Stage,
    _guard: OwnedMutexGuard<()>,
}

impl StageGuard {
    pub fn stage(&self) -> Stage {
        self.stage
    }
}

impl StageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, stage: Stage) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(stage).or_default())
    }

    /// Wait until no other run holds `stage`.
    pub async fn acquire(&self, stage: Stage) -> StageGuard {
        let lock = self.lock_for(stage);
        debug!(stage = %stage, "waiting for stage lock");
        let guard = lock.lock_owned().await;
        debug!(stage = %stage, "stage lock acquired");
        StageGuard {
            stage,
            _guard: guard,
        }
    }

    /// Acquire without waiting, if free.
    pub fn try_acquire(&self, stage: Stage) -> Option<StageGuard> {
        let lock = self.lock_for(stage);
        lock.try_lock_owned().ok().map(|guard| StageGuard {
            stage,
            _guard: guard,
        })
    }
}
