//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryPromotionLog` and `MemoryDeploymentRegistry` that satisfy
//! the trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryPromotionLog
// ---------------------------------------------------------------------------

/// In-memory promotion log backed by a `Vec<StoredRecord>`.
///
/// The whole entry is pushed under one lock, so concurrent appends never
/// interleave.
#[derive(Debug, Default)]
pub struct MemoryPromotionLog {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryPromotionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite the payload of the record at `seq`. Lets tests simulate
    /// tampering with the stored trail.
    pub fn corrupt_payload(&self, seq: u64, payload: serde_json::Value) -> StorageResult<()> {
        let mut records = lock(&self.records)?;
        let record = records
            .iter_mut()
            .find(|r| r.seq == seq)
            .ok_or_else(|| StorageError::Backend(format!("no record with seq {seq}")))?;
        record.payload = payload;
        Ok(())
    }
}

#[async_trait]
impl PromotionLog for MemoryPromotionLog {
    async fn append(&self, entry: RecordEntry) -> StorageResult<StoredRecord> {
        let mut records = lock(&self.records)?;
        let stored = StoredRecord {
            seq: records.len() as u64 + 1,
            request_id: entry.request_id,
            transition: entry.transition,
            outcome: entry.outcome,
            digest: entry.digest,
            payload: entry.payload,
            recorded_at: Utc::now(),
        };
        records.push(stored.clone());
        Ok(stored)
    }

    async fn records_for(&self, request_id: &str) -> StorageResult<Vec<StoredRecord>> {
        let records = lock(&self.records)?;
        Ok(records
            .iter()
            .filter(|r| r.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn list(&self) -> StorageResult<Vec<StoredRecord>> {
        Ok(lock(&self.records)?.clone())
    }
}

// ---------------------------------------------------------------------------
// MemoryDeploymentRegistry
// ---------------------------------------------------------------------------

/// In-memory deployment registry backed by a `HashMap<stage, Vec<DeploymentRecord>>`.
///
/// Each stage maps to its full deployment history (newest last internally).
#[derive(Debug, Default)]
pub struct MemoryDeploymentRegistry {
    deployments: Mutex<HashMap<String, Vec<DeploymentRecord>>>,
    next_seq: Mutex<u64>,
}

impl MemoryDeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentRegistry for MemoryDeploymentRegistry {
    async fn record(&self, entry: DeploymentEntry) -> StorageResult<DeploymentRecord> {
        let seq = {
            let mut next = lock(&self.next_seq)?;
            *next += 1;
            *next
        };
        let record = DeploymentRecord {
            seq,
            stage: entry.stage,
            artifact: entry.artifact,
            published_ref: entry.published_ref,
            request_id: entry.request_id,
            deployed_at: Utc::now(),
        };
        let mut deployments = lock(&self.deployments)?;
        deployments
            .entry(record.stage.clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn current(&self, stage: &str) -> StorageResult<Option<DeploymentRecord>> {
        let deployments = lock(&self.deployments)?;
        Ok(deployments.get(stage).and_then(|h| h.last().cloned()))
    }

    async fn history(&self, stage: &str) -> StorageResult<Vec<DeploymentRecord>> {
        let deployments = lock(&self.deployments)?;
        let mut history = deployments.get(stage).cloned().unwrap_or_default();
        history.reverse(); // newest first
        Ok(history)
    }
}
