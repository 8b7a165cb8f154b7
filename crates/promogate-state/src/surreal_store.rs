//! SurrealDB-backed `PromotionLog` and `DeploymentRegistry`.
//!
//! Rows use local schema structs and are converted to the `storage_traits`
//! types at the boundary. Record payloads are stored as canonical JSON text
//! so they come back exactly as hashed. Sequence numbers are assigned under a per-table
//! writer lock so concurrent appends from one process never collide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::debug;

use crate::connection;
use crate::error::StorageError;
use crate::storage_traits::{
    canonical_json, ContentDigest, DeploymentEntry, DeploymentRecord, DeploymentRegistry,
    PromotionLog, RecordEntry, StorageResult, StoredRecord,
};

const RECORDS_TABLE: &str = "promotion_records";
const DEPLOYMENTS_TABLE: &str = "deployments";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordRow {
    seq: u64,
    request_id: String,
    transition: String,
    outcome: String,
    digest: String,
    payload: String,
    recorded_at: String,
}

impl RecordRow {
    fn into_stored(self) -> StorageResult<StoredRecord> {
        Ok(StoredRecord {
            seq: self.seq,
            request_id: self.request_id,
            transition: self.transition,
            outcome: self.outcome,
            digest: ContentDigest::try_from(self.digest)?,
            payload: serde_json::from_str(&self.payload).map_err(|e| {
                StorageError::Corrupt(format!("record {} payload is not JSON: {e}", self.seq))
            })?,
            recorded_at: parse_timestamp(&self.recorded_at)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeploymentRow {
    seq: u64,
    stage: String,
    artifact: String,
    published_ref: String,
    request_id: String,
    deployed_at: String,
}

impl DeploymentRow {
    fn into_record(self) -> StorageResult<DeploymentRecord> {
        Ok(DeploymentRecord {
            seq: self.seq,
            stage: self.stage,
            artifact: self.artifact,
            published_ref: self.published_ref,
            request_id: self.request_id,
            deployed_at: parse_timestamp(&self.deployed_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SeqRow {
    seq: u64,
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed promotion store.
pub struct SurrealPromotionStore {
    db: Surreal<Any>,
    record_writer: Mutex<()>,
    deployment_writer: Mutex<()>,
}

impl SurrealPromotionStore {
    /// Wrap an already-connected database handle.
    pub fn new(db: Surreal<Any>) -> Self {
        Self {
            db,
            record_writer: Mutex::new(()),
            deployment_writer: Mutex::new(()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_url("mem://").await?))
    }

    /// Connect to an engine URL such as `surrealkv://.promogate/db`.
    pub async fn connect(url: &str) -> crate::Result<Self> {
        Ok(Self::new(connection::connect_url(url).await?))
    }

    /// Connect using the environment (see [`connection::connect_from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(connection::connect_from_env().await?))
    }

    async fn last_seq(&self, table: &'static str) -> StorageResult<u64> {
        let sql = format!("SELECT seq FROM {table} ORDER BY seq DESC LIMIT 1");
        let mut res = self.db.query(sql).await.map_err(backend)?;
        let rows: Vec<SeqRow> = res.take(0).map_err(backend)?;
        Ok(rows.first().map(|r| r.seq).unwrap_or(0))
    }
}

#[async_trait]
impl PromotionLog for SurrealPromotionStore {
    async fn append(&self, entry: RecordEntry) -> StorageResult<StoredRecord> {
        let _writer = self.record_writer.lock().await;
        let seq = self.last_seq(RECORDS_TABLE).await? + 1;
        let payload = serde_json::to_string(&canonical_json(&entry.payload))
            .map_err(|e| StorageError::Corrupt(format!("payload not serializable: {e}")))?;
        let row = RecordRow {
            seq,
            request_id: entry.request_id,
            transition: entry.transition,
            outcome: entry.outcome,
            digest: entry.digest.as_str().to_string(),
            payload,
            recorded_at: Utc::now().to_rfc3339(),
        };

        debug!(seq, request_id = %row.request_id, "appending promotion record");

        let created: Option<RecordRow> = self
            .db
            .create(RECORDS_TABLE)
            .content(row)
            .await
            .map_err(backend)?;

        created
            .ok_or_else(|| StorageError::Backend("failed to create promotion record".to_string()))?
            .into_stored()
    }

    async fn records_for(&self, request_id: &str) -> StorageResult<Vec<StoredRecord>> {
        let rid = request_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM promotion_records WHERE request_id = $rid ORDER BY seq ASC")
            .bind(("rid", rid))
            .await
            .map_err(backend)?;
        let rows: Vec<RecordRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(RecordRow::into_stored).collect()
    }

    async fn list(&self) -> StorageResult<Vec<StoredRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM promotion_records ORDER BY seq ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<RecordRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(RecordRow::into_stored).collect()
    }
}

#[async_trait]
impl DeploymentRegistry for SurrealPromotionStore {
    async fn record(&self, entry: DeploymentEntry) -> StorageResult<DeploymentRecord> {
        let _writer = self.deployment_writer.lock().await;
        let seq = self.last_seq(DEPLOYMENTS_TABLE).await? + 1;
        let row = DeploymentRow {
            seq,
            stage: entry.stage,
            artifact: entry.artifact,
            published_ref: entry.published_ref,
            request_id: entry.request_id,
            deployed_at: Utc::now().to_rfc3339(),
        };

        let created: Option<DeploymentRow> = self
            .db
            .create(DEPLOYMENTS_TABLE)
            .content(row)
            .await
            .map_err(backend)?;

        created
            .ok_or_else(|| StorageError::Backend("failed to create deployment record".to_string()))?
            .into_record()
    }

    async fn current(&self, stage: &str) -> StorageResult<Option<DeploymentRecord>> {
        Ok(self.history(stage).await?.into_iter().next())
    }

    async fn history(&self, stage: &str) -> StorageResult<Vec<DeploymentRecord>> {
        let stage_owned = stage.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM deployments WHERE stage = $stage ORDER BY seq DESC")
            .bind(("stage", stage_owned))
            .await
            .map_err(backend)?;
        let rows: Vec<DeploymentRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(DeploymentRow::into_record).collect()
    }
}
