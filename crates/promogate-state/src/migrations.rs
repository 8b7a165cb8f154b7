//! SurrealDB schema initialization
//!
//! Defines the promotion record log and the deployment pointer tables.
//! Safe to call on every connection (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all promogate tables.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing promogate schema");
    init_promotion_records_table(db).await?;
    init_deployments_table(db).await?;
    Ok(())
}

/// `promotion_records`
///
/// ```text
/// TABLE promotion_records {
///   seq:          INT (unique, assigned by the writer)
///   request_id:   STRING (indexed)
///   transition:   STRING
///   outcome:      STRING (allow | block)
///   digest:       STRING (sha-256 of canonical payload)
///   payload:      STRING (canonical JSON text)
///   recorded_at:  STRING (RFC 3339)
/// }
/// ```
///
/// Rows are never updated or deleted.
async fn init_promotion_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing promotion_records table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS promotion_records SCHEMALESS
            PERMISSIONS
                FOR select FULL
                FOR create FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_record_seq ON TABLE promotion_records COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_record_request ON TABLE promotion_records COLUMNS request_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// `deployments`
///
/// ```text
/// TABLE deployments {
///   seq:           INT (unique)
///   stage:         STRING (indexed)
///   artifact:      STRING
///   published_ref: STRING
///   request_id:    STRING
///   deployed_at:   STRING (RFC 3339)
/// }
/// ```
async fn init_deployments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing deployments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS deployments SCHEMALESS
            PERMISSIONS
                FOR select FULL
                FOR create FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_deploy_seq ON TABLE deployments COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_deploy_stage ON TABLE deployments COLUMNS stage;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}
