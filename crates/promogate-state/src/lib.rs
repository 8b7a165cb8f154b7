//! promogate-state: persistence for the promotion gate engine
//!
//! ## Key Components
//!
//! - `PromotionLog`: append-only audit trail of promotion records
//! - `DeploymentRegistry`: per-stage pointer to the last deployed artifact
//! - `SurrealPromotionStore`: SurrealDB backend implementing both
//! - `fakes`: in-memory implementations for tests

pub mod connection;
mod error;
pub mod fakes;
mod migrations;
pub mod storage_traits;
pub mod surreal_store;

pub use connection::RemoteConfig;
pub use error::{StateError, StorageError};
pub use storage_traits::{
    canonical_json, ContentDigest, DeploymentEntry, DeploymentRecord, DeploymentRegistry,
    PromotionLog, RecordEntry, StorageResult, StoredRecord,
};
pub use surreal_store::SurrealPromotionStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
