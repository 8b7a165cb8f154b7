//! SurrealDB connection setup.
//!
//! Resolution order used by [`connect_from_env`]:
//! 1. `PROMOGATE_DB_ENDPOINT` + `PROMOGATE_DB_USERNAME` + `PROMOGATE_DB_PASSWORD`
//!    (remote server, signed in as a database or root user)
//! 2. `PROMOGATE_DB_URL` (any engine URL, e.g. `mem://`, `surrealkv://path`)
//! 3. local persistence under `.promogate/db`

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Default local database location.
pub const DEFAULT_LOCAL_PATH: &str = ".promogate/db";

const DEFAULT_NAMESPACE: &str = "promogate";
const DEFAULT_DATABASE: &str = "main";

/// Credentials and location for a remote SurrealDB server.
#[derive(Clone)]
pub struct RemoteConfig {
    /// WebSocket endpoint URL (e.g., "wss://db.example.com")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Whether to sign in as a root user instead of a database user
    pub is_root: bool,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("is_root", &self.is_root)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - PROMOGATE_DB_ENDPOINT (required)
    /// - PROMOGATE_DB_USERNAME (required)
    /// - PROMOGATE_DB_PASSWORD (required)
    /// - PROMOGATE_DB_NAMESPACE (optional, default: "promogate")
    /// - PROMOGATE_DB_DATABASE (optional, default: "main")
    /// - PROMOGATE_DB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint = std::env::var("PROMOGATE_DB_ENDPOINT")
            .map_err(|_| "PROMOGATE_DB_ENDPOINT not set")?;
        let username = std::env::var("PROMOGATE_DB_USERNAME")
            .map_err(|_| "PROMOGATE_DB_USERNAME not set")?;
        let password = std::env::var("PROMOGATE_DB_PASSWORD")
            .map_err(|_| "PROMOGATE_DB_PASSWORD not set")?;
        let namespace = std::env::var("PROMOGATE_DB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database = std::env::var("PROMOGATE_DB_DATABASE")
            .unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("PROMOGATE_DB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Connect to any engine URL, select the default namespace and run migrations.
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    if let Some(path) = url.strip_prefix("surrealkv://") {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
    }

    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!(url = %url, "promotion store connected");
    Ok(db)
}

/// Connect to a remote server and sign in.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace))]
pub async fn connect_remote(config: &RemoteConfig) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!("promotion store connected (remote)");
    Ok(db)
}

/// Connect using the environment resolution order described in the module docs.
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = RemoteConfig::from_env() {
        return connect_remote(&config).await;
    }
    if let Ok(url) = std::env::var("PROMOGATE_DB_URL") {
        return connect_url(&url).await;
    }
    info!(
        "No remote config or PROMOGATE_DB_URL found, using local persistence: {}",
        DEFAULT_LOCAL_PATH
    );
    connect_url(&format!("surrealkv://{}", DEFAULT_LOCAL_PATH)).await
}
