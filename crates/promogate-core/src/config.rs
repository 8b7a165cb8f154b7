//! Configuration loading.
//!
//! A TOML file supplies the model name, the per-edge policy table and the
//! deployment settings. `PROMOGATE_*` environment variables override single
//! values; registry credentials normally come only from the environment.
//!
//! ```toml
//! model_name = "temperature_predictor"
//!
//! [policies.feature_to_dev]
//! required_checks = ["lint", "unittests"]
//!
//! [policies.dev_to_test.metrics.rmse]
//! direction = "lower_is_better"
//! tolerance = 0.05
//!
//! [policies.test_to_master]
//!
//! [deploy]
//! health_endpoint = "http://localhost:8000/health"
//! verification_timeout_ms = 120000
//! probe_interval_ms = 5000
//!
//! [deploy.publish]
//! max_attempts = 3
//! backoff_base_ms = 500
//! backoff_cap_ms = 8000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::RegistryCredentials;
use crate::deploy::RetryPolicy;
use crate::domain::{PolicySet, PromotionError, Result};

/// Upper bound on config file size.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

pub const ENV_REGISTRY_USERNAME: &str = "PROMOGATE_REGISTRY_USERNAME";
pub const ENV_REGISTRY_PASSWORD: &str = "PROMOGATE_REGISTRY_PASSWORD";
pub const ENV_HEALTH_ENDPOINT: &str = "PROMOGATE_HEALTH_ENDPOINT";
pub const ENV_VERIFICATION_TIMEOUT_MS: &str = "PROMOGATE_VERIFICATION_TIMEOUT_MS";
pub const ENV_PUBLISH_MAX_ATTEMPTS: &str = "PROMOGATE_PUBLISH_MAX_ATTEMPTS";
pub const ENV_PUBLISH_BACKOFF_BASE_MS: &str = "PROMOGATE_PUBLISH_BACKOFF_BASE_MS";
pub const ENV_MODEL_NAME: &str = "PROMOGATE_MODEL_NAME";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub health_endpoint: String,
    pub verification_timeout_ms: u64,
    pub probe_interval_ms: u64,
    pub publish: RetryPolicy,
    #[serde(skip_serializing)]
    pub credentials: Option<RegistryCredentials>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            health_endpoint: "http://localhost:8000/health".to_string(),
            verification_timeout_ms: 120_000,
            probe_interval_ms: 5_000,
            publish: RetryPolicy::default(),
            credentials: None,
        }
    }
}

impl DeployConfig {
    pub fn with_credentials(mut self, credentials: RegistryCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.health_endpoint.trim().is_empty() {
            return Err(config_err("deploy.health_endpoint must not be empty"));
        }
        if self.verification_timeout_ms == 0 {
            return Err(config_err("deploy.verification_timeout_ms must be > 0"));
        }
        if self.probe_interval_ms == 0 {
            return Err(config_err("deploy.probe_interval_ms must be > 0"));
        }
        if self.publish.max_attempts == 0 {
            return Err(config_err("deploy.publish.max_attempts must be >= 1"));
        }
        if self.publish.backoff_cap_ms < self.publish.backoff_base_ms {
            return Err(config_err(
                "deploy.publish.backoff_cap_ms must be >= deploy.publish.backoff_base_ms",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Registered model name the dev → test gate compares.
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub policies: PolicySet,
    #[serde(default)]
    pub deploy: DeployConfig,
}

fn config_err(message: impl Into<String>) -> PromotionError {
    PromotionError::Config(message.into())
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| config_err(format!("{key}={raw:?}: {e}")))
}

/// Read a config file, refusing anything over the size limit.
pub fn read_config_file(path: &Path) -> Result<String> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(config_err(format!(
            "{} exceeds the {MAX_CONFIG_FILE_SIZE} byte limit",
            path.display()
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}

impl PromotionConfig {
    /// Parse without env overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| config_err(format!("invalid config: {e}")))
    }

    /// Read `path`, apply process environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_config_file(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply `PROMOGATE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_MODEL_NAME) {
            self.model_name = name;
        }
        if let Some(endpoint) = lookup(ENV_HEALTH_ENDPOINT) {
            self.deploy.health_endpoint = endpoint;
        }
        if let Some(raw) = lookup(ENV_VERIFICATION_TIMEOUT_MS) {
            self.deploy.verification_timeout_ms = parse_env(ENV_VERIFICATION_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PUBLISH_MAX_ATTEMPTS) {
            self.deploy.publish.max_attempts = parse_env(ENV_PUBLISH_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PUBLISH_BACKOFF_BASE_MS) {
            self.deploy.publish.backoff_base_ms = parse_env(ENV_PUBLISH_BACKOFF_BASE_MS, &raw)?;
        }
        match (lookup(ENV_REGISTRY_USERNAME), lookup(ENV_REGISTRY_PASSWORD)) {
            (Some(username), Some(password)) => {
                self.deploy.credentials = Some(RegistryCredentials::new(username, password));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(config_err(format!(
                    "{ENV_REGISTRY_USERNAME} and {ENV_REGISTRY_PASSWORD} must be set together"
                )));
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Reject values no evaluation could succeed with. Missing credentials
    /// are not an error here; the deployment gate reports them.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(config_err(format!(
                "model_name must be set (in the config file or {ENV_MODEL_NAME})"
            )));
        }
        self.policies.validate()?;
        self.deploy.validate()
    }

    pub fn credentials_configured(&self) -> bool {
        self.deploy.credentials.is_some()
    }
}
