//! HTTP-backed collaborators: the serving API's health endpoint and a model
//! metrics registry.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::collaborators::{HealthProbe, MetricsError, MetricsRegistry, ProbeStatus};
use crate::domain::{CandidateRef, MetricsSnapshot, PromotionError, Result, SnapshotRole};

const USER_AGENT: &str = concat!("promogate/", env!("CARGO_PKG_VERSION"));

/// Longest body excerpt kept in an `Unhealthy` detail.
const BODY_EXCERPT_LEN: usize = 200;

fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| PromotionError::Config(format!("failed to create HTTP client: {e}")))
}

fn excerpt(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Map a health response to a probe status. Any 2xx is healthy; the serving
/// API answers 503 until a model is loaded.
pub fn classify_health(status: StatusCode, body: &str) -> ProbeStatus {
    if status.is_success() {
        ProbeStatus::Healthy
    } else {
        let body = excerpt(body);
        if body.is_empty() {
            ProbeStatus::Unhealthy(format!("HTTP {}", status.as_u16()))
        } else {
            ProbeStatus::Unhealthy(format!("HTTP {}: {body}", status.as_u16()))
        }
    }
}

/// `GET <endpoint>` health probe.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    /// `request_timeout` bounds each probe; keep it at or below the probe
    /// interval.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: client(request_timeout)?,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, endpoint: &str) -> ProbeStatus {
        let response = match self.http.get(endpoint).send().await {
            Ok(response) => response,
            Err(err) => return ProbeStatus::Unreachable(err.to_string()),
        };
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let result = classify_health(status, &body);
        debug!(endpoint = %endpoint, status = status.as_u16(), healthy = result.is_healthy(), "health probe");
        result
    }
}

#[derive(Debug, Deserialize)]
struct MetricsBody {
    model_ref: String,
    #[serde(default)]
    metrics: BTreeMap<String, f64>,
}

/// Metrics registry served over HTTP:
///
/// - `GET <base>/models/<name>/baseline`
/// - `GET <base>/models/<name>/candidates/<candidate>`
///
/// Both return `{"model_ref": "...", "metrics": {"<metric>": <number>}}`.
#[derive(Debug, Clone)]
pub struct HttpMetricsRegistry {
    base: Url,
    http: reqwest::Client,
}

impl HttpMetricsRegistry {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| PromotionError::Config(format!("invalid metrics_url {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(PromotionError::Config(format!(
                "metrics_url {base_url:?} cannot be used as a base URL"
            )));
        }
        Ok(Self {
            base,
            http: client(request_timeout)?,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn baseline_url(&self, model_name: &str) -> Url {
        self.url(&["models", model_name, "baseline"])
    }

    pub fn candidate_url(&self, model_name: &str, candidate: &CandidateRef) -> Url {
        self.url(&["models", model_name, "candidates", candidate.as_str()])
    }

    async fn fetch(&self, url: Url, role: SnapshotRole) -> std::result::Result<MetricsSnapshot, MetricsError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetricsError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(MetricsError::Unavailable(format!("{url} returned HTTP {}", status.as_u16())));
        }

        let body: MetricsBody = response
            .json()
            .await
            .map_err(|e| MetricsError::Unavailable(format!("malformed metrics from {url}: {e}")))?;
        Ok(MetricsSnapshot {
            model_ref: body.model_ref,
            role,
            metrics: body.metrics,
        })
    }
}

#[async_trait]
impl MetricsRegistry for HttpMetricsRegistry {
    async fn fetch_baseline(&self, model_name: &str) -> std::result::Result<MetricsSnapshot, MetricsError> {
        self.fetch(self.baseline_url(model_name), SnapshotRole::Baseline).await
    }

    async fn fetch_candidate(
        &self,
        model_name: &str,
        candidate: &CandidateRef,
    ) -> std::result::Result<MetricsSnapshot, MetricsError> {
        self.fetch(self.candidate_url(model_name, candidate), SnapshotRole::Candidate)
            .await
    }
}
