//! Signalling the downstream job once extraction has finished.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;

/// Starts a named downstream unit of work.
#[async_trait]
pub trait DownstreamTrigger: Send + Sync {
    /// Enqueue `successor` with a small metadata payload.
    async fn trigger(&self, successor: &str, payload: &Value) -> Result<()>;
}

/// Payload identifying the stage that just completed.
#[must_use]
pub fn completion_payload(stage_id: &str) -> Value {
    json!({ "parent_task_id": stage_id })
}

/// Signal `successor` through `trigger`, mapping failures into the
/// pipeline taxonomy.
///
/// # Errors
///
/// Returns [`PipelineError::Trigger`] if the downstream job could not be
/// started.
pub async fn signal_successor(
    trigger: &dyn DownstreamTrigger,
    successor: &str,
    stage_id: &str,
) -> Result<(), PipelineError> {
    let payload = completion_payload(stage_id);
    trigger
        .trigger(successor, &payload)
        .await
        .map_err(|source| PipelineError::Trigger {
            successor: successor.to_string(),
            source,
        })
}

/// Trigger that only records the request in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrigger;

#[async_trait]
impl DownstreamTrigger for LogTrigger {
    async fn trigger(&self, successor: &str, payload: &Value) -> Result<()> {
        info!(successor = %successor, payload = %payload, "Downstream trigger not configured, skipping");
        Ok(())
    }
}

/// Trigger that creates a run through an Airflow-style REST API:
/// `POST {base}/api/v1/dags/{successor}/dagRuns` with `{"conf": payload}`.
#[derive(Debug, Clone)]
pub struct HttpTrigger {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTrigger {
    /// Create a trigger posting to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build the trigger configured for this run, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        config
            .trigger_url
            .as_deref()
            .map(|url| Self::new(url, config.trigger_token.clone()))
            .transpose()
    }
}

#[async_trait]
impl DownstreamTrigger for HttpTrigger {
    async fn trigger(&self, successor: &str, payload: &Value) -> Result<()> {
        let url = format!("{}/api/v1/dags/{successor}/dagRuns", self.base_url);

        let mut request = self.client.post(&url).json(&json!({ "conf": payload }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Trigger of {successor} failed with status {}", response.status());
        }

        info!(successor = %successor, "Downstream job triggered");
        Ok(())
    }
}
