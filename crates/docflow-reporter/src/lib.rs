//! Best-effort failure alerting.
//!
//! When a generation run stops at a stage, the orchestrator hands the
//! failure to a [`FailureReporter`], which formats an alert (session id,
//! stage, error detail) and forwards it to the alerting collaborator. The
//! reporter is strictly best-effort: a failure to deliver is logged and
//! swallowed so it can never mask or replace the original error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use docflow_utils::{SessionId, Stage};

/// Alert payload forwarded to the alerting collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailureAlert {
    pub session_id: String,
    pub stage: Stage,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// Delivery failures. Only ever observed by the reporter itself.
#[derive(Debug, thiserror::Error)]
pub enum ReporterError {
    #[error("transport failure delivering alert: {reason}")]
    Transport { reason: String },

    #[error("alert endpoint returned status {status}")]
    UpstreamStatus { status: u16 },
}

/// Destination for stage failure alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &StageFailureAlert) -> Result<(), ReporterError>;
}

/// Sink that posts alerts as JSON to a webhook URL.
#[derive(Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: &StageFailureAlert) -> Result<(), ReporterError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| ReporterError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReporterError::UpstreamStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Sink for deployments without an alert channel configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl AlertSink for NoopSink {
    async fn deliver(&self, _alert: &StageFailureAlert) -> Result<(), ReporterError> {
        Ok(())
    }
}

/// Forwards orchestrator failures to the alert channel, best-effort.
#[derive(Clone)]
pub struct FailureReporter {
    sink: Arc<dyn AlertSink>,
}

impl FailureReporter {
    #[must_use]
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Report a stage failure. Never fails: sink errors are logged at warn
    /// and discarded.
    pub async fn report(&self, session_id: &SessionId, stage: Stage, detail: &str) {
        let alert = StageFailureAlert {
            session_id: session_id.to_string(),
            stage,
            detail: detail.to_string(),
            occurred_at: Utc::now(),
        };

        match self.sink.deliver(&alert).await {
            Ok(()) => {
                debug!(session_id = %session_id, stage = %stage, "stage failure alert delivered");
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    stage = %stage,
                    error = %e,
                    "failed to deliver stage failure alert"
                );
            }
        }
    }
}

impl std::fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureReporter").finish_non_exhaustive()
    }
}
