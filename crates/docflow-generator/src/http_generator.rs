//! HTTP implementation of the stage generator client.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use docflow_utils::{SessionId, Stage};

use crate::{GenerationError, StageGenerator};

/// Upper bound on upstream error detail captured into diagnostics.
const MAX_UPSTREAM_DETAIL_LEN: usize = 512;

/// Build the shared reqwest client for generation calls.
///
/// Only the connect timeout lives here; the per-call deadline is owned by
/// the orchestrator so that one policy bounds every generator
/// implementation.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, GenerationError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| GenerationError::ClientConstruction {
            reason: e.to_string(),
        })
}

/// Request body sent to a sibling generation endpoint.
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    session_id: &'a str,
}

/// Generator for a single stage, calling `POST {base_url}{stage_path}`.
///
/// A success response body is the raw artifact bytes; any non-success status
/// is a stage failure carrying the upstream diagnostic.
#[derive(Clone)]
pub struct HttpStageGenerator {
    client: reqwest::Client,
    base_url: String,
    stage: Stage,
}

impl HttpStageGenerator {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, stage: Stage) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            stage,
        }
    }

    fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url, self.stage.endpoint_path())
    }
}

#[async_trait]
impl StageGenerator for HttpStageGenerator {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn generate(&self, session_id: &SessionId) -> Result<Vec<u8>, GenerationError> {
        let url = self.endpoint_url();
        debug!(
            session_id = %session_id,
            stage = %self.stage,
            url = %url,
            "invoking generation endpoint"
        );

        let response = self
            .client
            .post(&url)
            .json(&GenerationRequest {
                session_id: session_id.as_str(),
            })
            .send()
            .await
            .map_err(|e| GenerationError::Transport {
                stage: self.stage,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::UpstreamStatus {
                stage: self.stage,
                status: status.as_u16(),
                detail: truncate_upstream_detail(&detail),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Transport {
                stage: self.stage,
                reason: e.to_string(),
            })?;

        if bytes.is_empty() {
            return Err(GenerationError::EmptyArtifact { stage: self.stage });
        }

        debug!(
            session_id = %session_id,
            stage = %self.stage,
            bytes = bytes.len(),
            "generation endpoint returned artifact"
        );

        Ok(bytes.to_vec())
    }
}

fn truncate_upstream_detail(detail: &str) -> String {
    let trimmed = detail.trim();
    if trimmed.len() <= MAX_UPSTREAM_DETAIL_LEN {
        return trimmed.to_string();
    }
    let mut end = MAX_UPSTREAM_DETAIL_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_per_stage() {
        let client = reqwest::Client::new();
        let plan = HttpStageGenerator::new(client.clone(), "http://gen.internal", Stage::Plan);
        assert_eq!(plan.endpoint_url(), "http://gen.internal/plan");

        let summary = HttpStageGenerator::new(
            client,
            "http://gen.internal/",
            Stage::ClinicianSummary,
        );
        assert_eq!(
            summary.endpoint_url(),
            "http://gen.internal/clinician-summary"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GenerationRequest {
            session_id: "sess-1",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"session_id": "sess-1"}));
    }

    #[test]
    fn upstream_detail_is_bounded() {
        let long = "e".repeat(MAX_UPSTREAM_DETAIL_LEN * 3);
        assert_eq!(truncate_upstream_detail(&long).len(), MAX_UPSTREAM_DETAIL_LEN);
        assert_eq!(truncate_upstream_detail("  oops \n"), "oops");
    }
}
