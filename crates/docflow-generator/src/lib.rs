//! Stage generator clients.
//!
//! Each generation stage is produced by a slow, unreliable external service
//! reachable over HTTP. The [`StageGenerator`] trait is the seam the
//! orchestrator drives; [`HttpStageGenerator`] is the production
//! implementation, one instance per stage. Generators have no persistence
//! side effects; storing artifacts is the orchestrator's job.

mod http_generator;

pub use http_generator::{HttpStageGenerator, build_client};

use async_trait::async_trait;
use std::sync::Arc;

use docflow_utils::{SessionId, Stage};

/// Failures from a stage generation call.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The generation endpoint answered with a non-success status.
    #[error("generation endpoint returned status {status} for stage {stage}: {detail}")]
    UpstreamStatus {
        stage: Stage,
        status: u16,
        detail: String,
    },

    /// The call never produced an HTTP response.
    #[error("transport failure calling generation endpoint for stage {stage}: {reason}")]
    Transport { stage: Stage, reason: String },

    /// A success response carrying no bytes is a malformed artifact.
    #[error("generation endpoint returned an empty artifact for stage {stage}")]
    EmptyArtifact { stage: Stage },

    /// The bounded per-stage deadline elapsed. Raised by the orchestrator,
    /// not the client; the client's own connect timeout surfaces as
    /// `Transport`.
    #[error("stage {stage} generation timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("failed to construct generation HTTP client: {reason}")]
    ClientConstruction { reason: String },
}

/// A client that produces the artifact for one stage.
///
/// For the second and third stages the dependency on the previous artifact
/// is resolved by the generation service itself, which reads the previously
/// persisted artifact; the client only ever sends the session id.
#[async_trait]
pub trait StageGenerator: Send + Sync {
    /// The stage this generator produces.
    fn stage(&self) -> Stage;

    /// Generate the artifact for `session_id`, returning the raw bytes.
    async fn generate(&self, session_id: &SessionId) -> Result<Vec<u8>, GenerationError>;
}

/// The three per-stage generators the orchestrator drives, in one bundle.
#[derive(Clone)]
pub struct StageGenerators {
    plan: Arc<dyn StageGenerator>,
    preparation: Arc<dyn StageGenerator>,
    clinician_summary: Arc<dyn StageGenerator>,
}

impl StageGenerators {
    /// Bundle three generators, one per stage, in stage order.
    #[must_use]
    pub fn new(
        plan: Arc<dyn StageGenerator>,
        preparation: Arc<dyn StageGenerator>,
        clinician_summary: Arc<dyn StageGenerator>,
    ) -> Self {
        debug_assert_eq!(plan.stage(), Stage::Plan);
        debug_assert_eq!(preparation.stage(), Stage::Preparation);
        debug_assert_eq!(clinician_summary.stage(), Stage::ClinicianSummary);
        Self {
            plan,
            preparation,
            clinician_summary,
        }
    }

    /// Build HTTP generators for all three stages against one base URL.
    pub fn http(base_url: &str, client: reqwest::Client) -> Self {
        Self::new(
            Arc::new(HttpStageGenerator::new(
                client.clone(),
                base_url,
                Stage::Plan,
            )),
            Arc::new(HttpStageGenerator::new(
                client.clone(),
                base_url,
                Stage::Preparation,
            )),
            Arc::new(HttpStageGenerator::new(
                client,
                base_url,
                Stage::ClinicianSummary,
            )),
        )
    }

    /// The generator for `stage`.
    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> &Arc<dyn StageGenerator> {
        match stage {
            Stage::Plan => &self.plan,
            Stage::Preparation => &self.preparation,
            Stage::ClinicianSummary => &self.clinician_summary,
        }
    }
}

impl std::fmt::Debug for StageGenerators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGenerators")
            .field("stages", &Stage::ALL)
            .finish()
    }
}
