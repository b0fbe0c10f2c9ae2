//! Core types for the document-generation pipeline.
//!
//! The three generation stages are totally ordered because each stage's
//! prompt consumes the previous stage's artifact. The [`SessionRecord`] is
//! the durable per-session progress record; its serde field names are the
//! persisted schema and must not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three ordered document-generation stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Personal plan document, generated first.
    Plan,
    /// Session-preparation brief, consumes the plan artifact.
    Preparation,
    /// Clinician-facing summary, consumes the preparation artifact.
    ClinicianSummary,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 3] = [Self::Plan, Self::Preparation, Self::ClinicianSummary];

    /// Stable kebab-case name, used for artifact file names and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Preparation => "preparation",
            Self::ClinicianSummary => "clinician-summary",
        }
    }

    /// Path segment of the sibling generation endpoint for this stage.
    #[must_use]
    pub const fn endpoint_path(self) -> &'static str {
        match self {
            Self::Plan => "/plan",
            Self::Preparation => "/preparation",
            Self::ClinicianSummary => "/clinician-summary",
        }
    }

    /// The stage whose artifact this stage consumes, if any.
    #[must_use]
    pub const fn dependency(self) -> Option<Self> {
        match self {
            Self::Plan => None,
            Self::Preparation => Some(Self::Plan),
            Self::ClinicianSummary => Some(Self::Preparation),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata recorded for a durably stored artifact.
///
/// The artifact bytes themselves are stored exactly once by the progress
/// store; the record carries only this descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// BLAKE3 hash (hex) of the stored bytes.
    pub blake3: String,
    /// Size of the stored artifact in bytes.
    pub bytes: u64,
}

/// Durable per-session generation record.
///
/// Created with all flags false when the questionnaire is finalized, mutated
/// exclusively by the orchestrator, never deleted. `started_at` is
/// monotonic: once set it is never cleared, so re-running is always resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    pub started: bool,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub plan_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_artifact: Option<ArtifactMeta>,
    pub preparation_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation_artifact: Option<ArtifactMeta>,
    pub clinician_summary_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinician_summary_artifact: Option<ArtifactMeta>,

    /// Stage the most recent run stopped at, if it ended without completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Diagnostic detail for `failed_stage`, for operator visibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SessionRecord {
    /// Whether the artifact for `stage` has been durably stored.
    #[must_use]
    pub fn stage_generated(&self, stage: Stage) -> bool {
        match stage {
            Stage::Plan => self.plan_generated,
            Stage::Preparation => self.preparation_generated,
            Stage::ClinicianSummary => self.clinician_summary_generated,
        }
    }

    /// Artifact metadata for `stage`, if stored.
    #[must_use]
    pub fn artifact_meta(&self, stage: Stage) -> Option<&ArtifactMeta> {
        match stage {
            Stage::Plan => self.plan_artifact.as_ref(),
            Stage::Preparation => self.preparation_artifact.as_ref(),
            Stage::ClinicianSummary => self.clinician_summary_artifact.as_ref(),
        }
    }

    /// Mark `stage` generated and record its artifact descriptor.
    pub fn set_stage_complete(&mut self, stage: Stage, meta: ArtifactMeta) {
        match stage {
            Stage::Plan => {
                self.plan_generated = true;
                self.plan_artifact = Some(meta);
            }
            Stage::Preparation => {
                self.preparation_generated = true;
                self.preparation_artifact = Some(meta);
            }
            Stage::ClinicianSummary => {
                self.clinician_summary_generated = true;
                self.clinician_summary_artifact = Some(meta);
            }
        }
    }

    /// True iff all three stages have been generated.
    #[must_use]
    pub fn all_generated(&self) -> bool {
        Stage::ALL.iter().all(|s| self.stage_generated(*s))
    }

    /// First stage in order that has not been generated yet, if any.
    #[must_use]
    pub fn next_pending_stage(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| !self.stage_generated(*s))
    }
}
