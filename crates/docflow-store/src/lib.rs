//! Progress store for the document-generation pipeline.
//!
//! One durable record per session tracks which stages have generated
//! artifacts, plus start/completion timestamps and the most recent failure.
//! All mutation goes through the [`ProgressStore`] trait; the orchestrator
//! is its only writer. Records are never deleted; they double as the audit
//! trail and as the cache serving later downloads.
//!
//! Two implementations: [`FsProgressStore`] (JSON record + one artifact file
//! per stage, all writes atomic) and [`MemoryStore`] (for tests and
//! embedding).

mod fs;
mod memory;

pub use fs::FsProgressStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use docflow_utils::{SessionId, SessionRecord, Stage};

/// Upper bound on the persisted `last_error` detail.
pub(crate) const MAX_ERROR_DETAIL_LEN: usize = 1024;

/// Progress store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The questionnaire record does not exist. Fatal, never retried.
    #[error("no generation record found for session '{id}'")]
    NotFound { id: String },

    /// A generated stage must always have non-empty artifact bytes.
    #[error("refusing to store empty artifact for stage {stage} of session '{id}'")]
    EmptyArtifact { id: String, stage: Stage },

    #[error("corrupt generation record for session '{id}': {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("invalid state transition for session '{id}': {reason}")]
    InvalidState { id: String, reason: String },

    #[error("storage failure for session '{id}': {reason}")]
    Storage { id: String, reason: String },
}

/// Durable per-session record of generation state and artifacts.
///
/// Contract notes:
/// - `mark_started` is idempotent and never clears `started_at` (resume,
///   not restart); it does clear the failure fields for the new attempt.
/// - `mark_stage_complete` stores the artifact bytes exactly once and only
///   then flips the stage flag, so `generated == true` implies the artifact
///   is durably present and non-empty.
/// - `mark_failed` records that a run ended without completion, which is
///   distinct from "never started".
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Read the record. `StoreError::NotFound` when the session is unknown.
    async fn fetch(&self, session_id: &SessionId) -> Result<SessionRecord, StoreError>;

    /// Create an empty record. Idempotent; called when the questionnaire is
    /// finalized (an external collaborator in production, tests here).
    async fn create(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Set `started`/`started_at` if absent and clear any recorded failure.
    async fn mark_started(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Durably store `artifact` for `stage` and set its generated flag.
    async fn mark_stage_complete(
        &self,
        session_id: &SessionId,
        stage: Stage,
        artifact: &[u8],
    ) -> Result<(), StoreError>;

    /// Set `completed`/`completed_at`. All three stages must be generated.
    async fn mark_all_complete(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// Record that the run stopped at `stage` without completing.
    async fn mark_failed(
        &self,
        session_id: &SessionId,
        stage: Stage,
        detail: &str,
    ) -> Result<(), StoreError>;

    /// Read stored artifact bytes for `stage`, if generated yet.
    async fn load_artifact(
        &self,
        session_id: &SessionId,
        stage: Stage,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

pub(crate) fn truncate_detail(detail: &str) -> String {
    if detail.len() <= MAX_ERROR_DETAIL_LEN {
        return detail.to_string();
    }
    let mut end = MAX_ERROR_DETAIL_LEN;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    detail[..end].to_string()
}
