//! Filesystem-backed progress store.
//!
//! Layout under the injected root:
//!
//! ```text
//! <root>/sessions/<session_id>/record.json
//! <root>/sessions/<session_id>/artifacts/<stage>.bin
//! ```
//!
//! Artifact bytes are stored exactly once, as a file; `record.json` carries
//! only the flags, timestamps and per-stage artifact descriptors (BLAKE3 +
//! length). Every write goes through the atomic temp-file + rename path.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::fs;
use std::io;
use tracing::debug;

use docflow_utils::{ArtifactMeta, SessionId, SessionRecord, Stage, write_bytes_atomic};

use crate::{ProgressStore, StoreError, truncate_detail};

/// Progress store persisting records and artifacts under a root directory.
#[derive(Debug, Clone)]
pub struct FsProgressStore {
    root: Utf8PathBuf,
}

impl FsProgressStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &SessionId) -> Utf8PathBuf {
        self.root.join("sessions").join(session_id.as_str())
    }

    fn record_path(&self, session_id: &SessionId) -> Utf8PathBuf {
        self.session_dir(session_id).join("record.json")
    }

    fn artifact_path(&self, session_id: &SessionId, stage: Stage) -> Utf8PathBuf {
        self.session_dir(session_id)
            .join("artifacts")
            .join(format!("{}.bin", stage.as_str()))
    }

    fn load_record(&self, session_id: &SessionId) -> Result<SessionRecord, StoreError> {
        let path = self.record_path(session_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    id: session_id.to_string(),
                });
            }
            Err(e) => {
                return Err(StoreError::Storage {
                    id: session_id.to_string(),
                    reason: format!("failed to read {path}: {e}"),
                });
            }
        };

        serde_json::from_str(&content).map_err(|e| StoreError::CorruptRecord {
            id: session_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn store_record(
        &self,
        session_id: &SessionId,
        record: &SessionRecord,
    ) -> Result<(), StoreError> {
        let path = self.record_path(session_id);
        let json = serde_json::to_string_pretty(record).map_err(|e| StoreError::Storage {
            id: session_id.to_string(),
            reason: format!("failed to serialize record: {e}"),
        })?;

        write_bytes_atomic(&path, json.as_bytes()).map_err(|e| StoreError::Storage {
            id: session_id.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn store_artifact(
        &self,
        session_id: &SessionId,
        stage: Stage,
        artifact: &[u8],
    ) -> Result<ArtifactMeta, StoreError> {
        let path = self.artifact_path(session_id, stage);
        write_bytes_atomic(&path, artifact).map_err(|e| StoreError::Storage {
            id: session_id.to_string(),
            reason: format!("{e:#}"),
        })?;

        Ok(ArtifactMeta {
            blake3: blake3::hash(artifact).to_hex().to_string(),
            bytes: artifact.len() as u64,
        })
    }

    /// Root directory this store persists under.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

#[async_trait]
impl ProgressStore for FsProgressStore {
    async fn fetch(&self, session_id: &SessionId) -> Result<SessionRecord, StoreError> {
        self.load_record(session_id)
    }

    async fn create(&self, session_id: &SessionId) -> Result<(), StoreError> {
        if self.record_path(session_id).exists() {
            return Ok(());
        }
        self.store_record(session_id, &SessionRecord::default())
    }

    async fn mark_started(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut record = self.load_record(session_id)?;
        if !record.started {
            record.started = true;
            record.started_at = Some(Utc::now());
        }
        // A new attempt supersedes any previously recorded failure.
        record.failed_stage = None;
        record.last_error = None;
        self.store_record(session_id, &record)
    }

    async fn mark_stage_complete(
        &self,
        session_id: &SessionId,
        stage: Stage,
        artifact: &[u8],
    ) -> Result<(), StoreError> {
        if artifact.is_empty() {
            return Err(StoreError::EmptyArtifact {
                id: session_id.to_string(),
                stage,
            });
        }

        let mut record = self.load_record(session_id)?;

        // Artifact first, record second: the generated flag must never be
        // observable without the bytes it vouches for.
        let meta = self.store_artifact(session_id, stage, artifact)?;
        debug!(
            session_id = %session_id,
            stage = %stage,
            bytes = meta.bytes,
            blake3 = %meta.blake3,
            "stored stage artifact"
        );

        record.set_stage_complete(stage, meta);
        self.store_record(session_id, &record)
    }

    async fn mark_all_complete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut record = self.load_record(session_id)?;
        if !record.all_generated() {
            return Err(StoreError::InvalidState {
                id: session_id.to_string(),
                reason: "cannot mark complete before all stages are generated".to_string(),
            });
        }
        if !record.completed {
            record.completed = true;
            record.completed_at = Some(Utc::now());
        }
        self.store_record(session_id, &record)
    }

    async fn mark_failed(
        &self,
        session_id: &SessionId,
        stage: Stage,
        detail: &str,
    ) -> Result<(), StoreError> {
        let mut record = self.load_record(session_id)?;
        record.failed_stage = Some(stage);
        record.last_error = Some(truncate_detail(detail));
        self.store_record(session_id, &record)
    }

    async fn load_artifact(
        &self,
        session_id: &SessionId,
        stage: Stage,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.artifact_path(session_id, stage);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Distinguish "stage not generated yet" from "unknown session".
                self.load_record(session_id)?;
                Ok(None)
            }
            Err(e) => Err(StoreError::Storage {
                id: session_id.to_string(),
                reason: format!("failed to read {path}: {e}"),
            }),
        }
    }
}
