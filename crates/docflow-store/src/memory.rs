//! In-memory progress store for tests and embedding.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use docflow_utils::{ArtifactMeta, SessionId, SessionRecord, Stage};

use crate::{ProgressStore, StoreError, truncate_detail};

#[derive(Debug, Default)]
struct Entry {
    record: SessionRecord,
    artifacts: HashMap<Stage, Vec<u8>>,
}

/// Mutex-backed [`ProgressStore`] with the same semantics as the filesystem
/// implementation. Not durable; intended for tests and in-process embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut Entry) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound {
                id: session_id.to_string(),
            })?;
        f(entry)
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn fetch(&self, session_id: &SessionId) -> Result<SessionRecord, StoreError> {
        self.with_entry(session_id, |entry| Ok(entry.record.clone()))
    }

    async fn create(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id.clone())
            .or_default();
        Ok(())
    }

    async fn mark_started(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.with_entry(session_id, |entry| {
            if !entry.record.started {
                entry.record.started = true;
                entry.record.started_at = Some(Utc::now());
            }
            entry.record.failed_stage = None;
            entry.record.last_error = None;
            Ok(())
        })
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
        self.with_entry(session_id, |entry| {
            entry.artifacts.insert(stage, artifact.to_vec());
            entry.record.set_stage_complete(
                stage,
                ArtifactMeta {
                    blake3: blake3::hash(artifact).to_hex().to_string(),
                    bytes: artifact.len() as u64,
                },
            );
            Ok(())
        })
    }

    async fn mark_all_complete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.with_entry(session_id, |entry| {
            if !entry.record.all_generated() {
                return Err(StoreError::InvalidState {
                    id: session_id.to_string(),
                    reason: "cannot mark complete before all stages are generated".to_string(),
                });
            }
            if !entry.record.completed {
                entry.record.completed = true;
                entry.record.completed_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    async fn mark_failed(
        &self,
        session_id: &SessionId,
        stage: Stage,
        detail: &str,
    ) -> Result<(), StoreError> {
        self.with_entry(session_id, |entry| {
            entry.record.failed_stage = Some(stage);
            entry.record.last_error = Some(truncate_detail(detail));
            Ok(())
        })
    }

    async fn load_artifact(
        &self,
        session_id: &SessionId,
        stage: Stage,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_entry(session_id, |entry| Ok(entry.artifacts.get(&stage).cloned()))
    }
}
