//! Start/status semantics behind the HTTP handlers.
//!
//! Stage errors never surface here as request failures: the surface always
//! answers with a normal status payload, and failures are observable only
//! through the record's flags and the out-of-band alert channel.

use tracing::{error, info};

use docflow_engine::Orchestrator;
use docflow_store::StoreError;
use docflow_utils::{SessionId, SessionRecord};

use crate::payloads::{StageFlags, StartResponse, StartStatus, StatusResponse};

/// Failures the trigger surface maps onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The questionnaire record does not exist.
    #[error("no generation record for session '{id}'")]
    NotFound { id: String },

    #[error("progress store failure: {reason}")]
    Internal { reason: String },
}

/// The trigger surface: explicit start plus a self-healing status poll.
#[derive(Debug, Clone)]
pub struct GenerationService {
    orchestrator: Orchestrator,
}

impl GenerationService {
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Handle a start request.
    ///
    /// Completed sessions and sessions with a run already underway are
    /// no-ops; only the first invocation marks the record started and
    /// launches the orchestrator, detached from this request.
    pub async fn start(&self, session_id: &SessionId) -> Result<StartResponse, ServiceError> {
        let record = self.fetch(session_id).await?;
        let stages = StageFlags::from_record(&record);

        if record.completed {
            return Ok(StartResponse {
                status: StartStatus::Completed,
                stages,
            });
        }

        if record.started {
            // Starting is only for first invocation; stalled runs are
            // restarted by the status poll, not here.
            return Ok(StartResponse {
                status: StartStatus::InProgress,
                stages,
            });
        }

        // Mark before launching so a repeat start sees in_progress even if
        // the detached run has not been scheduled yet. The run marks again
        // under its claim, which is idempotent.
        self.orchestrator
            .store()
            .mark_started(session_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { id } => ServiceError::NotFound { id },
                e => ServiceError::Internal {
                    reason: e.to_string(),
                },
            })?;

        self.spawn_run(session_id);
        Ok(StartResponse {
            status: StartStatus::Started,
            stages,
        })
    }

    /// Handle a status poll.
    ///
    /// For a session that has started but not completed, attempt to claim
    /// it; a successful claim means no run is active in this process, so the
    /// poll relaunches the orchestrator (self-healing resume). A failed
    /// claim means a run is active and the poll just reports.
    pub async fn status(&self, session_id: &SessionId) -> Result<StatusResponse, ServiceError> {
        let record = self.fetch(session_id).await?;

        if record.started
            && !record.completed
            && let Some(claim) = self.orchestrator.try_claim(session_id)
        {
            info!(session_id = %session_id, "status poll relaunching stalled generation run");
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                let session_id = claim.session_id().clone();
                match orchestrator.run_with_claim(claim).await {
                    Ok(outcome) => {
                        info!(session_id = %session_id, outcome = %outcome, "resumed run finished");
                    }
                    Err(e) => {
                        error!(session_id = %session_id, error = %e, "resumed run aborted");
                    }
                }
            });
        }

        Ok(StatusResponse::from_record(&record))
    }

    fn spawn_run(&self, session_id: &SessionId) {
        let orchestrator = self.orchestrator.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            match orchestrator.run(&session_id).await {
                Ok(outcome) => {
                    info!(session_id = %session_id, outcome = %outcome, "generation run finished");
                }
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "generation run aborted");
                }
            }
        });
    }

    async fn fetch(&self, session_id: &SessionId) -> Result<SessionRecord, ServiceError> {
        match self.orchestrator.store().fetch(session_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound { id }) => Err(ServiceError::NotFound { id }),
            Err(e) => Err(ServiceError::Internal {
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::SessionStatus;
    use async_trait::async_trait;
    use docflow_engine::StageTimeout;
    use docflow_generator::{GenerationError, StageGenerator, StageGenerators};
    use docflow_guard::ConcurrencyGuard;
    use docflow_reporter::{FailureReporter, NoopSink};
    use docflow_store::{MemoryStore, ProgressStore};
    use docflow_utils::Stage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct MockGenerator {
        stage: Stage,
        calls: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl StageGenerator for MockGenerator {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn generate(&self, _session_id: &SessionId) -> Result<Vec<u8>, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(format!("{}-artifact", self.stage.as_str()).into_bytes())
        }
    }

    struct TestBed {
        store: Arc<MemoryStore>,
        service: GenerationService,
        calls: [Arc<AtomicUsize>; 3],
    }

    fn testbed(gate: Option<Arc<Notify>>) -> TestBed {
        let store = Arc::new(MemoryStore::new());
        let calls = [
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        ];

        let generators = StageGenerators::new(
            Arc::new(MockGenerator {
                stage: Stage::Plan,
                calls: Arc::clone(&calls[0]),
                gate: gate.clone(),
            }),
            Arc::new(MockGenerator {
                stage: Stage::Preparation,
                calls: Arc::clone(&calls[1]),
                gate: None,
            }),
            Arc::new(MockGenerator {
                stage: Stage::ClinicianSummary,
                calls: Arc::clone(&calls[2]),
                gate: None,
            }),
        );

        let orchestrator = Orchestrator::new(
            store.clone() as Arc<dyn ProgressStore>,
            generators,
            ConcurrencyGuard::new(),
            FailureReporter::new(Arc::new(NoopSink)),
            StageTimeout {
                duration: Duration::from_secs(30),
            },
        );

        TestBed {
            store,
            service: GenerationService::new(orchestrator),
            calls,
        }
    }

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    async fn wait_for_completion(store: &MemoryStore, id: &SessionId) {
        for _ in 0..400 {
            if store.fetch(id).await.unwrap().completed {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session {id} never completed");
    }

    #[tokio::test]
    async fn start_unknown_session_is_not_found() {
        let bed = testbed(None);
        let err = bed.service.start(&sid("missing")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let err = bed.service.status(&sid("missing")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn start_launches_detached_run_and_is_terminal_after() {
        let bed = testbed(None);
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();

        let response = bed.service.start(&id).await.unwrap();
        assert_eq!(response.status, StartStatus::Started);
        assert!(!response.stages.plan);

        wait_for_completion(&bed.store, &id).await;

        let response = bed.service.start(&id).await.unwrap();
        assert_eq!(response.status, StartStatus::Completed);
        assert!(response.stages.plan && response.stages.preparation);
        assert!(response.stages.clinician_summary);

        // Terminal idempotence: no further generation calls.
        for calls in &bed.calls {
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn repeated_start_never_runs_twice() {
        let gate = Arc::new(Notify::new());
        let bed = testbed(Some(Arc::clone(&gate)));
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();

        let first = bed.service.start(&id).await.unwrap();
        assert_eq!(first.status, StartStatus::Started);

        // Let the detached run reach the (gated) plan generator.
        for _ in 0..200 {
            if bed.calls[0].load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // A second start while the run is active is a no-op.
        let second = bed.service.start(&id).await.unwrap();
        assert_eq!(second.status, StartStatus::InProgress);

        gate.notify_one();
        wait_for_completion(&bed.store, &id).await;
        assert_eq!(bed.calls[0].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_reports_without_launching_for_fresh_sessions() {
        let bed = testbed(None);
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();

        let response = bed.service.status(&id).await.unwrap();
        assert_eq!(response.status, SessionStatus::NotStarted);
        assert!(response.started_at.is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        // A not-started session is never launched by the poller.
        assert_eq!(bed.calls[0].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_relaunches_stalled_run() {
        let bed = testbed(None);
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();

        // A previous process generated the plan, then died mid-pipeline.
        bed.store.mark_started(&id).await.unwrap();
        bed.store
            .mark_stage_complete(&id, Stage::Plan, b"plan-bytes")
            .await
            .unwrap();

        let response = bed.service.status(&id).await.unwrap();
        assert_eq!(response.status, SessionStatus::InProgress);
        assert!(response.stages.plan);
        assert!(!response.stages.preparation);

        wait_for_completion(&bed.store, &id).await;

        // Resume skipped the plan and generated the remaining two stages.
        assert_eq!(bed.calls[0].load(Ordering::SeqCst), 0);
        assert_eq!(bed.calls[1].load(Ordering::SeqCst), 1);
        assert_eq!(bed.calls[2].load(Ordering::SeqCst), 1);

        let response = bed.service.status(&id).await.unwrap();
        assert_eq!(response.status, SessionStatus::Completed);
        assert!(response.completed_at.is_some());
    }

    #[tokio::test]
    async fn status_does_not_relaunch_while_run_is_active() {
        let gate = Arc::new(Notify::new());
        let bed = testbed(Some(Arc::clone(&gate)));
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();

        bed.service.start(&id).await.unwrap();
        for _ in 0..200 {
            if bed.calls[0].load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Poll while the run is blocked inside the plan generator: claim
        // fails, so the poller reports and launches nothing.
        let response = bed.service.status(&id).await.unwrap();
        assert_eq!(response.status, SessionStatus::InProgress);
        assert_eq!(bed.calls[0].load(Ordering::SeqCst), 1);

        gate.notify_one();
        wait_for_completion(&bed.store, &id).await;
        assert_eq!(bed.calls[0].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_of_completed_session_triggers_nothing() {
        let bed = testbed(None);
        let id = sid("sess-1");
        bed.store.create(&id).await.unwrap();
        bed.service.start(&id).await.unwrap();
        wait_for_completion(&bed.store, &id).await;

        let response = bed.service.status(&id).await.unwrap();
        assert_eq!(response.status, SessionStatus::Completed);

        tokio::time::sleep(Duration::from_millis(20)).await;
        for calls in &bed.calls {
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }
}
