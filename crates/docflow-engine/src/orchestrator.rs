//! The generation run state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use docflow_generator::{GenerationError, StageGenerators};
use docflow_guard::{Claim, ConcurrencyGuard};
use docflow_reporter::FailureReporter;
use docflow_store::{ProgressStore, StoreError};
use docflow_utils::{SessionId, SessionRecord, Stage};

/// Per-stage generation deadline with sensible defaults.
///
/// Enforces a minimum so a misconfigured deadline cannot make every stage
/// fail instantly.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeout {
    /// Deadline applied to each stage-generation call.
    pub duration: Duration,
}

impl StageTimeout {
    /// Default deadline in seconds (5 minutes).
    pub const DEFAULT_SECS: u64 = 300;

    /// Minimum deadline in seconds.
    pub const MIN_SECS: u64 = 5;

    /// Create a `StageTimeout` from seconds, clamped to the minimum.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs.max(Self::MIN_SECS)),
        }
    }
}

impl Default for StageTimeout {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}

/// Fatal orchestration failures.
///
/// Everything else (stage errors, timeouts, claim conflicts) is a normal
/// [`RunOutcome`], because the record stays resumable.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The questionnaire record does not exist. Not retried.
    #[error("no questionnaire record for session '{id}'")]
    SessionNotFound { id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a generation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The record was already complete; nothing was invoked.
    AlreadyCompleted,
    /// Another run owns this session; this invocation was a no-op.
    AlreadyRunning,
    /// All three stages are generated and the record is marked complete.
    Completed,
    /// The run stopped at `stage`; the record remains resumable.
    Failed { stage: Stage },
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyCompleted => f.write_str("already_completed"),
            Self::AlreadyRunning => f.write_str("already_running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { stage } => write!(f, "failed at {stage}"),
        }
    }
}

/// Drives the three generation stages in dependency order for one session.
///
/// The orchestrator consults the progress store before and after each
/// stage, claims exclusive execution through the concurrency guard, and
/// reports failures out-of-band. All of its collaborators are shared
/// handles, so the orchestrator itself is cheap to clone into detached
/// tasks.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ProgressStore>,
    generators: StageGenerators,
    guard: Arc<ConcurrencyGuard>,
    reporter: FailureReporter,
    timeout: StageTimeout,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProgressStore>,
        generators: StageGenerators,
        guard: Arc<ConcurrencyGuard>,
        reporter: FailureReporter,
        timeout: StageTimeout,
    ) -> Self {
        Self {
            store,
            generators,
            guard,
            reporter,
            timeout,
        }
    }

    /// The progress store this orchestrator mutates.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    /// Attempt to claim exclusive execution for `session_id`.
    ///
    /// Used by the status poller to claim before launching a self-healing
    /// resume via [`run_with_claim`](Self::run_with_claim).
    #[must_use]
    pub fn try_claim(&self, session_id: &SessionId) -> Option<Claim> {
        self.guard.try_claim(session_id)
    }

    /// Execute (or resume) the generation run for `session_id`.
    ///
    /// Terminal and concurrent invocations are no-ops reported through
    /// [`RunOutcome`]; only a missing record or a record-store failure is an
    /// error.
    pub async fn run(&self, session_id: &SessionId) -> Result<RunOutcome, OrchestratorError> {
        let record = self.fetch(session_id).await?;
        if record.completed {
            debug!(session_id = %session_id, "record already complete, nothing to do");
            return Ok(RunOutcome::AlreadyCompleted);
        }

        let Some(claim) = self.guard.try_claim(session_id) else {
            debug!(session_id = %session_id, "run already active for session");
            return Ok(RunOutcome::AlreadyRunning);
        };

        self.drive(session_id, claim).await
    }

    /// Execute the run with a claim the caller already holds.
    ///
    /// The claim is owned by the run from here on and released on every
    /// exit path.
    pub async fn run_with_claim(&self, claim: Claim) -> Result<RunOutcome, OrchestratorError> {
        let session_id = claim.session_id().clone();
        self.drive(&session_id, claim).await
    }

    async fn drive(
        &self,
        session_id: &SessionId,
        claim: Claim,
    ) -> Result<RunOutcome, OrchestratorError> {
        // Held for the whole run; Drop releases on success, failure and panic.
        let _claim = claim;

        // Re-read under the claim: a run that finished between our first
        // fetch and the claim must be visible here.
        let record = self.fetch(session_id).await?;
        if record.completed {
            return Ok(RunOutcome::AlreadyCompleted);
        }

        self.store.mark_started(session_id).await?;
        info!(
            session_id = %session_id,
            resuming = record.started,
            "generation run started"
        );

        for stage in Stage::ALL {
            if record.stage_generated(stage) {
                debug!(session_id = %session_id, stage = %stage, "stage already generated, skipping");
                continue;
            }

            let stage_start = Instant::now();
            let generated = timeout(
                self.timeout.duration,
                self.generators.for_stage(stage).generate(session_id),
            )
            .await;

            let artifact = match generated {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => {
                    return Ok(self.fail_stage(session_id, stage, &e.to_string()).await);
                }
                Err(_elapsed) => {
                    let e = GenerationError::Timeout {
                        stage,
                        seconds: self.timeout.duration.as_secs(),
                    };
                    return Ok(self.fail_stage(session_id, stage, &e.to_string()).await);
                }
            };

            if let Err(e) = self
                .store
                .mark_stage_complete(session_id, stage, &artifact)
                .await
            {
                error!(
                    session_id = %session_id,
                    stage = %stage,
                    error = %e,
                    "failed to persist stage artifact"
                );
                return Ok(self
                    .fail_stage(session_id, stage, &format!("persistence failure: {e}"))
                    .await);
            }

            info!(
                session_id = %session_id,
                stage = %stage,
                duration_ms = stage_start.elapsed().as_millis() as u64,
                bytes = artifact.len(),
                "stage generated"
            );
        }

        if let Err(e) = self.store.mark_all_complete(session_id).await {
            error!(
                session_id = %session_id,
                error = %e,
                "failed to mark record complete"
            );
            return Ok(self
                .fail_stage(
                    session_id,
                    Stage::ClinicianSummary,
                    &format!("persistence failure: {e}"),
                )
                .await);
        }

        info!(session_id = %session_id, "generation run completed");
        Ok(RunOutcome::Completed)
    }

    /// Stop the run at `stage`: record the failure durably (best-effort) and
    /// alert the operators (best-effort). Later stages are never attempted:
    /// each consumes its predecessor's artifact, so skipping ahead is
    /// meaningless.
    async fn fail_stage(&self, session_id: &SessionId, stage: Stage, detail: &str) -> RunOutcome {
        warn!(
            session_id = %session_id,
            stage = %stage,
            detail = %detail,
            "generation run stopped"
        );

        if let Err(e) = self.store.mark_failed(session_id, stage, detail).await {
            error!(
                session_id = %session_id,
                stage = %stage,
                error = %e,
                "failed to record run failure"
            );
        }

        self.reporter.report(session_id, stage, detail).await;
        RunOutcome::Failed { stage }
    }

    async fn fetch(&self, session_id: &SessionId) -> Result<SessionRecord, OrchestratorError> {
        match self.store.fetch(session_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound { id }) => Err(OrchestratorError::SessionNotFound { id }),
            Err(e) => Err(OrchestratorError::Store(e)),
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
