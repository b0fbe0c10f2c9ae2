//! docflow: background document-generation orchestrator.
//!
//! After a questionnaire session is finalized and paid, three dependent
//! documents are produced by a slow external generation service: a personal
//! plan, a session-preparation brief and a clinician-facing summary. This
//! library sequences those stages, persists progress so work is never lost
//! or duplicated, guards against concurrent re-entry per session, and
//! exposes a resumable status protocol over HTTP.
//!
//! The workspace crates are re-exported here as a single facade; the
//! `docflow` binary in `src/main.rs` is a thin wrapper over [`cli::run`].

pub mod cli;

pub use docflow_config::{Config, ConfigError};
pub use docflow_engine::{Orchestrator, OrchestratorError, RunOutcome, StageTimeout};
pub use docflow_generator::{
    GenerationError, HttpStageGenerator, StageGenerator, StageGenerators, build_client,
};
pub use docflow_guard::{Claim, ConcurrencyGuard};
pub use docflow_reporter::{AlertSink, FailureReporter, NoopSink, StageFailureAlert, WebhookSink};
pub use docflow_server::{GenerationService, ServiceError, StatusResponse, router, serve};
pub use docflow_store::{FsProgressStore, MemoryStore, ProgressStore, StoreError};
pub use docflow_utils::{SessionId, SessionIdError, SessionRecord, Stage};
