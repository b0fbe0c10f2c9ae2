//! Orchestration engine for the three-stage document-generation pipeline.
//!
//! This crate wires the progress store, per-stage generator clients,
//! concurrency guard and failure reporter into the state machine that
//! drives a session from `NOT_STARTED` to `COMPLETED`:
//!
//! ```text
//! NOT_STARTED → STARTED → plan → preparation → clinician summary = COMPLETED
//! ```
//!
//! with an absorbing failure state recorded durably when a run stops
//! mid-pipeline. Runs are resumable: already-generated stages are skipped,
//! never regenerated.

mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorError, RunOutcome, StageTimeout};
