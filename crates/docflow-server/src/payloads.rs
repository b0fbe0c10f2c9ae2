//! Wire payloads for the trigger surface.
//!
//! Field names are camelCase on the wire; status values are snake_case
//! strings. These shapes are consumed by the questionnaire front-end and by
//! the external poller, so they are covered by serde tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docflow_utils::{SessionRecord, Stage};

/// Body of `POST /generation/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub session_id: String,
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// A new generation run was launched.
    Started,
    /// A run has started and not yet completed; nothing was launched.
    InProgress,
    /// All documents exist; nothing was launched.
    Completed,
}

/// Pipeline position reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn from_record(record: &SessionRecord) -> Self {
        if record.completed {
            Self::Completed
        } else if record.started {
            Self::InProgress
        } else {
            Self::NotStarted
        }
    }
}

/// Per-stage generated flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFlags {
    pub plan: bool,
    pub preparation: bool,
    pub clinician_summary: bool,
}

impl StageFlags {
    #[must_use]
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            plan: record.plan_generated,
            preparation: record.preparation_generated,
            clinician_summary: record.clinician_summary_generated,
        }
    }
}

/// Response of `POST /generation/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub status: StartStatus,
    pub stages: StageFlags,
}

/// Response of `GET /generation/status/{session_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub stages: StageFlags,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StatusResponse {
    #[must_use]
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            status: SessionStatus::from_record(record),
            stages: StageFlags::from_record(record),
            started_at: record.started_at,
            completed_at: record.completed_at,
            failed_stage: record.failed_stage,
            last_error: record.last_error.clone(),
        }
    }
}
