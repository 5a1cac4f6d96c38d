// src/persist/store.rs
//! Typed gateway to the backing table-and-object store. Operations are
//! fire-once: the caller logs failures and decides whether to continue.

use serde::Serialize;
use serde_json::Value;

use crate::core::error::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Streaming,
    Processing,
    Done,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Streaming => "streaming",
            SessionStatus::Processing => "processing",
            SessionStatus::Done => "done",
            SessionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingRow {
    pub org_id: String,
    pub session_id: String,
    pub modality: String,
    pub valve_position: Option<String>,
    pub sample_rate_hz: u32,
    pub duration_sec: f64,
    pub storage_path: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub org_id: String,
    pub session_id: String,
    pub modality: String,
    pub model_name: String,
    pub model_version: String,
    pub preprocessing_version: String,
    pub output_json: Value,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityRow {
    pub org_id: String,
    pub session_id: String,
    pub model_version: String,
    pub preprocessing_version: String,
    pub location_json: Value,
    pub timing_json: Value,
    pub shape_json: Value,
    pub grading_json: Value,
    pub pitch_json: Value,
    pub quality_json: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub org_id: String,
    pub user_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub metadata: Value,
}

pub trait PersistStore: Send + Sync {
    fn get_session(&self, session_id: &str) -> Result<Option<Value>, PersistError>;

    fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: Option<&str>,
    ) -> Result<(), PersistError>;

    fn update_device_last_seen(&self, device_id: &str, seen_at: &str) -> Result<(), PersistError>;

    fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), PersistError>;

    fn create_recording(&self, row: &RecordingRow) -> Result<String, PersistError>;

    fn create_prediction(&self, row: &PredictionRow) -> Result<String, PersistError>;

    fn create_murmur_severity(&self, row: &SeverityRow) -> Result<String, PersistError>;

    fn create_live_metrics(
        &self,
        org_id: &str,
        session_id: &str,
        metrics: &Value,
    ) -> Result<(), PersistError>;

    fn create_audit_log(&self, entry: &AuditEntry) -> Result<(), PersistError>;
}
