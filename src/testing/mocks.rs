// src/testing/mocks.rs
//! In-memory store, fixed-output models, and message builders for tests.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use ndarray::Array2;
use serde_json::{json, Value};

use crate::codecs::encode_i16le;
use crate::core::error::PersistError;
use crate::inference::model::{EcgModel, PcgModel, SeverityModel};
use crate::persist::store::{
    AuditEntry, PersistStore, PredictionRow, RecordingRow, SessionStatus, SeverityRow,
};

// ------------------------------------------------------------
// Store
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    statuses: Vec<(String, SessionStatus, Option<String>)>,
    device_seen: Vec<(String, String)>,
    uploads: Vec<UploadRecord>,
    recordings: Vec<RecordingRow>,
    predictions: Vec<PredictionRow>,
    severities: Vec<SeverityRow>,
    live_metrics: Vec<(String, String, Value)>,
    audits: Vec<AuditEntry>,
}

/// Records every gateway call; individual operations can be failed to
/// exercise the error paths.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    pub fail_uploads: AtomicBool,
    pub fail_recordings: AtomicBool,
    pub fail_predictions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn failed(flag: &AtomicBool, context: &str) -> Result<(), PersistError> {
        if flag.load(Ordering::Relaxed) {
            return Err(PersistError::Status {
                context: context.to_string(),
                status: 500,
            });
        }
        Ok(())
    }

    pub fn statuses(&self) -> Vec<(String, SessionStatus, Option<String>)> {
        self.inner.lock().unwrap().statuses.clone()
    }

    pub fn statuses_for(&self, session_id: &str) -> Vec<SessionStatus> {
        self.inner
            .lock()
            .unwrap()
            .statuses
            .iter()
            .filter(|(sid, _, _)| sid == session_id)
            .map(|(_, status, _)| *status)
            .collect()
    }

    pub fn device_seen(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().device_seen.clone()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.inner.lock().unwrap().uploads.clone()
    }

    pub fn recordings(&self) -> Vec<RecordingRow> {
        self.inner.lock().unwrap().recordings.clone()
    }

    pub fn predictions(&self) -> Vec<PredictionRow> {
        self.inner.lock().unwrap().predictions.clone()
    }

    pub fn severities(&self) -> Vec<SeverityRow> {
        self.inner.lock().unwrap().severities.clone()
    }

    pub fn live_metrics(&self) -> Vec<(String, String, Value)> {
        self.inner.lock().unwrap().live_metrics.clone()
    }

    pub fn audits(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().audits.clone()
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .audits
            .iter()
            .map(|a| a.action.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.statuses.len()
            + inner.device_seen.len()
            + inner.uploads.len()
            + inner.recordings.len()
            + inner.predictions.len()
            + inner.severities.len()
            + inner.live_metrics.len()
            + inner.audits.len()
    }
}

impl PersistStore for MemoryStore {
    fn get_session(&self, session_id: &str) -> Result<Option<Value>, PersistError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .statuses
            .iter()
            .rev()
            .find(|(sid, _, _)| sid == session_id)
            .map(|(sid, status, ended_at)| {
                json!({ "id": sid, "status": status.as_str(), "ended_at": ended_at })
            }))
    }

    fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: Option<&str>,
    ) -> Result<(), PersistError> {
        self.inner.lock().unwrap().statuses.push((
            session_id.to_string(),
            status,
            ended_at.map(str::to_string),
        ));
        Ok(())
    }

    fn update_device_last_seen(&self, device_id: &str, seen_at: &str) -> Result<(), PersistError> {
        self.inner
            .lock()
            .unwrap()
            .device_seen
            .push((device_id.to_string(), seen_at.to_string()));
        Ok(())
    }

    fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), PersistError> {
        Self::failed(&self.fail_uploads, "upload")?;
        self.inner.lock().unwrap().uploads.push(UploadRecord {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: content_type.to_string(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn create_recording(&self, row: &RecordingRow) -> Result<String, PersistError> {
        Self::failed(&self.fail_recordings, "recording")?;
        self.inner.lock().unwrap().recordings.push(row.clone());
        Ok(self.next_id("rec"))
    }

    fn create_prediction(&self, row: &PredictionRow) -> Result<String, PersistError> {
        Self::failed(&self.fail_predictions, "prediction")?;
        self.inner.lock().unwrap().predictions.push(row.clone());
        Ok(self.next_id("pred"))
    }

    fn create_murmur_severity(&self, row: &SeverityRow) -> Result<String, PersistError> {
        self.inner.lock().unwrap().severities.push(row.clone());
        Ok(self.next_id("sev"))
    }

    fn create_live_metrics(
        &self,
        org_id: &str,
        session_id: &str,
        metrics: &Value,
    ) -> Result<(), PersistError> {
        self.inner.lock().unwrap().live_metrics.push((
            org_id.to_string(),
            session_id.to_string(),
            metrics.clone(),
        ));
        Ok(())
    }

    fn create_audit_log(&self, entry: &AuditEntry) -> Result<(), PersistError> {
        self.inner.lock().unwrap().audits.push(entry.clone());
        Ok(())
    }
}

// ------------------------------------------------------------
// Models
// ------------------------------------------------------------

pub struct FixedPcgModel {
    probs: [f32; 3],
}

impl FixedPcgModel {
    pub fn new(probs: [f32; 3]) -> Self {
        Self { probs }
    }
}

impl PcgModel for FixedPcgModel {
    fn predict(&self, _features: &[f32]) -> Result<Vec<f32>> {
        Ok(self.probs.to_vec())
    }
}

pub struct FailingPcgModel;

impl PcgModel for FailingPcgModel {
    fn predict(&self, _features: &[f32]) -> Result<Vec<f32>> {
        Err(anyhow!("model runtime fault"))
    }
}

pub struct FixedSeverityModel {
    heads: [Vec<f32>; 6],
}

impl Default for FixedSeverityModel {
    fn default() -> Self {
        Self {
            heads: [
                vec![0.10, 0.45, 0.12, 0.08, 0.08, 0.05, 0.04, 0.03, 0.03, 0.02],
                vec![0.10, 0.50, 0.15, 0.20, 0.05],
                vec![0.15, 0.18, 0.50, 0.12, 0.05],
                vec![0.05, 0.12, 0.38, 0.22, 0.10, 0.05, 0.08],
                vec![0.18, 0.50, 0.25, 0.07],
                vec![0.48, 0.28, 0.15, 0.09],
            ],
        }
    }
}

impl SeverityModel for FixedSeverityModel {
    fn predict(&self, _spectrogram: &Array2<f32>) -> Result<[Vec<f32>; 6]> {
        Ok(self.heads.clone())
    }
}

pub struct FixedEcgModel {
    probs: [f32; 5],
}

impl FixedEcgModel {
    pub fn new(probs: [f32; 5]) -> Self {
        Self { probs }
    }
}

impl EcgModel for FixedEcgModel {
    fn predict(&self, _window: &[f32]) -> Result<Vec<f32>> {
        Ok(self.probs.to_vec())
    }
}

// ------------------------------------------------------------
// Message builders
// ------------------------------------------------------------

pub fn topic(org: &str, device: &str, session: &str, kind: &str) -> String {
    format!("org/{org}/device/{device}/session/{session}/{kind}")
}

pub fn start_pcg_payload(session_id: &str, valve: &str, sample_rate: u32) -> Vec<u8> {
    json!({
        "type": "start_pcg",
        "session_id": session_id,
        "valve_position": valve,
        "sample_rate_hz": sample_rate,
        "format": "pcm_s16le",
        "channels": 1,
        "chunk_ms": 200,
        "target_duration_sec": 10,
        "timestamp_ms": 1_700_000_000_000i64,
    })
    .to_string()
    .into_bytes()
}

pub fn start_ecg_payload(session_id: &str, sample_rate: u32) -> Vec<u8> {
    json!({
        "type": "start_ecg",
        "session_id": session_id,
        "sample_rate_hz": sample_rate,
        "format": "int16",
        "lead": "II",
        "chunk_samples": 500,
        "window_size": 500,
        "timestamp_ms": 1_700_000_000_000i64,
    })
    .to_string()
    .into_bytes()
}

pub fn end_payload(kind: &str, session_id: &str) -> Vec<u8> {
    json!({
        "type": kind,
        "session_id": session_id,
        "timestamp_ms": 1_700_000_000_500i64,
    })
    .to_string()
    .into_bytes()
}

/// `samples` sine-wave samples at `freq` Hz, encoded as int16-LE bytes.
pub fn sine_i16_chunk(freq: f64, sample_rate: u32, samples: usize, amplitude: f32) -> Vec<u8> {
    let wave: Vec<f32> = (0..samples)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
        .collect();
    encode_i16le(&wave)
}
