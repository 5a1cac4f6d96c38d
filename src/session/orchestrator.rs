// src/session/orchestrator.rs
//! Session lifecycle: start -> stream -> (end | forced end | timeout) ->
//! finalize. The orchestrator owns the live-buffer map; the router thread
//! calls into it, background workers sweep it, and finalization runs on a
//! dedicated thread that has taken the buffer out of the map. Removing the
//! buffer at end-receipt is what guarantees a single finalization per
//! (session, modality).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::broker::meta::{EcgStart, MetaMessage, PcgStart};
use crate::broker::topic::{parse_topic, ParsedTopic, TopicKind};
use crate::codecs::{encode_i16le, sha256_hex};
use crate::config::Config;
use crate::core::error::{PipelineError, ProtocolError};
use crate::inference::InferenceEngine;
use crate::persist::store::{
    AuditEntry, PersistStore, PredictionRow, RecordingRow, SessionStatus, SeverityRow,
};
use crate::session::buffer::{BufferKey, Modality, SampleFormat, SessionBuffer};

#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    data: String,
}

/// Read-only view of one live buffer for the operational surface.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStat {
    pub session_id: String,
    pub modality: String,
    pub total_samples: u64,
    pub duration_sec: f64,
    pub ended: bool,
}

pub struct Orchestrator {
    cfg: Config,
    store: Arc<dyn PersistStore>,
    engine: Arc<InferenceEngine>,
    buffers: Mutex<HashMap<BufferKey, SessionBuffer>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(cfg: Config, store: Arc<dyn PersistStore>, engine: Arc<InferenceEngine>) -> Self {
        Self {
            cfg,
            store,
            engine,
            buffers: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn lock_buffers(&self) -> MutexGuard<'_, HashMap<BufferKey, SessionBuffer>> {
        self.buffers.lock().unwrap()
    }

    pub fn active_buffers(&self) -> usize {
        self.lock_buffers().len()
    }

    pub fn buffer_stats(&self) -> Vec<BufferStat> {
        self.lock_buffers()
            .values()
            .map(|b| BufferStat {
                session_id: b.session_id.clone(),
                modality: b.modality.as_str().to_string(),
                total_samples: b.total_samples() as u64,
                duration_sec: b.duration_sec(),
                ended: b.ended,
            })
            .collect()
    }

    // ------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------

    /// Entry point for every broker message.
    pub fn dispatch(self: &Arc<Self>, topic: &str, payload: &[u8], now: Instant) {
        let parsed = match parse_topic(topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("[router] {e}");
                return;
            }
        };

        match parsed.kind {
            TopicKind::Meta => self.handle_meta(&parsed, payload, now),
            TopicKind::Pcg => self.handle_chunk(&parsed, Modality::Pcg, payload, now),
            TopicKind::Ecg => self.handle_chunk(&parsed, Modality::Ecg, payload, now),
            TopicKind::Heartbeat => self.handle_heartbeat(&parsed),
        }
    }

    fn handle_meta(self: &Arc<Self>, topic: &ParsedTopic, payload: &[u8], now: Instant) {
        let meta = match MetaMessage::parse(payload) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("[router] dropping meta on {}: {e}", topic.session_id);
                return;
            }
        };

        match meta {
            MetaMessage::StartPcg(start) => self.handle_start_pcg(topic, start, now),
            MetaMessage::StartEcg(start) => self.handle_start_ecg(topic, start, now),
            MetaMessage::EndPcg(_) => self.finish_session(&topic.session_id, Modality::Pcg),
            MetaMessage::EndEcg(_) => self.finish_session(&topic.session_id, Modality::Ecg),
        }
    }

    fn handle_heartbeat(&self, topic: &ParsedTopic) {
        debug!("[session] heartbeat from device {}", topic.device_id);
        let seen_at = Utc::now().to_rfc3339();
        if let Err(e) = self.store.update_device_last_seen(&topic.device_id, &seen_at) {
            error!("[persist] device last-seen update failed: {e}");
        }
    }

    // ------------------------------------------------------------
    // Start / chunk
    // ------------------------------------------------------------

    fn handle_start_pcg(&self, topic: &ParsedTopic, start: PcgStart, now: Instant) {
        let format_raw = start.format.unwrap_or_else(|| "pcm_s16le".to_string());
        let Some(format) = SampleFormat::parse(&format_raw) else {
            warn!(
                "[session] {}",
                ProtocolError::UnsupportedFormat {
                    format: format_raw,
                    modality: "pcg".into(),
                    session_id: topic.session_id.clone(),
                }
            );
            return;
        };
        let sample_rate = start.sample_rate_hz.unwrap_or(self.cfg.pcg.sample_rate);
        self.start_buffer(
            topic,
            Modality::Pcg,
            SessionBuffer::new(
                &topic.session_id,
                &topic.org_id,
                &topic.device_id,
                Modality::Pcg,
                start.valve_position,
                sample_rate,
                format,
                start.chunk_ms,
                now,
            ),
        );
    }

    fn handle_start_ecg(&self, topic: &ParsedTopic, start: EcgStart, now: Instant) {
        let format_raw = start.format.unwrap_or_else(|| "int16".to_string());
        let Some(format) = SampleFormat::parse(&format_raw) else {
            warn!(
                "[session] {}",
                ProtocolError::UnsupportedFormat {
                    format: format_raw,
                    modality: "ecg".into(),
                    session_id: topic.session_id.clone(),
                }
            );
            return;
        };
        let sample_rate = start.sample_rate_hz.unwrap_or(self.cfg.ecg.sample_rate);
        self.start_buffer(
            topic,
            Modality::Ecg,
            SessionBuffer::new(
                &topic.session_id,
                &topic.org_id,
                &topic.device_id,
                Modality::Ecg,
                None,
                sample_rate,
                format,
                start.chunk_samples,
                now,
            ),
        );
    }

    fn start_buffer(&self, topic: &ParsedTopic, modality: Modality, buffer: SessionBuffer) {
        let key = BufferKey::new(&topic.session_id, modality);
        {
            let mut buffers = self.lock_buffers();
            if buffers.contains_key(&key) {
                warn!(
                    "[session] {modality} buffer already exists for session {}",
                    topic.session_id
                );
                return;
            }
            buffers.insert(key, buffer);
        }
        info!(
            "[session] started {modality} streaming for session {}",
            topic.session_id
        );
        if let Err(e) =
            self.store
                .update_session_status(&topic.session_id, SessionStatus::Streaming, None)
        {
            error!("[persist] streaming-status update failed: {e}");
        }
    }

    fn handle_chunk(
        self: &Arc<Self>,
        topic: &ParsedTopic,
        modality: Modality,
        payload: &[u8],
        now: Instant,
    ) {
        // JSON fallback: some firmwares wrap chunks as {"data": "<base64>"}.
        let data: Vec<u8> = if payload.first() == Some(&b'{') {
            match decode_json_chunk(payload) {
                Ok(data) => data,
                Err(e) => {
                    warn!("[session] {e}");
                    return;
                }
            }
        } else {
            payload.to_vec()
        };

        let key = BufferKey::new(&topic.session_id, modality);
        let exceeded = {
            let mut buffers = self.lock_buffers();
            let Some(buffer) = buffers.get_mut(&key) else {
                warn!(
                    "[session] no {modality} buffer for session {}, ignoring chunk",
                    topic.session_id
                );
                return;
            };
            buffer.add_chunk(&data, now);
            buffer.duration_sec() >= self.cfg.max_duration_sec(modality)
        };

        if exceeded {
            warn!(
                "[session] {modality} buffer exceeded max duration, ending session {}",
                topic.session_id
            );
            self.finish_session(&topic.session_id, modality);
        }
    }

    // ------------------------------------------------------------
    // End / finalization
    // ------------------------------------------------------------

    /// Take the buffer out of the live map and finalize it on its own
    /// thread. Ends for unknown buffers (never started, already finalized)
    /// are logged and dropped.
    pub fn finish_session(self: &Arc<Self>, session_id: &str, modality: Modality) {
        let key = BufferKey::new(session_id, modality);
        let buffer = {
            let mut buffers = self.lock_buffers();
            match buffers.remove(&key) {
                Some(mut buffer) => {
                    buffer.ended = true;
                    buffer
                }
                None => {
                    warn!("[session] no {modality} buffer for session {session_id}");
                    return;
                }
            }
        };

        let orchestrator = Arc::clone(self);
        let handle = thread::spawn(move || orchestrator.finalize(buffer));
        self.track_worker(handle);
    }

    fn track_worker(&self, handle: JoinHandle<()>) {
        let mut workers = self.workers.lock().unwrap();
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
    }

    /// Wait for in-flight finalizations, up to `grace`, then abandon them.
    pub fn drain(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            let pending = {
                let mut workers = self.workers.lock().unwrap();
                workers.retain(|h| !h.is_finished());
                workers.len()
            };
            if pending == 0 {
                return;
            }
            if Instant::now() >= deadline {
                warn!("[session] abandoning {pending} in-flight finalizations");
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    fn finalize(&self, buffer: SessionBuffer) {
        info!(
            "[session] finalizing {} session {}",
            buffer.modality, buffer.session_id
        );
        if let Err(e) = self.run_finalization(&buffer) {
            error!(
                "[session] error processing {} for session {}: {e}",
                buffer.modality, buffer.session_id
            );
            if let Err(status_err) =
                self.store
                    .update_session_status(&buffer.session_id, SessionStatus::Error, None)
            {
                error!("[persist] error-status update failed: {status_err}");
            }
            let audit = AuditEntry {
                org_id: buffer.org_id.clone(),
                user_id: None,
                action: format!("{}_inference_failed", buffer.modality),
                entity_type: "session".to_string(),
                entity_id: Some(buffer.session_id.clone()),
                metadata: json!({ "error": e.to_string() }),
            };
            if let Err(audit_err) = self.store.create_audit_log(&audit) {
                error!("[persist] failure-audit insert failed: {audit_err}");
            }
        }
    }

    fn run_finalization(&self, buffer: &SessionBuffer) -> Result<(), PipelineError> {
        let mut errored = false;

        if let Err(e) =
            self.store
                .update_session_status(&buffer.session_id, SessionStatus::Processing, None)
        {
            error!("[persist] processing-status update failed: {e}");
            errored = true;
        }

        let signal = buffer.reconstruct_signal()?;
        info!(
            "[session] reconstructed {} signal: {} samples",
            buffer.modality,
            signal.len()
        );
        let bytes = encode_i16le(&signal);
        let checksum = sha256_hex(&bytes);

        let storage_path = format!(
            "{}/{}/{}/recording.{}",
            buffer.org_id,
            buffer.session_id,
            buffer.modality,
            buffer.modality.file_ext()
        );

        // The recording row only makes sense once its object exists.
        let mut uploaded = true;
        if let Err(e) = self.store.upload_file(
            &self.cfg.store.recordings_bucket,
            &storage_path,
            &bytes,
            buffer.modality.content_type(),
        ) {
            error!("[persist] upload failed, skipping recording row: {e}");
            uploaded = false;
            self.flag_error(&buffer.session_id, &mut errored);
        }

        if uploaded {
            let row = RecordingRow {
                org_id: buffer.org_id.clone(),
                session_id: buffer.session_id.clone(),
                modality: buffer.modality.as_str().to_string(),
                valve_position: buffer.valve_position.map(|v| v.as_str().to_string()),
                sample_rate_hz: buffer.sample_rate,
                duration_sec: buffer.duration_sec(),
                storage_path,
                checksum,
            };
            if let Err(e) = self.store.create_recording(&row) {
                error!("[persist] recording insert failed: {e}");
                self.flag_error(&buffer.session_id, &mut errored);
            }
        }

        match buffer.modality {
            Modality::Pcg => self.finalize_pcg(buffer, &signal, &mut errored)?,
            Modality::Ecg => self.finalize_ecg(buffer, &signal, &mut errored)?,
        }
        Ok(())
    }

    fn finalize_pcg(
        &self,
        buffer: &SessionBuffer,
        signal: &[f32],
        errored: &mut bool,
    ) -> Result<(), PipelineError> {
        let prediction = self.engine.predict_pcg(signal, buffer.sample_rate)?;
        let output =
            serde_json::to_value(&prediction).map_err(|e| PipelineError::Inference(e.to_string()))?;

        let row = PredictionRow {
            org_id: buffer.org_id.clone(),
            session_id: buffer.session_id.clone(),
            modality: "pcg".to_string(),
            model_name: prediction.meta.model_name.clone(),
            model_version: prediction.meta.model_version.clone(),
            preprocessing_version: prediction.meta.preprocessing_version.clone(),
            output_json: output,
            latency_ms: prediction.meta.latency_ms,
        };
        if let Err(e) = self.store.create_prediction(&row) {
            error!("[persist] prediction insert failed: {e}");
            self.flag_error(&buffer.session_id, errored);
        }

        if prediction.label == "Murmur" {
            info!("[inference] murmur detected, running severity analysis");
            let severity = self
                .engine
                .predict_murmur_severity(signal, buffer.sample_rate)?;
            let to_json = |head: &crate::inference::output::SeverityHead| {
                serde_json::to_value(head).map_err(|e| PipelineError::Inference(e.to_string()))
            };
            let row = SeverityRow {
                org_id: buffer.org_id.clone(),
                session_id: buffer.session_id.clone(),
                model_version: severity.meta.model_version.clone(),
                preprocessing_version: severity.meta.preprocessing_version.clone(),
                location_json: to_json(&severity.location)?,
                timing_json: to_json(&severity.timing)?,
                shape_json: to_json(&severity.shape)?,
                grading_json: to_json(&severity.grading)?,
                pitch_json: to_json(&severity.pitch)?,
                quality_json: to_json(&severity.quality)?,
            };
            if let Err(e) = self.store.create_murmur_severity(&row) {
                error!("[persist] severity insert failed: {e}");
                self.flag_error(&buffer.session_id, errored);
            }
        }

        let audit = AuditEntry {
            org_id: buffer.org_id.clone(),
            user_id: None,
            action: "pcg_inference_completed".to_string(),
            entity_type: "session".to_string(),
            entity_id: Some(buffer.session_id.clone()),
            metadata: json!({
                "result": prediction.label,
                "demo_mode": prediction.meta.demo_mode,
            }),
        };
        if let Err(e) = self.store.create_audit_log(&audit) {
            error!("[persist] completion-audit insert failed: {e}");
            self.flag_error(&buffer.session_id, errored);
        }

        info!(
            "[session] pcg inference completed for session {}",
            buffer.session_id
        );
        Ok(())
    }

    fn finalize_ecg(
        &self,
        buffer: &SessionBuffer,
        signal: &[f32],
        errored: &mut bool,
    ) -> Result<(), PipelineError> {
        let prediction = self.engine.predict_ecg(signal, buffer.sample_rate)?;
        let output =
            serde_json::to_value(&prediction).map_err(|e| PipelineError::Inference(e.to_string()))?;

        let row = PredictionRow {
            org_id: buffer.org_id.clone(),
            session_id: buffer.session_id.clone(),
            modality: "ecg".to_string(),
            model_name: prediction.meta.model_name.clone(),
            model_version: prediction.meta.model_version.clone(),
            preprocessing_version: prediction.meta.preprocessing_version.clone(),
            output_json: output,
            latency_ms: prediction.meta.latency_ms,
        };
        if let Err(e) = self.store.create_prediction(&row) {
            error!("[persist] prediction insert failed: {e}");
            self.flag_error(&buffer.session_id, errored);
        }

        let audit = AuditEntry {
            org_id: buffer.org_id.clone(),
            user_id: None,
            action: "ecg_inference_completed".to_string(),
            entity_type: "session".to_string(),
            entity_id: Some(buffer.session_id.clone()),
            metadata: json!({
                "result": prediction.prediction,
                "demo_mode": prediction.meta.demo_mode,
            }),
        };
        if let Err(e) = self.store.create_audit_log(&audit) {
            error!("[persist] completion-audit insert failed: {e}");
            self.flag_error(&buffer.session_id, errored);
        }

        info!(
            "[session] ecg inference completed for session {}",
            buffer.session_id
        );

        // The session is done once no PCG stream remains for it. PCG
        // finalization never marks done, since ECG may still arrive.
        if !*errored {
            let pcg_live = self
                .lock_buffers()
                .contains_key(&BufferKey::new(&buffer.session_id, Modality::Pcg));
            if !pcg_live {
                let ended_at = Utc::now().to_rfc3339();
                if let Err(e) = self.store.update_session_status(
                    &buffer.session_id,
                    SessionStatus::Done,
                    Some(&ended_at),
                ) {
                    error!("[persist] done-status update failed: {e}");
                    self.flag_error(&buffer.session_id, errored);
                }
            }
        }
        Ok(())
    }

    /// First unrecoverable persistence failure marks the session as
    /// errored; later failures in the same finalization only log.
    fn flag_error(&self, session_id: &str, errored: &mut bool) {
        if *errored {
            return;
        }
        *errored = true;
        if let Err(e) = self
            .store
            .update_session_status(session_id, SessionStatus::Error, None)
        {
            error!("[persist] error-status update failed: {e}");
        }
    }

    // ------------------------------------------------------------
    // Background passes
    // ------------------------------------------------------------

    /// Remove buffers whose stream has gone silent. Timed-out sessions are
    /// marked errored and audited; no inference runs for them.
    pub fn sweep_timeouts(&self, now: Instant) {
        let timeout = Duration::from_secs(self.cfg.stream.timeout_sec);
        let keys: Vec<BufferKey> = self.lock_buffers().keys().cloned().collect();

        for key in keys {
            let buffer = {
                let mut buffers = self.lock_buffers();
                let stale = matches!(
                    buffers.get(&key),
                    Some(b) if !b.ended && now.saturating_duration_since(b.last_chunk_at) > timeout
                );
                if stale {
                    buffers.remove(&key)
                } else {
                    None
                }
            };
            let Some(buffer) = buffer else { continue };

            let last_chunk_sec_ago = now
                .saturating_duration_since(buffer.last_chunk_at)
                .as_secs_f64();
            warn!(
                "[session] session {} ({}) timed out after {:.1}s",
                buffer.session_id, buffer.modality, last_chunk_sec_ago
            );

            if let Err(e) =
                self.store
                    .update_session_status(&buffer.session_id, SessionStatus::Error, None)
            {
                error!("[persist] timeout-status update failed: {e}");
            }
            let audit = AuditEntry {
                org_id: buffer.org_id.clone(),
                user_id: None,
                action: "session_timeout".to_string(),
                entity_type: "session".to_string(),
                entity_id: Some(buffer.session_id.clone()),
                metadata: json!({
                    "modality": buffer.modality.as_str(),
                    "timeout_sec": self.cfg.stream.timeout_sec,
                    "last_chunk_sec_ago": last_chunk_sec_ago,
                }),
            };
            if let Err(e) = self.store.create_audit_log(&audit) {
                error!("[persist] timeout-audit insert failed: {e}");
            }
        }
    }

    /// Emit one live-metrics row per active buffer.
    pub fn publish_live_metrics(&self) {
        let keys: Vec<BufferKey> = self.lock_buffers().keys().cloned().collect();

        for key in keys {
            let snapshot = {
                let buffers = self.lock_buffers();
                match buffers.get(&key) {
                    Some(b) if !b.ended => b.quality_metrics().map(|quality| {
                        (
                            b.org_id.clone(),
                            b.session_id.clone(),
                            b.modality,
                            b.duration_sec(),
                            b.total_samples(),
                            quality,
                        )
                    }),
                    _ => None,
                }
            };
            let Some((org_id, session_id, modality, duration, samples, quality)) = snapshot
            else {
                continue;
            };

            let mut buffer_fill = serde_json::Map::new();
            buffer_fill.insert(format!("{}_seconds", modality.as_str()), json!(duration));
            buffer_fill.insert(format!("{}_samples", modality.as_str()), json!(samples));
            let metrics = json!({
                "buffer_fill": buffer_fill,
                "quality": quality,
                "timestamp": Utc::now().to_rfc3339(),
            });

            if let Err(e) = self
                .store
                .create_live_metrics(&org_id, &session_id, &metrics)
            {
                error!("[persist] live-metrics insert failed: {e}");
            }
        }
    }
}

fn decode_json_chunk(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let envelope: ChunkEnvelope =
        serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedChunk {
            reason: e.to_string(),
        })?;
    BASE64
        .decode(envelope.data.as_bytes())
        .map_err(|e| ProtocolError::MalformedChunk {
            reason: e.to_string(),
        })
}
