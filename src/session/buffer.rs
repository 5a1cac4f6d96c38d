// src/session/buffer.rs
//! Per-(session, modality) byte accumulator with quality statistics.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::codecs::decode_i16le;
use crate::core::error::CodecError;
use crate::dsp::percentile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Pcg,
    Ecg,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Pcg => "pcg",
            Modality::Ecg => "ecg",
        }
    }

    pub fn file_ext(self) -> &'static str {
        match self {
            Modality::Pcg => "wav",
            Modality::Ecg => "bin",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Modality::Pcg => "audio/wav",
            Modality::Ecg => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValvePosition {
    Av,
    Mv,
    Pv,
    Tv,
}

impl ValvePosition {
    pub fn as_str(self) -> &'static str {
        match self {
            ValvePosition::Av => "AV",
            ValvePosition::Mv => "MV",
            ValvePosition::Pv => "PV",
            ValvePosition::Tv => "TV",
        }
    }
}

/// Sample encodings the ingest path understands. Streams announcing any
/// other format are rejected at start rather than silently miscounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    PcmS16le,
}

impl SampleFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pcm_s16le" | "int16" | "s16le" => Some(SampleFormat::PcmS16le),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::PcmS16le => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub session_id: String,
    pub modality: Modality,
}

impl BufferKey {
    pub fn new(session_id: impl Into<String>, modality: Modality) -> Self {
        Self {
            session_id: session_id.into(),
            modality,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    pub total_samples: u64,
    pub duration_sec: f64,
    pub sample_rate: u32,
    pub snr_estimate: f64,
    pub clipping_pct: f64,
    pub missing_pct: f64,
    pub buffer_health: &'static str,
}

pub struct SessionBuffer {
    pub session_id: String,
    pub org_id: String,
    pub device_id: String,
    pub modality: Modality,
    pub valve_position: Option<ValvePosition>,
    pub sample_rate: u32,
    pub format: SampleFormat,
    /// Advisory chunk size announced at start (ms for PCG, samples for ECG).
    pub chunk_hint: Option<u32>,

    chunks: Vec<Vec<u8>>,
    total_bytes: usize,
    total_samples: usize,
    // Trailing bytes of a non-sample-aligned chunk, counted toward the
    // next chunk so sample accounting never drifts.
    sample_remainder: usize,

    pub started_at: Instant,
    pub last_chunk_at: Instant,
    pub ended: bool,
}

impl SessionBuffer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        org_id: impl Into<String>,
        device_id: impl Into<String>,
        modality: Modality,
        valve_position: Option<ValvePosition>,
        sample_rate: u32,
        format: SampleFormat,
        chunk_hint: Option<u32>,
        now: Instant,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            org_id: org_id.into(),
            device_id: device_id.into(),
            modality,
            valve_position,
            sample_rate,
            format,
            chunk_hint,
            chunks: Vec::new(),
            total_bytes: 0,
            total_samples: 0,
            sample_remainder: 0,
            started_at: now,
            last_chunk_at: now,
            ended: false,
        }
    }

    pub fn add_chunk(&mut self, data: &[u8], now: Instant) {
        let available = self.sample_remainder + data.len();
        let bps = self.format.bytes_per_sample();
        self.total_samples += available / bps;
        self.sample_remainder = available % bps;

        self.total_bytes += data.len();
        self.chunks.push(data.to_vec());
        self.last_chunk_at = now;
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn duration_sec(&self) -> f64 {
        if self.total_samples == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples as f64 / self.sample_rate as f64
    }

    /// Concatenate all chunks and decode into normalized floats. A trailing
    /// partial sample is dropped.
    pub fn reconstruct_signal(&self) -> Result<Vec<f32>, CodecError> {
        let mut data = Vec::with_capacity(self.total_bytes);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        let aligned = self.total_samples * self.format.bytes_per_sample();
        data.truncate(aligned);
        decode_i16le(&data)
    }

    pub fn quality_metrics(&self) -> Option<QualityMetrics> {
        if self.chunks.is_empty() {
            return None;
        }
        let signal = self.reconstruct_signal().ok()?;
        if signal.is_empty() {
            return None;
        }
        Some(QualityMetrics {
            total_samples: self.total_samples as u64,
            duration_sec: self.duration_sec(),
            sample_rate: self.sample_rate,
            snr_estimate: estimate_snr(&signal),
            clipping_pct: detect_clipping(&signal),
            missing_pct: 0.0,
            buffer_health: "good",
        })
    }
}

/// Ratio of signal power to the 10th-percentile noise floor, in dB,
/// clamped to [0, 60]. A zero noise floor reads as 30 dB.
fn estimate_snr(signal: &[f32]) -> f64 {
    let n = signal.len() as f64;
    let power = signal.iter().map(|&v| (v as f64) * (v as f64)).sum::<f64>() / n;
    let magnitudes: Vec<f64> = signal.iter().map(|&v| v.abs() as f64).collect();
    let floor = percentile(&magnitudes, 10.0);
    let noise = floor * floor;
    if noise > 0.0 {
        (10.0 * (power / noise).log10()).clamp(0.0, 60.0)
    } else {
        30.0
    }
}

fn detect_clipping(signal: &[f32]) -> f64 {
    let clipped = signal.iter().filter(|v| v.abs() > 0.99).count();
    100.0 * clipped as f64 / signal.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::encode_i16le;

    fn buffer(modality: Modality, sample_rate: u32) -> SessionBuffer {
        SessionBuffer::new(
            "sess-1",
            "org-1",
            "dev-1",
            modality,
            None,
            sample_rate,
            SampleFormat::PcmS16le,
            None,
            Instant::now(),
        )
    }

    #[test]
    fn accounting_tracks_chunks() {
        let mut buf = buffer(Modality::Pcg, 22_050);
        for _ in 0..50 {
            buf.add_chunk(&vec![0u8; 8820], Instant::now());
        }
        assert_eq!(buf.total_bytes(), 441_000);
        assert_eq!(buf.total_samples(), 220_500);
        assert!((buf.duration_sec() - 10.0).abs() < 0.01);
    }

    #[test]
    fn unaligned_chunks_keep_sample_count_exact() {
        let mut buf = buffer(Modality::Ecg, 500);
        buf.add_chunk(&vec![0u8; 3], Instant::now());
        assert_eq!(buf.total_samples(), 1);
        buf.add_chunk(&vec![0u8; 3], Instant::now());
        // 6 bytes total = exactly 3 samples, remainder carried over.
        assert_eq!(buf.total_samples(), 3);
        let signal = buf.reconstruct_signal().expect("reconstruct");
        assert_eq!(signal.len(), 3);
    }

    #[test]
    fn empty_buffer_has_zero_duration() {
        let buf = buffer(Modality::Pcg, 22_050);
        assert_eq!(buf.duration_sec(), 0.0);
        assert!(buf.quality_metrics().is_none());
    }

    #[test]
    fn reconstruct_concatenates_in_order() {
        let mut buf = buffer(Modality::Pcg, 22_050);
        let first = encode_i16le(&[0.5, 0.5]);
        let second = encode_i16le(&[-0.5, -0.5]);
        buf.add_chunk(&first, Instant::now());
        buf.add_chunk(&second, Instant::now());
        let signal = buf.reconstruct_signal().expect("reconstruct");
        assert_eq!(signal.len(), 4);
        assert!(signal[0] > 0.0 && signal[3] < 0.0);
    }

    #[test]
    fn quality_metrics_flag_clipping() {
        let mut buf = buffer(Modality::Pcg, 22_050);
        let mut samples = vec![0.1f32; 99];
        samples.push(0.9999);
        buf.add_chunk(&encode_i16le(&samples), Instant::now());
        let metrics = buf.quality_metrics().expect("metrics");
        assert!((metrics.clipping_pct - 1.0).abs() < 0.05);
        assert_eq!(metrics.buffer_health, "good");
        assert!(metrics.snr_estimate >= 0.0 && metrics.snr_estimate <= 60.0);
    }

    #[test]
    fn zero_noise_floor_reads_thirty_db() {
        let mut buf = buffer(Modality::Pcg, 22_050);
        // 20% zeros puts the 10th percentile at exactly zero.
        let mut samples = vec![0.0f32; 20];
        samples.extend(vec![0.5f32; 80]);
        buf.add_chunk(&encode_i16le(&samples), Instant::now());
        let metrics = buf.quality_metrics().expect("metrics");
        assert_eq!(metrics.snr_estimate, 30.0);
    }

    #[test]
    fn format_parsing_accepts_known_names_only() {
        assert_eq!(SampleFormat::parse("pcm_s16le"), Some(SampleFormat::PcmS16le));
        assert_eq!(SampleFormat::parse("int16"), Some(SampleFormat::PcmS16le));
        assert_eq!(SampleFormat::parse("float32"), None);
    }
}
