// src/core/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while decoding raw sample bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("byte length {len} is not a multiple of {bytes_per_sample}")]
    UnalignedLength { len: usize, bytes_per_sample: usize },
}

/// Malformed input from the message bus. Policy: log, drop, no status change.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid topic format: {topic}")]
    InvalidTopic { topic: String },
    #[error("empty id segment in topic: {topic}")]
    EmptyId { topic: String },
    #[error("malformed meta payload: {reason}")]
    MalformedMeta { reason: String },
    #[error("unsupported sample format '{format}' for {modality} session {session_id}")]
    UnsupportedFormat {
        format: String,
        modality: String,
        session_id: String,
    },
    #[error("no {modality} buffer for session {session_id}")]
    UnknownBuffer {
        modality: String,
        session_id: String,
    },
    #[error("malformed chunk payload: {reason}")]
    MalformedChunk { reason: String },
}

/// DSP stage failures inside a preprocessor.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("empty input signal")]
    EmptyInput,
    #[error("input of {len} samples is too short for filter padding of {padlen}")]
    TooShortForPadding { len: usize, padlen: usize },
    #[error("invalid band edges {low}..{high} Hz at sample rate {sample_rate} Hz")]
    InvalidBandEdges {
        low: f64,
        high: f64,
        sample_rate: u32,
    },
    #[error("non-finite value produced at stage '{stage}'")]
    NonFinite { stage: &'static str },
}

/// Persistence gateway failures. Fire-once; the caller logs and decides
/// whether the finalization can continue.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{context}: http status {status}")]
    Status { context: String, status: u16 },
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("{context}: unexpected response shape")]
    BadResponse { context: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures along the finalization pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("signal reconstruction failed: {0}")]
    Reconstruction(#[from] CodecError),
    #[error("preprocessing failed: {0}")]
    Preprocessing(#[from] DspError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistError),
}

/// Fatal startup conditions. The process exits non-zero on any of these.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("model '{name}' unavailable at {path} and demo mode is disabled")]
    ModelUnavailable { name: String, path: PathBuf },
    #[error("invalid environment value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
    #[error("missing required environment variable {key}")]
    MissingEnv { key: String },
    #[error("preprocessor construction failed: {0}")]
    Preprocessor(#[from] DspError),
    #[error("broker connect failed after {attempts} attempts: {reason}")]
    BrokerConnect { attempts: u32, reason: String },
}
