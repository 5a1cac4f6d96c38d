// src/core/mod.rs
pub mod error;

pub use error::{
    CodecError, DspError, PersistError, PipelineError, ProtocolError, StartupError,
};
