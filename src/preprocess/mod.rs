// src/preprocess/mod.rs
//! Deterministic signal conditioning for PCG and ECG streams.
//!
//! Every preprocessor is a pure function of its input samples and its
//! configuration: same bytes in, same floats out, always. The version tag
//! below identifies the exact numeric pipeline; any change to filter
//! design, padding policy, STFT grid, or feature formulas requires a bump.

pub mod ecg;
pub mod pcg;
pub mod spectrogram;

pub use ecg::{EcgWindowConfig, EcgWindowPreprocessor};
pub use pcg::{PcgFeatureConfig, PcgFeaturePreprocessor, PCG_FEATURE_LEN};
pub use spectrogram::{PcgSpectrogramConfig, PcgSpectrogramPreprocessor, SpectrogramMode};

pub const PREPROCESSING_VERSION: &str = "v1.0.0";

pub fn preprocessing_version() -> &'static str {
    PREPROCESSING_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_tag_is_stable() {
        assert_eq!(preprocessing_version(), "v1.0.0");
    }
}
