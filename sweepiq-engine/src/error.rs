use sweepiq_messages::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "Spectrum geometry mismatch: expected {expected_bins} bins of {expected_bin_hz} Hz, got {actual_bins} bins of {actual_bin_hz} Hz"
    )]
    GeometryMismatch {
        expected_bins: usize,
        actual_bins: usize,
        expected_bin_hz: f32,
        actual_bin_hz: f32,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
