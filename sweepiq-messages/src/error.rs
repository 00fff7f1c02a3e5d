use thiserror::Error;

/// Configuration rejected before it reaches the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Frequency range must be increasing, got {start_mhz}-{stop_mhz} MHz")]
    InvalidFrequencyRange { start_mhz: u32, stop_mhz: u32 },
    #[error("FFT bin width must be a positive number of Hz, got {0}")]
    InvalidBinWidth(f32),
    #[error("Palette size must be at least {min} dB, got {size}")]
    InvalidPaletteSize { size: i32, min: i32 },
}
