mod batch;
mod calibration;
mod command;
mod error;
mod event;
mod range;
mod state;
mod units;

pub use batch::FftBatch;
pub use calibration::PowerCalibration;
pub use command::Command;
pub use error::ConfigError;
pub use event::{Event, PipelineStatistics, StageTiming};
pub use range::FrequencyRange;
pub use state::{DisplayConfig, EngineState, SpurFilterOutput, SweepConfig};
pub use units::{Decibels, Hertz};

/// Smallest palette window accepted for the waterfall colour scale.
pub const SPECTRUM_PALETTE_SIZE_MIN: i32 = 5;
