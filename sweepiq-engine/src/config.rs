use std::time::Duration;

use sweepiq_messages::{DisplayConfig, SweepConfig};

use crate::spur_filter::SpurFilterParams;

/// Startup configuration of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Batches held by the ingestion queue before new ones are dropped
    pub queue_capacity: usize,
    pub waterfall_width: usize,
    /// Waterfall rows kept, one per sweep
    pub waterfall_history: usize,
    /// Persistence raster (width, height) in pixels
    pub persistence_size: (usize, usize),
    /// Pause before a stopped sweep source is started again
    pub source_retry_delay: Duration,
    /// Silence after which the hardware counts as not sending
    pub data_timeout: Duration,
    pub spur: SpurFilterParams,
    pub sweep: SweepConfig,
    pub display: DisplayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            waterfall_width: 1920,
            waterfall_history: 400,
            persistence_size: (320, 240),
            source_retry_delay: Duration::from_secs(1),
            data_timeout: Duration::from_secs(1),
            spur: SpurFilterParams::default(),
            sweep: SweepConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}
