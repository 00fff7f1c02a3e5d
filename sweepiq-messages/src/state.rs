use crate::{FrequencyRange, Hertz, PowerCalibration};

/// Parameters that define one acquisition session.
///
/// Changing any of these restarts the session with freshly allocated
/// spectrum buffers; they never change underneath a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub frequency: FrequencyRange,
    /// FFT bin width in Hz
    pub bin_width_hz: f32,
    /// Samples per FFT block requested from the hardware
    pub samples: u32,
    /// Total receiver gain in dB
    pub gain_db: u32,
    /// Power every bin starts at before the first sweep reports it
    pub floor_dbm: f32,
    pub power_calibration: Option<PowerCalibration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            frequency: FrequencyRange::default(),
            bin_width_hz: 100_000.0,
            samples: 8192,
            gain_db: 40,
            floor_dbm: -150.0,
            power_calibration: None,
        }
    }
}

/// What the spur filter writes back into the spectrum once calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpurFilterOutput {
    /// Input minus the per-bin spur correction.
    #[default]
    Corrected,
    /// The averaged calibration spectrum.
    Average,
    /// The estimated noise floor.
    NoiseFloor,
    /// Noise floor with the corrections stacked on top.
    NoiseFloorPlusCorrection,
}

/// Settings applied to a running session without restarting it.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayConfig {
    pub palette_start_db: i32,
    pub palette_size_db: i32,
    pub peak_fall_rate_secs: u32,
    pub peak_fall_threshold_db: f32,
    pub persistence_secs: u32,
    /// Power window (min, max) in dBm mapped onto the persistence raster height
    pub power_range_dbm: (f32, f32),
    pub spur_removal: bool,
    pub spur_filter_output: SpurFilterOutput,
    pub show_peaks: bool,
    pub paused: bool,
    pub waterfall_enabled: bool,
    pub persistence_enabled: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            palette_start_db: -90,
            palette_size_db: 65,
            peak_fall_rate_secs: 30,
            peak_fall_threshold_db: 10.0,
            persistence_secs: 30,
            power_range_dbm: (-110.0, 20.0),
            spur_removal: false,
            spur_filter_output: SpurFilterOutput::default(),
            show_peaks: true,
            paused: false,
            waterfall_enabled: true,
            persistence_enabled: true,
        }
    }
}

/// Snapshot of a freshly started acquisition session.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub start_frequency: Hertz,
    pub stop_frequency: Hertz,
    /// FFT bin width in Hz
    pub bin_width_hz: f32,
    /// Number of bins in the spectrum buffer
    pub bin_count: usize,
    pub sweep_config: SweepConfig,
}
