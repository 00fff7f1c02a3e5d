use crate::{FrequencyRange, PowerCalibration, SpurFilterOutput};

/// Commands sent from the presentation layer to the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Stop the running session and terminate the engine.
    Stop,
    /// Sweep a different span. Restarts the session.
    SetFrequencyRange(FrequencyRange),
    /// Change the FFT bin width in Hz. Restarts the session.
    SetBinWidth(f32),
    /// Change the FFT sample count. Restarts the session.
    SetSamples(u32),
    /// Change the receiver gain in dB. Restarts the session.
    SetGain(u32),
    /// Install or clear the power calibration. Restarts the session.
    SetPowerCalibration(Option<PowerCalibration>),
    SetPaletteStart(i32),
    SetPaletteSize(i32),
    /// Peak hold fall rate in seconds.
    SetPeakFallRate(u32),
    /// Persistence (afterglow) time in seconds.
    SetPersistenceTime(u32),
    /// Power window in dBm drawn by the persistence raster.
    SetPowerRange(f32, f32),
    /// Enable or disable spur removal. Either way the spur calibration starts over.
    SetSpurRemoval(bool),
    SetSpurFilterOutput(SpurFilterOutput),
    /// Show or hide peaks. Toggling resets the held peaks.
    SetShowPeaks(bool),
    SetPaused(bool),
    /// Waterfall history height in pixels.
    SetWaterfallHistory(usize),
    SetPersistenceImageSize(usize, usize),
    ResetPersistence,
}

impl Command {
    /// Whether this command requires a new acquisition session.
    pub fn restarts_session(&self) -> bool {
        matches!(
            self,
            Command::SetFrequencyRange(_)
                | Command::SetBinWidth(_)
                | Command::SetSamples(_)
                | Command::SetGain(_)
                | Command::SetPowerCalibration(_)
        )
    }
}
