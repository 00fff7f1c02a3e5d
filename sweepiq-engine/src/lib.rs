mod config;
pub mod ema;
mod error;
pub mod ingest;
pub mod palette;
pub mod peak;
pub mod persistence;
pub mod processing;
mod raster;
mod session;
pub mod source;
pub mod spectrum;
pub mod spur_filter;
pub mod stats;
pub mod view;
pub mod waterfall;

pub use config::EngineConfig;
pub use error::PipelineError;
pub use ingest::BatchSink;
pub use source::{CancellationToken, SweepSource, SyntheticSweep};
pub use view::{PipelineView, SpectrumPoint, SpectrumSnapshot};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use sweepiq_messages::{
    Command, ConfigError, DisplayConfig, Event, SPECTRUM_PALETTE_SIZE_MIN, SweepConfig,
};

use crate::persistence::PersistenceDisplay;
use crate::session::{Launcher, SessionContext, SessionSettings, lock};
use crate::waterfall::WaterfallPlot;

/// The sweep pipeline backend.
/// Runs sessions against a [`SweepSource`] and applies commands from the UI.
pub struct Engine {
    cmd_rx: Receiver<Command>,
    event_tx: Sender<Event>,
    config: EngineConfig,
    source: Box<dyn SweepSource>,
    view: Arc<PipelineView>,
}

/// Command loop state while the launcher thread is alive.
struct Running {
    sweep: SweepConfig,
    settings: Arc<Mutex<SessionSettings>>,
    launcher: Launcher,
}

impl Engine {
    /// Create a new Engine instance.
    pub fn new(
        cmd_rx: Receiver<Command>,
        event_tx: Sender<Event>,
        config: EngineConfig,
        source: Box<dyn SweepSource>,
    ) -> Self {
        debug!("Constructing a new engine");
        let mut waterfall = WaterfallPlot::new(config.waterfall_width, config.waterfall_history);
        waterfall.set_palette_start(config.display.palette_start_db as f32);
        waterfall.set_palette_size(config.display.palette_size_db as f32);
        let (width, height) = config.persistence_size;
        let persistence = PersistenceDisplay::new(width, height, config.display.persistence_secs);
        Self {
            cmd_rx,
            event_tx,
            config,
            source,
            view: Arc::new(PipelineView::new(waterfall, persistence)),
        }
    }

    /// Handle for pulling snapshots and frames, usable from any thread.
    pub fn view(&self) -> Arc<PipelineView> {
        Arc::clone(&self.view)
    }

    /// Run the engine (blocking) until `Command::Stop` or the command
    /// channel closes.
    pub fn run(self) -> Result<()> {
        let settings = Arc::new(Mutex::new(SessionSettings::new(self.config.display.clone())));
        let ctx = SessionContext {
            source: Arc::new(Mutex::new(self.source)),
            view: Arc::clone(&self.view),
            event_tx: self.event_tx.clone(),
            settings: Arc::clone(&settings),
            spur: self.config.spur,
            queue_capacity: self.config.queue_capacity,
            retry_delay: self.config.source_retry_delay,
            data_timeout: self.config.data_timeout,
        };
        let mut running = Running {
            sweep: self.config.sweep.clone(),
            settings,
            launcher: Launcher::spawn(ctx),
        };
        running.launcher.restart(running.sweep.clone());

        loop {
            let msg = self.cmd_rx.recv_timeout(Duration::from_millis(100));
            match msg {
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Engine stopping");
                    break;
                }
                Ok(command) => {
                    debug!("Engine received command: {:?}", command);
                    running.apply(command, &self.view);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if running.launcher.is_finished() {
                        warn!("Launcher thread exited unexpectedly");
                        break;
                    }
                }
            }
        }

        running.launcher.shutdown();
        Ok(())
    }
}

impl Running {
    fn apply(&mut self, command: Command, view: &PipelineView) {
        let restart = command.restarts_session();
        match command {
            Command::Stop => {}
            Command::SetFrequencyRange(range) => self.sweep.frequency = range,
            Command::SetBinWidth(hz) => {
                if !hz.is_finite() || hz <= 0.0 {
                    warn!("{}", ConfigError::InvalidBinWidth(hz));
                    return;
                }
                self.sweep.bin_width_hz = hz;
            }
            Command::SetSamples(samples) => {
                if samples == 0 {
                    warn!("Ignoring zero FFT sample count");
                    return;
                }
                self.sweep.samples = samples;
            }
            Command::SetGain(gain) => self.sweep.gain_db = gain,
            Command::SetPowerCalibration(calibration) => self.sweep.power_calibration = calibration,
            Command::SetPaletteStart(db) => {
                view.waterfall().set_palette_start(db as f32);
                self.update_display(|d| d.palette_start_db = db);
            }
            Command::SetPaletteSize(db) => {
                if db < SPECTRUM_PALETTE_SIZE_MIN {
                    warn!(
                        "{}",
                        ConfigError::InvalidPaletteSize {
                            size: db,
                            min: SPECTRUM_PALETTE_SIZE_MIN
                        }
                    );
                    return;
                }
                view.waterfall().set_palette_size(db as f32);
                self.update_display(|d| d.palette_size_db = db);
            }
            Command::SetPeakFallRate(secs) => {
                if secs == 0 {
                    warn!("Ignoring zero peak fall rate");
                    return;
                }
                self.update_display(|d| d.peak_fall_rate_secs = secs);
            }
            Command::SetPersistenceTime(secs) => {
                let secs = secs.max(1);
                view.persistence().set_persistence_time(secs);
                self.update_display(|d| d.persistence_secs = secs);
            }
            Command::SetPowerRange(min, max) => {
                if max.is_nan() || min.is_nan() || max <= min {
                    warn!("Ignoring empty power range {min}..{max} dBm");
                    return;
                }
                self.update_display(|d| d.power_range_dbm = (min, max));
            }
            Command::SetSpurRemoval(enabled) => self.update_display(|d| d.spur_removal = enabled),
            Command::SetSpurFilterOutput(output) => {
                self.update_display(|d| d.spur_filter_output = output)
            }
            Command::SetShowPeaks(show) => self.update_display(|d| d.show_peaks = show),
            Command::SetPaused(paused) => self.update_display(|d| d.paused = paused),
            Command::SetWaterfallHistory(rows) => {
                if rows == 0 {
                    warn!("Ignoring empty waterfall history");
                    return;
                }
                view.waterfall().set_history_size(rows);
            }
            Command::SetPersistenceImageSize(width, height) => {
                if width == 0 || height == 0 {
                    warn!("Ignoring empty persistence image {width}x{height}");
                    return;
                }
                view.persistence().set_image_size(width, height);
            }
            Command::ResetPersistence => view.persistence().reset(),
        }
        if restart {
            self.restart();
        }
    }

    fn restart(&self) {
        debug!("Requesting restart for {}", self.sweep.frequency);
        self.launcher.restart(self.sweep.clone());
    }

    fn update_display(&self, update: impl FnOnce(&mut DisplayConfig)) {
        let mut settings = lock(&self.settings);
        update(&mut settings.display);
        settings.push();
    }
}
