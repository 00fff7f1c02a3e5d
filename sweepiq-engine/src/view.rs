use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use epaint::ColorImage;
use log::error;
use sweepiq_messages::PipelineStatistics;

use crate::peak::PeakSpectrum;
use crate::persistence::PersistenceDisplay;
use crate::spectrum::SpectrumBuffer;
use crate::waterfall::WaterfallPlot;

/// One point of a published trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumPoint {
    pub frequency_mhz: f64,
    pub power_dbm: f32,
}

/// Immutable copy of the traces taken at the end of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumSnapshot {
    pub spectrum: Vec<SpectrumPoint>,
    /// Empty while peaks are hidden
    pub peaks: Vec<SpectrumPoint>,
    pub total_power_dbm: f32,
}

impl SpectrumSnapshot {
    pub fn capture(peaks: &PeakSpectrum, show_peaks: bool) -> Self {
        let spectrum = peaks.spectrum();
        let (peak_points, total_power_dbm) = if show_peaks {
            (
                points(spectrum, peaks.peak_hold()),
                peaks.total_peak_power_dbm(),
            )
        } else {
            (Vec::new(), spectrum.total_power_dbm())
        };
        Self {
            spectrum: points(spectrum, spectrum.power()),
            peaks: peak_points,
            total_power_dbm,
        }
    }
}

fn points(spectrum: &SpectrumBuffer, power: &[f32]) -> Vec<SpectrumPoint> {
    let axis = spectrum.axis();
    power
        .iter()
        .enumerate()
        .map(|(i, &power_dbm)| SpectrumPoint {
            frequency_mhz: axis.frequency_hz(i) / 1_000_000.0,
            power_dbm,
        })
        .collect()
}

/// Everything the presentation layer pulls from the pipeline.
///
/// The processing thread is the only writer. Traces are swapped in whole, the
/// rasters sit behind one lock each so a frame is never read mid-update.
pub struct PipelineView {
    snapshot: RwLock<Arc<SpectrumSnapshot>>,
    waterfall: Mutex<WaterfallPlot>,
    persistence: Mutex<PersistenceDisplay>,
    statistics: RwLock<PipelineStatistics>,
    dropped: Arc<AtomicU64>,
    sending_data: AtomicBool,
}

impl PipelineView {
    pub fn new(waterfall: WaterfallPlot, persistence: PersistenceDisplay) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(SpectrumSnapshot::default())),
            waterfall: Mutex::new(waterfall),
            persistence: Mutex::new(persistence),
            statistics: RwLock::new(PipelineStatistics::default()),
            dropped: Arc::new(AtomicU64::new(0)),
            sending_data: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> Arc<SpectrumSnapshot> {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(err) => {
                error!("Snapshot lock poisoned: {err}");
                err.into_inner()
            }
        };
        Arc::clone(&guard)
    }

    pub fn spectrum_snapshot(&self) -> Vec<SpectrumPoint> {
        self.snapshot().spectrum.clone()
    }

    pub fn peak_snapshot(&self) -> Vec<SpectrumPoint> {
        self.snapshot().peaks.clone()
    }

    pub fn total_band_power_dbm(&self) -> f32 {
        self.snapshot().total_power_dbm
    }

    pub fn waterfall_frame(&self) -> ColorImage {
        self.waterfall().frame().clone()
    }

    pub fn scale_legend(&self, width: usize, height: usize) -> ColorImage {
        self.waterfall().scale_legend(width, height)
    }

    pub fn rendering_info(&self) -> String {
        self.waterfall().rendering_info().to_owned()
    }

    /// Render the afterglow raster from the current accumulator.
    pub fn persistence_frame(&self) -> ColorImage {
        self.persistence().render().clone()
    }

    pub fn statistics(&self) -> PipelineStatistics {
        match self.statistics.read() {
            Ok(guard) => guard.clone(),
            Err(err) => err.into_inner().clone(),
        }
    }

    /// Batches dropped at the ingestion queue since the engine started.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_sending_data(&self) -> bool {
        self.sending_data.load(Ordering::Relaxed)
    }

    pub(crate) fn publish(&self, snapshot: SpectrumSnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(err) => *err.into_inner() = snapshot,
        }
    }

    pub(crate) fn set_statistics(&self, statistics: PipelineStatistics) {
        match self.statistics.write() {
            Ok(mut guard) => *guard = statistics,
            Err(err) => *err.into_inner() = statistics,
        }
    }

    pub(crate) fn set_sending_data(&self, sending: bool) {
        self.sending_data.store(sending, Ordering::Relaxed);
    }

    pub(crate) fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    pub(crate) fn waterfall(&self) -> MutexGuard<'_, WaterfallPlot> {
        match self.waterfall.lock() {
            Ok(guard) => guard,
            Err(err) => {
                error!("Waterfall lock poisoned: {err}");
                err.into_inner()
            }
        }
    }

    pub(crate) fn persistence(&self) -> MutexGuard<'_, PersistenceDisplay> {
        match self.persistence.lock() {
            Ok(guard) => guard,
            Err(err) => {
                error!("Persistence lock poisoned: {err}");
                err.into_inner()
            }
        }
    }
}
