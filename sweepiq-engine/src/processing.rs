use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace};
use sweepiq_messages::{DisplayConfig, Event, FftBatch, SweepConfig};

use crate::error::PipelineError;
use crate::peak::PeakSpectrum;
use crate::source::CancellationToken;
use crate::spectrum::{FrequencyAxis, SpectrumBuffer};
use crate::spur_filter::{FilterStatus, SpurFilter, SpurFilterParams};
use crate::stats::{PerfWatch, Stage};
use crate::view::{PipelineView, SpectrumSnapshot};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings pushed into a running processing thread.
#[derive(Debug, Clone)]
pub enum Control {
    Display(DisplayConfig),
}

/// Single consumer of the ingestion queue for one session.
///
/// Owns the session's spectrum, peak and spur state. Rasters and published
/// traces go through the shared [`PipelineView`].
pub struct Processor {
    peaks: PeakSpectrum,
    spur_filter: SpurFilter,
    sweep: SweepConfig,
    display: DisplayConfig,
    view: Arc<PipelineView>,
    event_tx: Sender<Event>,
    perf: PerfWatch,
    data_timeout: Duration,
    last_batch: Option<Instant>,
    sending_data: bool,
}

impl Processor {
    pub fn new(
        sweep: SweepConfig,
        display: DisplayConfig,
        spur_params: SpurFilterParams,
        view: Arc<PipelineView>,
        event_tx: Sender<Event>,
        data_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let axis = FrequencyAxis::from_config(&sweep)?;
        let spectrum = SpectrumBuffer::new(axis, sweep.floor_dbm);
        let peaks = PeakSpectrum::new(
            spectrum,
            display.peak_fall_threshold_db,
            Duration::from_secs(display.peak_fall_rate_secs as u64),
        );
        let spur_filter = SpurFilter::new(spur_params, axis, display.spur_filter_output);
        Ok(Self {
            peaks,
            spur_filter,
            sweep,
            display,
            view,
            event_tx,
            perf: PerfWatch::new(Instant::now()),
            data_timeout,
            last_batch: None,
            sending_data: false,
        })
    }

    pub fn axis(&self) -> &FrequencyAxis {
        self.peaks.spectrum().axis()
    }

    pub fn peaks(&self) -> &PeakSpectrum {
        &self.peaks
    }

    pub fn spur_filter(&self) -> &SpurFilter {
        &self.spur_filter
    }

    /// Drain `batches` until canceled or every producer is gone.
    pub fn run(
        mut self,
        batches: Receiver<FftBatch>,
        control: Receiver<Control>,
        cancel: CancellationToken,
    ) {
        debug!("Processing thread started for {}", self.axis().range());
        while !cancel.is_canceled() {
            for message in control.try_iter() {
                match message {
                    Control::Display(display) => self.apply_display(display),
                }
            }

            match batches.recv_timeout(POLL_INTERVAL) {
                Ok(batch) => {
                    if cancel.is_canceled() {
                        break;
                    }
                    self.handle_batch_at(batch, Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Ingestion queue closed");
                    break;
                }
            }

            let now = Instant::now();
            self.check_data_timeout_at(now);
            self.poll_statistics_at(now);
        }
        debug!("Processing thread exiting");
    }

    /// Apply new display settings, recalibrating or resetting what they affect.
    pub fn apply_display(&mut self, display: DisplayConfig) {
        let old = &self.display;
        if display.spur_removal != old.spur_removal {
            debug!("Spur removal {}", if display.spur_removal { "enabled" } else { "disabled" });
            self.spur_filter.recalibrate();
        }
        if display.spur_filter_output != old.spur_filter_output {
            self.spur_filter.set_output(display.spur_filter_output);
        }
        if display.show_peaks != old.show_peaks {
            self.peaks.reset_peaks();
        }
        if display.peak_fall_rate_secs != old.peak_fall_rate_secs {
            self.peaks
                .set_peak_fallout(Duration::from_secs(display.peak_fall_rate_secs as u64));
        }
        if display.peak_fall_threshold_db != old.peak_fall_threshold_db {
            self.peaks.set_peak_fall_threshold(display.peak_fall_threshold_db);
        }
        self.display = display;
    }

    pub fn handle_batch_at(&mut self, mut batch: FftBatch, now: Instant) {
        self.last_batch = Some(now);
        if !self.sending_data {
            self.set_sending_data(true);
        }
        if self.display.paused {
            trace!("Paused, discarding batch");
            return;
        }

        if let Some(calibration) = &self.sweep.power_calibration {
            calibration.correct(self.sweep.gain_db as f32, &mut batch);
        }
        if self.peaks.spectrum_mut().add_new_data(&batch) {
            self.process_sweep_at(now);
        }
    }

    fn process_sweep_at(&mut self, now: Instant) {
        if self.display.spur_removal {
            let status = self.perf.time(Stage::SpurFilter, || {
                self.spur_filter.filter(self.peaks.spectrum_mut())
            });
            match status {
                Ok(FilterStatus::Calibrated { spurs }) => {
                    self.emit(Event::SpurCalibrated { spurs });
                }
                Ok(FilterStatus::Calibrating { collected, needed }) => {
                    trace!("Spur calibration {}/{}", collected, needed);
                }
                Ok(FilterStatus::Filtered) => {}
                Err(err) => error!("Spur filter failed: {err}"),
            }
        }

        if self.display.show_peaks {
            self.perf
                .time(Stage::Peaks, || self.peaks.refresh_peaks_at(now));
        }

        let spectrum = self.peaks.spectrum();
        if self.display.persistence_enabled {
            let started = Instant::now();
            self.view
                .persistence()
                .accumulate_at(spectrum, self.display.power_range_dbm, now);
            self.perf.record(Stage::Persistence, started.elapsed());
        }
        if self.display.waterfall_enabled {
            let started = Instant::now();
            self.view.waterfall().add_new_data(spectrum);
            self.perf.record(Stage::Waterfall, started.elapsed());
        }

        self.view
            .publish(SpectrumSnapshot::capture(&self.peaks, self.display.show_peaks));
        self.perf.sweep_done();
    }

    fn check_data_timeout_at(&mut self, now: Instant) {
        let Some(last) = self.last_batch else {
            return;
        };
        if self.sending_data && now.saturating_duration_since(last) > self.data_timeout {
            self.set_sending_data(false);
        }
    }

    fn set_sending_data(&mut self, sending: bool) {
        self.sending_data = sending;
        self.view.set_sending_data(sending);
        if sending {
            info!("Hardware started sending data");
            self.view.persistence().reset();
        } else {
            info!("Hardware stopped sending data");
        }
        self.emit(Event::HardwareStatus {
            sending_data: sending,
        });
    }

    fn poll_statistics_at(&mut self, now: Instant) {
        if let Some(statistics) = self.perf.poll_at(now, self.view.dropped_batches()) {
            info!("{}", statistics);
            self.view.set_statistics(statistics.clone());
            self.emit(Event::Statistics(statistics));
        }
    }

    fn emit(&self, event: Event) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("Event channel full, dropped {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceDisplay;
    use crate::waterfall::WaterfallPlot;
    use sweepiq_messages::{FrequencyRange, PowerCalibration};

    const FLOOR: f32 = -150.0;

    fn sweep_config() -> SweepConfig {
        SweepConfig {
            frequency: FrequencyRange::new(2400, 2420).unwrap(),
            bin_width_hz: 1_000_000.0,
            floor_dbm: FLOOR,
            ..Default::default()
        }
    }

    fn processor(display: DisplayConfig) -> (Processor, Arc<PipelineView>, Receiver<Event>) {
        processor_with(sweep_config(), display)
    }

    fn processor_with(
        sweep: SweepConfig,
        display: DisplayConfig,
    ) -> (Processor, Arc<PipelineView>, Receiver<Event>) {
        let view = Arc::new(PipelineView::new(
            WaterfallPlot::new(20, 8),
            PersistenceDisplay::new(20, 10, 5),
        ));
        let (event_tx, event_rx) = flume::unbounded();
        let processor = Processor::new(
            sweep,
            display,
            SpurFilterParams {
                valid_iterations: 3,
                ..Default::default()
            },
            Arc::clone(&view),
            event_tx,
            Duration::from_secs(1),
        )
        .unwrap();
        (processor, view, event_rx)
    }

    fn full_sweep(spike_bin: usize, spike_dbm: f32) -> FftBatch {
        let freq = (0..20).map(|i| 2_400_000_000.0 + i as f64 * 1e6 + 5e5).collect();
        let mut power = vec![FLOOR; 20];
        power[spike_bin] = spike_dbm;
        FftBatch::new(true, freq, 1_000_000.0, power)
    }

    #[test]
    fn test_full_sweep_publishes_snapshot() {
        let (mut processor, view, events) = processor(DisplayConfig::default());
        processor.handle_batch_at(full_sweep(5, -60.0), Instant::now());

        assert_eq!(view.spectrum_snapshot()[5].power_dbm, -60.0);
        assert_eq!(view.peak_snapshot()[5].power_dbm, -60.0);
        assert!((view.total_band_power_dbm() + 60.0).abs() < 0.01);
        assert!(matches!(
            events.try_recv(),
            Ok(Event::HardwareStatus { sending_data: true })
        ));
    }

    #[test]
    fn test_partial_batch_is_not_a_sweep() {
        let (mut processor, view, _events) = processor(DisplayConfig::default());
        let mut batch = full_sweep(5, -60.0);
        batch.full_sweep_done = false;
        processor.handle_batch_at(batch, Instant::now());

        assert_eq!(processor.peaks().spectrum().power()[5], -60.0);
        assert!(view.spectrum_snapshot().is_empty());
    }

    #[test]
    fn test_paused_discards_batches() {
        let display = DisplayConfig {
            paused: true,
            ..Default::default()
        };
        let (mut processor, view, _events) = processor(display);
        processor.handle_batch_at(full_sweep(5, -60.0), Instant::now());
        assert!(view.spectrum_snapshot().is_empty());
        assert!(view.is_sending_data());
    }

    #[test]
    fn test_power_calibration_is_applied() {
        let sweep = SweepConfig {
            power_calibration: Some(PowerCalibration::new(-50.0, -60.0, 40.0)),
            gain_db: 40,
            ..sweep_config()
        };
        let (mut processor, view, _events) = processor_with(sweep, DisplayConfig::default());
        processor.handle_batch_at(full_sweep(5, -60.0), Instant::now());
        assert_eq!(view.spectrum_snapshot()[5].power_dbm, -50.0);
    }

    #[test]
    fn test_spur_removal_calibrates_then_filters() {
        let display = DisplayConfig {
            spur_removal: true,
            ..Default::default()
        };
        let (mut processor, view, events) = processor(display);
        let now = Instant::now();
        for _ in 0..3 {
            processor.handle_batch_at(full_sweep(7, FLOOR + 10.0), now);
        }
        assert!(processor.spur_filter().is_calibrated());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, Event::SpurCalibrated { spurs: 1 })));

        processor.handle_batch_at(full_sweep(7, FLOOR + 10.0), now);
        assert!((view.spectrum_snapshot()[7].power_dbm - FLOOR).abs() < 0.01);

        // toggling the setting throws the calibration away
        processor.apply_display(DisplayConfig::default());
        assert!(!processor.spur_filter().is_calibrated());
    }

    #[test]
    fn test_hiding_peaks_resets_them() {
        let (mut processor, _view, _events) = processor(DisplayConfig::default());
        processor.handle_batch_at(full_sweep(5, -60.0), Instant::now());
        assert_eq!(processor.peaks().peak_hold()[5], -60.0);

        processor.apply_display(DisplayConfig {
            show_peaks: false,
            ..Default::default()
        });
        assert_eq!(processor.peaks().peak_hold()[5], FLOOR);
    }

    #[test]
    fn test_data_timeout_reports_stop() {
        let (mut processor, view, events) = processor(DisplayConfig::default());
        let t0 = Instant::now();
        processor.handle_batch_at(full_sweep(5, -60.0), t0);
        processor.check_data_timeout_at(t0 + Duration::from_millis(500));
        assert!(view.is_sending_data());
        processor.check_data_timeout_at(t0 + Duration::from_secs(2));
        assert!(!view.is_sending_data());

        let statuses: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                Event::HardwareStatus { sending_data } => Some(sending_data),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![true, false]);
    }

    #[test]
    fn test_run_exits_when_canceled() {
        let (processor, view, _events) = processor(DisplayConfig::default());
        let (batch_tx, batch_rx) = flume::bounded(4);
        let (_control_tx, control_rx) = flume::unbounded();
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let handle = std::thread::spawn(move || processor.run(batch_rx, control_rx, stopper));

        batch_tx.send(full_sweep(5, -60.0)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while view.spectrum_snapshot().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(view.spectrum_snapshot()[5].power_dbm, -60.0);

        cancel.cancel();
        handle.join().unwrap();
    }
}
