//! Self-calibrating removal of receiver spurs.
//!
//! While uncalibrated the filter copies every completed sweep into a fixed
//! arena of snapshots. Once `valid_iterations` sweeps are collected it
//! derives a per-bin correction for narrow, amplitude-stable peaks above the
//! noise floor, drops the snapshots and from then on subtracts the
//! correction from every sweep until [`SpurFilter::recalibrate`] is called.

use log::{debug, info};
use sweepiq_messages::SpurFilterOutput;

use crate::ema::ema;
use crate::error::PipelineError;
use crate::spectrum::{FrequencyAxis, SpectrumBuffer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpurFilterParams {
    /// A spur may not deviate from its average by more than this during calibration
    pub max_peak_jitter_db: f32,
    /// Minimum height above the noise floor for a spur candidate
    pub peak_threshold_above_noise_db: f32,
    /// Neighbourhood inspected on each side of a candidate
    pub max_peak_bins: usize,
    /// Number of sweeps collected before calibrating
    pub valid_iterations: usize,
}

impl Default for SpurFilterParams {
    fn default() -> Self {
        Self {
            max_peak_jitter_db: 6.0,
            peak_threshold_above_noise_db: 4.0,
            max_peak_bins: 4,
            valid_iterations: 25,
        }
    }
}

/// Outcome of one [`SpurFilter::filter`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// The sweep was recorded for calibration and left untouched.
    Calibrating { collected: usize, needed: usize },
    /// This sweep completed the calibration.
    Calibrated { spurs: usize },
    /// The correction was applied.
    Filtered,
}

/// Preallocated snapshot slots, reused by index.
#[derive(Debug, Default)]
struct SnapshotArena {
    slots: Vec<Vec<f32>>,
    filled: usize,
}

impl SnapshotArena {
    fn push(&mut self, capacity: usize, power: &[f32]) {
        if self.slots.is_empty() {
            self.slots = vec![vec![0.0; power.len()]; capacity];
        }
        self.slots[self.filled].copy_from_slice(power);
        self.filled += 1;
    }

    fn snapshots(&self) -> &[Vec<f32>] {
        &self.slots[..self.filled]
    }

    fn release(&mut self) {
        self.slots = Vec::new();
        self.filled = 0;
    }
}

#[derive(Debug)]
pub struct SpurFilter {
    params: SpurFilterParams,
    axis: FrequencyAxis,
    output: SpurFilterOutput,
    history: SnapshotArena,
    average: Vec<f32>,
    noise_floor: Vec<f32>,
    correction: Vec<f32>,
    spurs: usize,
    calibrated: bool,
}

impl SpurFilter {
    pub fn new(params: SpurFilterParams, axis: FrequencyAxis, output: SpurFilterOutput) -> Self {
        let bins = axis.len();
        Self {
            params: SpurFilterParams {
                valid_iterations: params.valid_iterations.max(1),
                ..params
            },
            axis,
            output,
            history: SnapshotArena::default(),
            average: vec![0.0; bins],
            noise_floor: vec![0.0; bins],
            correction: vec![0.0; bins],
            spurs: 0,
            calibrated: false,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Forget the calibration and start collecting sweeps again.
    pub fn recalibrate(&mut self) {
        debug!("Spur filter recalibration requested");
        self.calibrated = false;
        self.spurs = 0;
        self.history.release();
    }

    pub fn set_output(&mut self, output: SpurFilterOutput) {
        self.output = output;
    }

    pub fn correction(&self) -> &[f32] {
        &self.correction
    }

    pub fn spur_count(&self) -> usize {
        self.spurs
    }

    /// Calibrate with, or filter, one completed sweep in place.
    pub fn filter(&mut self, spectrum: &mut SpectrumBuffer) -> Result<FilterStatus, PipelineError> {
        let axis = spectrum.axis();
        if axis.bin_size_hz() != self.axis.bin_size_hz() || spectrum.len() != self.correction.len() {
            return Err(PipelineError::GeometryMismatch {
                expected_bins: self.correction.len(),
                actual_bins: spectrum.len(),
                expected_bin_hz: self.axis.bin_size_hz(),
                actual_bin_hz: axis.bin_size_hz(),
            });
        }

        if !self.calibrated {
            let needed = self.params.valid_iterations;
            self.history.push(needed, spectrum.power());
            let collected = self.history.filled;
            if collected < needed {
                return Ok(FilterStatus::Calibrating { collected, needed });
            }
            self.calibrate();
            return Ok(FilterStatus::Calibrated { spurs: self.spurs });
        }

        self.apply(spectrum.power_mut());
        Ok(FilterStatus::Filtered)
    }

    fn apply(&self, power: &mut [f32]) {
        match self.output {
            SpurFilterOutput::Corrected => power
                .iter_mut()
                .zip(&self.correction)
                .for_each(|(p, c)| *p -= c),
            SpurFilterOutput::Average => power.copy_from_slice(&self.average),
            SpurFilterOutput::NoiseFloor => power.copy_from_slice(&self.noise_floor),
            SpurFilterOutput::NoiseFloorPlusCorrection => power
                .iter_mut()
                .zip(self.noise_floor.iter().zip(&self.correction))
                .for_each(|(p, (n, c))| *p = n + c),
        }
    }

    fn calibrate(&mut self) {
        let snapshots = self.history.snapshots();
        let count = snapshots.len() as f32;
        let bins = self.average.len();

        self.average.fill(0.0);
        for snapshot in snapshots {
            self.average
                .iter_mut()
                .zip(snapshot)
                .for_each(|(avg, p)| *avg += p);
        }
        self.average.iter_mut().for_each(|avg| *avg /= count);

        self.correction.fill(0.0);
        if bins == 0 {
            self.finish_calibration(0);
            return;
        }

        // The floor is walked across frequency so that bands with different
        // sensitivity get their own floor.
        let max_bins = self.params.max_peak_bins.min(bins);
        let end = bins - max_bins;
        let order = (bins / 50).max(5) as f64;
        let threshold = self.params.peak_threshold_above_noise_db as f64;
        let mut floor = self.average[0] as f64;
        self.noise_floor[..max_bins].fill(floor as f32);

        let mut candidates = Vec::new();
        for i in max_bins..end {
            let current = self.average[i] as f64;
            // Both neighbourhoods are tested against the running floor rather
            // than the neighbouring bins, so a candidate only needs a
            // non-empty window on each side.
            let above_floor = current - floor >= threshold;
            let triggered_left = max_bins > 0 && above_floor;
            let triggered_right = max_bins > 0 && above_floor;
            if triggered_left && triggered_right {
                candidates.push(i);
            } else {
                floor = ema(current, floor, order);
            }
            self.noise_floor[i] = floor as f32;
        }
        self.noise_floor[end..].fill(floor as f32);

        let jitter = self.params.max_peak_jitter_db;
        let mut spurs = 0;
        for i in candidates {
            let stable = snapshots
                .iter()
                .all(|snapshot| (snapshot[i] - self.average[i]).abs() <= jitter);
            if stable {
                self.correction[i] = self.average[i] - self.noise_floor[i];
                spurs += 1;
            }
        }
        self.finish_calibration(spurs);
    }

    fn finish_calibration(&mut self, spurs: usize) {
        self.spurs = spurs;
        self.calibrated = true;
        self.history.release();
        info!(
            "Spur filter calibrated over {} bins, {} spurs confirmed",
            self.correction.len(),
            spurs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::tests::axis;

    const FLOOR: f32 = -100.0;
    const SPIKE: usize = 20;

    fn params(valid_iterations: usize) -> SpurFilterParams {
        SpurFilterParams {
            valid_iterations,
            ..Default::default()
        }
    }

    fn spectrum_with_spike(spike_db: f32) -> SpectrumBuffer {
        let mut spectrum = SpectrumBuffer::new(axis(1_000_000.0, 2400, 2440), FLOOR);
        spectrum.power_mut()[SPIKE] = FLOOR + spike_db;
        spectrum
    }

    fn calibrate_with(filter: &mut SpurFilter, spikes: &[f32]) {
        for (n, &spike) in spikes.iter().enumerate() {
            let mut spectrum = spectrum_with_spike(spike);
            let status = filter.filter(&mut spectrum).unwrap();
            if n + 1 < spikes.len() {
                assert_eq!(
                    status,
                    FilterStatus::Calibrating {
                        collected: n + 1,
                        needed: spikes.len()
                    }
                );
                assert_eq!(spectrum.power()[SPIKE], FLOOR + spike, "calibration must not alter input");
            } else {
                assert!(matches!(status, FilterStatus::Calibrated { .. }));
            }
        }
    }

    fn new_filter(valid_iterations: usize) -> SpurFilter {
        SpurFilter::new(
            params(valid_iterations),
            axis(1_000_000.0, 2400, 2440),
            SpurFilterOutput::Corrected,
        )
    }

    #[test]
    fn test_stable_spike_is_removed() {
        let mut filter = new_filter(5);
        calibrate_with(&mut filter, &[10.0; 5]);
        assert!(filter.is_calibrated());
        assert_eq!(filter.spur_count(), 1);

        for (i, &c) in filter.correction().iter().enumerate() {
            if i == SPIKE {
                assert!((c - 10.0).abs() < 1e-3, "correction at spike was {c}");
            } else {
                assert!(c.abs() < 1e-3, "bin {i} got correction {c}");
            }
        }

        let mut spectrum = spectrum_with_spike(10.0);
        assert_eq!(filter.filter(&mut spectrum).unwrap(), FilterStatus::Filtered);
        assert!(spectrum.power().iter().all(|&p| (p - FLOOR).abs() < 1e-3));
    }

    #[test]
    fn test_jittery_spike_is_not_a_spur() {
        let mut filter = new_filter(4);
        calibrate_with(&mut filter, &[10.0, 25.0, 10.0, 25.0]);
        assert!(filter.is_calibrated());
        assert_eq!(filter.correction()[SPIKE], 0.0);
        assert_eq!(filter.spur_count(), 0);
    }

    #[test]
    fn test_recalibrate_restarts_collection() {
        let mut filter = new_filter(2);
        calibrate_with(&mut filter, &[10.0, 10.0]);
        filter.recalibrate();
        assert!(!filter.is_calibrated());

        let mut spectrum = spectrum_with_spike(10.0);
        assert_eq!(
            filter.filter(&mut spectrum).unwrap(),
            FilterStatus::Calibrating {
                collected: 1,
                needed: 2
            }
        );
    }

    #[test]
    fn test_geometry_mismatch_is_an_error() {
        let mut filter = new_filter(2);
        let mut other = SpectrumBuffer::new(axis(500_000.0, 2400, 2440), FLOOR);
        assert!(matches!(
            filter.filter(&mut other),
            Err(PipelineError::GeometryMismatch { .. })
        ));
        let mut shorter = SpectrumBuffer::new(axis(1_000_000.0, 2400, 2430), FLOOR);
        assert!(filter.filter(&mut shorter).is_err());
    }

    #[test]
    fn test_diagnostic_outputs() {
        let mut filter = new_filter(3);
        calibrate_with(&mut filter, &[10.0; 3]);

        filter.set_output(SpurFilterOutput::Average);
        let mut spectrum = spectrum_with_spike(0.0);
        filter.filter(&mut spectrum).unwrap();
        assert!((spectrum.power()[SPIKE] - (FLOOR + 10.0)).abs() < 1e-3);

        filter.set_output(SpurFilterOutput::NoiseFloor);
        filter.filter(&mut spectrum).unwrap();
        assert!(spectrum.power().iter().all(|&p| (p - FLOOR).abs() < 1e-3));

        filter.set_output(SpurFilterOutput::NoiseFloorPlusCorrection);
        filter.filter(&mut spectrum).unwrap();
        assert!((spectrum.power()[SPIKE] - (FLOOR + 10.0)).abs() < 1e-3);
    }

    #[test]
    fn test_spectrum_shorter_than_neighbourhood() {
        let tiny = axis(1_000_000.0, 2400, 2403);
        let mut filter = SpurFilter::new(params(1), tiny, SpurFilterOutput::Corrected);
        let mut spectrum = SpectrumBuffer::new(tiny, FLOOR);
        assert_eq!(
            filter.filter(&mut spectrum).unwrap(),
            FilterStatus::Calibrated { spurs: 0 }
        );
        assert!(filter.noise_floor.iter().all(|&n| n == FLOOR));
    }
}
