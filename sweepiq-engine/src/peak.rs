use std::time::{Duration, Instant};

use crate::ema::ema_time_dependent;
use crate::spectrum::{SpectrumBuffer, total_power_dbm};

/// Live spectrum plus a decaying peak trace over the same bins.
///
/// `peak_ema` decays smoothly toward the live spectrum. `peak_hold` is what
/// gets displayed: it jumps up immediately and only follows `peak_ema` down
/// once the two have drifted apart by more than the fall threshold.
#[derive(Debug, Clone)]
pub struct PeakSpectrum {
    spectrum: SpectrumBuffer,
    peak_ema: Vec<f32>,
    peak_hold: Vec<f32>,
    peak_fallout: Duration,
    peak_fall_threshold_db: f32,
    last_refresh: Instant,
}

impl PeakSpectrum {
    pub fn new(spectrum: SpectrumBuffer, peak_fall_threshold_db: f32, peak_fallout: Duration) -> Self {
        let floor = spectrum.floor_dbm();
        let bins = spectrum.len();
        Self {
            spectrum,
            peak_ema: vec![floor; bins],
            peak_hold: vec![floor; bins],
            peak_fallout,
            peak_fall_threshold_db,
            last_refresh: Instant::now(),
        }
    }

    pub fn spectrum(&self) -> &SpectrumBuffer {
        &self.spectrum
    }

    pub fn spectrum_mut(&mut self) -> &mut SpectrumBuffer {
        &mut self.spectrum
    }

    pub fn peak_ema(&self) -> &[f32] {
        &self.peak_ema
    }

    pub fn peak_hold(&self) -> &[f32] {
        &self.peak_hold
    }

    pub fn set_peak_fallout(&mut self, fallout: Duration) {
        self.peak_fallout = fallout;
    }

    pub fn set_peak_fall_threshold(&mut self, threshold_db: f32) {
        self.peak_fall_threshold_db = threshold_db;
    }

    /// Update both peak traces from the live spectrum. Call once per completed sweep.
    pub fn refresh_peaks(&mut self) {
        self.refresh_peaks_at(Instant::now());
    }

    pub fn refresh_peaks_at(&mut self, now: Instant) {
        let dt_millis = now
            .saturating_duration_since(self.last_refresh)
            .as_millis()
            .max(1) as i64;
        self.last_refresh = now;

        let fallout_millis = self.peak_fallout.as_millis() as f64;
        let threshold = self.peak_fall_threshold_db;
        let live = self.spectrum.power();
        for ((&power, ema), hold) in live
            .iter()
            .zip(self.peak_ema.iter_mut())
            .zip(self.peak_hold.iter_mut())
        {
            if power > *hold {
                *hold = power;
                *ema = power;
            }
            *ema = ema_time_dependent(power as f64, *ema as f64, dt_millis, fallout_millis) as f32;
            if *hold - *ema > threshold {
                *hold = *ema;
            }
        }
    }

    pub fn reset_peaks(&mut self) {
        let floor = self.spectrum.floor_dbm();
        self.peak_ema.fill(floor);
        self.peak_hold.fill(floor);
    }

    /// Total power held across the band, summed in linear milliwatts.
    pub fn total_peak_power_dbm(&self) -> f32 {
        total_power_dbm(&self.peak_hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::tests::axis;
    use sweepiq_messages::FftBatch;

    const FLOOR: f32 = -150.0;

    fn peaks() -> PeakSpectrum {
        let buffer = SpectrumBuffer::new(axis(1_000_000.0, 2400, 2420), FLOOR);
        PeakSpectrum::new(buffer, 10.0, Duration::from_millis(1000))
    }

    fn write_bin(peaks: &mut PeakSpectrum, bin: usize, power: f32) {
        let freq = peaks.spectrum().axis().frequency_hz(bin) + 10.0;
        peaks
            .spectrum_mut()
            .add_new_data(&FftBatch::new(false, vec![freq], 1_000_000.0, vec![power]));
    }

    #[test]
    fn test_peak_rises_instantly() {
        let mut peaks = peaks();
        let mut now = Instant::now();
        for power in [-120.0, -100.0, -90.0, -45.0] {
            write_bin(&mut peaks, 7, power);
            now += Duration::from_millis(100);
            peaks.refresh_peaks_at(now);
            assert_eq!(peaks.peak_hold()[7], power);
            assert!(peaks.peak_hold()[7] >= peaks.peak_ema()[7]);
        }
    }

    #[test]
    fn test_peak_decays_then_snaps_down() {
        let mut peaks = peaks();
        let mut now = Instant::now();
        write_bin(&mut peaks, 3, FLOOR + 20.0);
        now += Duration::from_millis(100);
        peaks.refresh_peaks_at(now);
        assert_eq!(peaks.peak_hold()[3], FLOOR + 20.0);

        write_bin(&mut peaks, 3, FLOOR);
        let mut previous_ema = peaks.peak_ema()[3];
        let mut snapped = false;
        for _ in 0..50 {
            now += Duration::from_millis(100);
            peaks.refresh_peaks_at(now);
            let ema = peaks.peak_ema()[3];
            let hold = peaks.peak_hold()[3];
            assert!(ema < previous_ema, "peak EMA must keep falling");
            assert!(ema > FLOOR);
            assert!(hold >= ema);
            if !snapped && hold < FLOOR + 20.0 {
                assert_eq!(hold, ema);
                snapped = true;
            }
            previous_ema = ema;
        }
        assert!(snapped, "peak hold never followed the EMA down");
        assert!(peaks.peak_ema()[3] - FLOOR < 0.1);
    }

    #[test]
    fn test_hold_stays_above_live_when_refresh_is_slower_than_fallout() {
        for (fallout, dt) in [
            (Duration::ZERO, Duration::from_millis(100)),
            (Duration::from_secs(1), Duration::from_secs(3)),
        ] {
            let mut peaks = peaks();
            peaks.set_peak_fallout(fallout);
            let mut now = Instant::now();
            write_bin(&mut peaks, 3, -50.0);
            now += dt;
            peaks.refresh_peaks_at(now);

            write_bin(&mut peaks, 3, -70.0);
            now += dt;
            peaks.refresh_peaks_at(now);
            let hold = peaks.peak_hold()[3];
            assert!(hold >= -70.0, "fallout {fallout:?} dt {dt:?}: hold {hold} below live");
            assert!(hold >= peaks.peak_ema()[3]);
        }
    }

    #[test]
    fn test_reset_peaks() {
        let mut peaks = peaks();
        write_bin(&mut peaks, 0, -10.0);
        peaks.refresh_peaks();
        peaks.reset_peaks();
        assert!(peaks.peak_hold().iter().all(|&p| p == FLOOR));
        assert!(peaks.peak_ema().iter().all(|&p| p == FLOOR));
    }

    #[test]
    fn test_total_power_sums_linear() {
        let mut peaks = peaks();
        write_bin(&mut peaks, 5, -60.0);
        peaks.refresh_peaks();
        assert!((peaks.total_peak_power_dbm() - -60.0).abs() < 0.01);

        write_bin(&mut peaks, 6, -60.0);
        peaks.refresh_peaks();
        // two equal carriers add 3 dB
        assert!((peaks.total_peak_power_dbm() - -56.99).abs() < 0.01);
    }
}
