//! Persistence ("afterglow") display.
//!
//! Keeps a float histogram of where in the (frequency, power) plane the
//! spectrum has been recently. Every update forgets a little of the past and
//! adds one count per spectrum bin; rendering is log-compressed because the
//! counts are heavily skewed towards a few saturated pixels.

use std::time::{Duration, Instant};

use epaint::{Color32, ColorImage};
use log::{debug, info};

use crate::palette::{ColorPalette, HotIronBluePalette};
use crate::raster::blank_image;
use crate::spectrum::SpectrumBuffer;

const CALIBRATION_TIME: Duration = Duration::from_secs(1);
const ZERO_THRESHOLD: f32 = 0.01;
const LOG_IN_MIN: f32 = 1.0;
const LOG_IN_MAX: f32 = 100.0;
const NORMALIZED_MIN: f32 = 0.15;
const NORMALIZED_MAX: f32 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Calibration {
    Idle,
    Running { started: Instant, updates: u32 },
    Done,
}

pub struct PersistenceDisplay {
    width: usize,
    height: usize,
    /// Size asked for by the caller, before any shrink to the bin count
    requested: (usize, usize),
    accumulated: Vec<f32>,
    image: ColorImage,
    palette: Box<dyn ColorPalette>,
    calibration: Calibration,
    updates_per_second: f32,
    persistence_secs: u32,
}

fn map(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

impl PersistenceDisplay {
    pub fn new(width: usize, height: usize, persistence_secs: u32) -> Self {
        let mut display = Self {
            width: 0,
            height: 0,
            requested: (0, 0),
            accumulated: Vec::new(),
            image: ColorImage::default(),
            palette: Box::new(HotIronBluePalette::new()),
            calibration: Calibration::Idle,
            updates_per_second: 1.0,
            persistence_secs: persistence_secs.max(1),
        };
        display.set_image_size(width.max(1), height.max(1));
        display
    }

    /// Reallocate the raster and start a fresh rate calibration.
    pub fn set_image_size(&mut self, width: usize, height: usize) {
        if width < 1 || height < 1 {
            return;
        }
        self.requested = (width, height);
        self.calibration = Calibration::Idle;
        self.allocate(width, height);
        debug!("Persistence image set to {width}x{height}");
    }

    /// Clear the histogram and recalibrate, keeping the current raster size.
    pub fn reset(&mut self) {
        self.calibration = Calibration::Idle;
        self.allocate(self.width, self.height);
    }

    /// Like [`reset`](Self::reset), but back at the requested size. Used when
    /// the frequency axis changes.
    pub fn restart(&mut self) {
        let (width, height) = self.requested;
        self.set_image_size(width, height);
    }

    pub fn set_persistence_time(&mut self, secs: u32) {
        self.persistence_secs = secs.max(1);
    }

    pub fn persistence_time(&self) -> u32 {
        self.persistence_secs
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration == Calibration::Done
    }

    pub fn updates_per_second(&self) -> f32 {
        self.updates_per_second
    }

    pub fn size(&self) -> [usize; 2] {
        [self.width, self.height]
    }

    /// Upper bound of any accumulator cell.
    pub fn max_accumulated(&self) -> f32 {
        self.updates_per_second * self.persistence_secs as f32
    }

    pub fn accumulated(&self) -> &[f32] {
        &self.accumulated
    }

    /// Add one spectrum to the histogram. `power_range` is the (min, max) dBm
    /// window mapped onto the raster from bottom to top.
    ///
    /// The first second of calls only measures the update rate; nothing is
    /// accumulated until that is known.
    pub fn accumulate_at(&mut self, spectrum: &SpectrumBuffer, power_range: (f32, f32), now: Instant) {
        match self.calibration {
            Calibration::Idle => {
                self.calibration = Calibration::Running {
                    started: now,
                    updates: 0,
                };
                return;
            }
            Calibration::Running { started, updates } => {
                let updates = updates + 1;
                let elapsed = now.saturating_duration_since(started);
                if elapsed < CALIBRATION_TIME {
                    self.calibration = Calibration::Running { started, updates };
                    return;
                }
                self.updates_per_second = (updates as f32 / elapsed.as_secs_f32()).max(1.0);
                if spectrum.len() < self.width && !spectrum.is_empty() {
                    self.allocate(spectrum.len(), self.height);
                }
                self.calibration = Calibration::Done;
                info!(
                    "Persistence calibrated at {:.1} updates/s, raster {}x{}",
                    self.updates_per_second, self.width, self.height
                );
                return;
            }
            Calibration::Done => {}
        }

        let order = self.persistence_secs as f32 * self.updates_per_second;
        let decay = 1.0 - 2.0 / (order + 1.0);
        self.accumulated.iter_mut().for_each(|v| *v *= decay);

        let (y_min, y_max) = power_range;
        if y_max <= y_min || spectrum.is_empty() {
            return;
        }
        let cap = self.max_accumulated();
        let height = self.height as f32;
        let h_per_db = -height / (y_max - y_min);
        let bins = spectrum.len();
        for (i, &power) in spectrum.power().iter().enumerate() {
            let x = i * self.width / bins;
            let y = ((power - y_min) * h_per_db + height).floor();
            if y.is_nan() || y < 0.0 || y >= height || x >= self.width {
                continue;
            }
            let cell = &mut self.accumulated[y as usize * self.width + x];
            *cell = (*cell + 1.0).min(cap);
        }
    }

    /// Convert the histogram into the colour image and return it.
    pub fn render(&mut self) -> &ColorImage {
        let max_value = self
            .accumulated
            .iter()
            .copied()
            .fold(f32::MIN_POSITIVE, f32::max);
        let log_min = LOG_IN_MIN.log10();
        let log_max = LOG_IN_MAX.log10();

        for (value, pixel) in self.accumulated.iter_mut().zip(self.image.pixels.iter_mut()) {
            if *value < ZERO_THRESHOLD {
                *value = 0.0;
                *pixel = Color32::BLACK;
                continue;
            }
            let compressed = map(*value, 0.0, max_value, LOG_IN_MIN, LOG_IN_MAX).log10();
            let normalized = map(compressed, log_min, log_max, NORMALIZED_MIN, NORMALIZED_MAX);
            *pixel = self.palette.color_normalized(normalized);
        }
        &self.image
    }

    fn allocate(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.accumulated = vec![0.0; width * height];
        self.image = blank_image(width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::tests::axis;

    fn spectrum(power: f32) -> SpectrumBuffer {
        let mut spectrum = SpectrumBuffer::new(axis(1_000_000.0, 2400, 2420), -150.0);
        spectrum.power_mut().fill(power);
        spectrum
    }

    /// Runs the one second calibration at 10 updates/s and returns the clock.
    fn calibrate(display: &mut PersistenceDisplay, spectrum: &SpectrumBuffer) -> Instant {
        let mut now = Instant::now();
        display.accumulate_at(spectrum, (-110.0, 20.0), now);
        for _ in 0..10 {
            assert!(!display.is_calibrated());
            now += Duration::from_millis(100);
            display.accumulate_at(spectrum, (-110.0, 20.0), now);
        }
        now
    }

    #[test]
    fn test_calibration_learns_rate_and_shrinks_raster() {
        let mut display = PersistenceDisplay::new(320, 240, 2);
        let spectrum = spectrum(-50.0);
        calibrate(&mut display, &spectrum);
        assert!(display.is_calibrated());
        assert!((display.updates_per_second() - 10.0).abs() < 1e-3);
        assert_eq!(display.size(), [20, 240]);
        assert!(display.accumulated().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_accumulator_is_bounded() {
        let mut display = PersistenceDisplay::new(320, 240, 2);
        let spectrum = spectrum(-50.0);
        let mut now = calibrate(&mut display, &spectrum);
        let cap = display.max_accumulated();
        assert!((cap - 20.0).abs() < 1e-3);
        for _ in 0..500 {
            now += Duration::from_millis(100);
            display.accumulate_at(&spectrum, (-110.0, 20.0), now);
            assert!(display.accumulated().iter().all(|&v| v <= cap));
        }
        let peak = display.accumulated().iter().copied().fold(0.0, f32::max);
        assert!(peak > 1.0);
    }

    #[test]
    fn test_signal_lands_on_the_expected_row() {
        let mut display = PersistenceDisplay::new(20, 130, 5);
        let spectrum = spectrum(-50.0);
        let now = calibrate(&mut display, &spectrum);
        display.accumulate_at(&spectrum, (-110.0, 20.0), now + Duration::from_millis(100));
        // -50 dBm is 60 dB above the bottom of a 130 dB window, 1 px per dB
        let row = 130 - 60;
        for x in 0..20 {
            assert_eq!(display.accumulated()[row * 20 + x], 1.0);
        }
        assert_eq!(display.accumulated().iter().filter(|&&v| v > 0.0).count(), 20);
    }

    #[test]
    fn test_render_paints_occupied_pixels_only() {
        let mut display = PersistenceDisplay::new(20, 130, 5);
        let spectrum = spectrum(-50.0);
        let mut now = calibrate(&mut display, &spectrum);
        for _ in 0..5 {
            now += Duration::from_millis(100);
            display.accumulate_at(&spectrum, (-110.0, 20.0), now);
        }
        let image = display.render();
        assert_eq!(image.size, [20, 130]);
        let lit = image.pixels.iter().filter(|&&p| p != Color32::BLACK).count();
        assert_eq!(lit, 20);
        assert_eq!(image.pixels[0], Color32::BLACK);
    }

    #[test]
    fn test_out_of_window_power_is_skipped() {
        let mut display = PersistenceDisplay::new(20, 100, 5);
        let spectrum = spectrum(60.0);
        let now = calibrate(&mut display, &spectrum);
        display.accumulate_at(&spectrum, (-110.0, 20.0), now + Duration::from_millis(100));
        assert!(display.accumulated().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nan_power_is_skipped() {
        let mut display = PersistenceDisplay::new(20, 100, 5);
        let spectrum = spectrum(f32::NAN);
        let now = calibrate(&mut display, &spectrum);
        display.accumulate_at(&spectrum, (-110.0, 20.0), now + Duration::from_millis(100));
        assert!(display.accumulated().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reset_forces_recalibration() {
        let mut display = PersistenceDisplay::new(320, 240, 2);
        let spectrum = spectrum(-50.0);
        calibrate(&mut display, &spectrum);
        display.reset();
        assert!(!display.is_calibrated());
        assert_eq!(display.size(), [20, 240]);

        display.restart();
        assert_eq!(display.size(), [320, 240]);
    }
}
