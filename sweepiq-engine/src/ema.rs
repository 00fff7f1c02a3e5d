//! Exponential moving average primitives.
//!
//! Every decay in the pipeline goes through these: peak fall-off, the spur
//! filter's noise-floor walk, the persistence raster's forgetting factor and
//! the waterfall's frame-rate estimate.

/// One EMA step with smoothing factor `k = 2 / (order + 1)`.
#[inline]
pub fn ema(current: f64, previous: f64, order: f64) -> f64 {
    let k = 2.0 / (order + 1.0);
    current * k + previous * (1.0 - k)
}

/// EMA step whose order is expressed in milliseconds.
///
/// The effective order is `order_millis / dt_millis`, so the decay per unit of
/// wall-clock time stays the same no matter how irregularly samples arrive.
/// A non-positive `dt_millis` means no smoothing: the result is `current`.
/// The order never drops below 1, so a step longer than `order_millis` lands
/// on `current` instead of overshooting it.
#[inline]
pub fn ema_time_dependent(current: f64, previous: f64, dt_millis: i64, order_millis: f64) -> f64 {
    let order = if dt_millis <= 0 {
        1.0
    } else {
        (order_millis / dt_millis as f64).max(1.0)
    };
    ema(current, previous, order)
}

/// Running EMA with a fixed order, starting at zero.
#[derive(Debug, Clone)]
pub struct Ema {
    value: f64,
    order: f64,
}

impl Ema {
    pub fn new(order: u32) -> Self {
        Self {
            value: 0.0,
            order: order as f64,
        }
    }

    pub fn add(&mut self, sample: f64) -> f64 {
        self.value = ema(sample, self.value, self.order);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_one_tracks_current() {
        assert_eq!(ema(5.0, 100.0, 1.0), 5.0);
    }

    #[test]
    fn test_ema_weights() {
        // order 3 -> k = 0.5
        assert!((ema(10.0, 0.0, 3.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_dt_disables_smoothing() {
        assert_eq!(ema_time_dependent(-40.0, -100.0, 0, 1000.0), -40.0);
        assert_eq!(ema_time_dependent(-40.0, -100.0, -5, 1000.0), -40.0);
    }

    #[test]
    fn test_step_longer_than_order_does_not_overshoot() {
        assert_eq!(ema_time_dependent(-70.0, -50.0, 3000, 1000.0), -70.0);
        assert_eq!(ema_time_dependent(-70.0, -50.0, 100, 0.0), -70.0);
    }

    #[test]
    fn test_time_dependent_is_rate_invariant() {
        let order_ms = 1000.0;
        let once = ema_time_dependent(0.0, 100.0, 20, order_ms);
        let half = ema_time_dependent(0.0, 100.0, 10, order_ms);
        let twice = ema_time_dependent(0.0, half, 10, order_ms);
        assert!(
            (once - twice).abs() < 0.01,
            "one 20ms step gave {once}, two 10ms steps gave {twice}"
        );
    }

    #[test]
    fn test_running_ema_converges() {
        let mut fps = Ema::new(3);
        for _ in 0..50 {
            fps.add(30.0);
        }
        assert!((fps.value() - 30.0).abs() < 1e-6);
    }
}
