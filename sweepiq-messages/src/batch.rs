/// One batch of FFT bins as delivered by the sweep hardware bridge.
///
/// `freq_start_hz` and `power_dbm` are parallel. Both empty means the
/// hardware reported no data (a heartbeat), which is still meaningful when
/// `full_sweep_done` is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FftBatch {
    pub full_sweep_done: bool,
    pub freq_start_hz: Vec<f64>,
    pub bin_width_hz: f32,
    pub power_dbm: Vec<f32>,
}

impl FftBatch {
    pub fn new(
        full_sweep_done: bool,
        freq_start_hz: Vec<f64>,
        bin_width_hz: f32,
        power_dbm: Vec<f32>,
    ) -> Self {
        Self {
            full_sweep_done,
            freq_start_hz,
            bin_width_hz,
            power_dbm,
        }
    }

    /// A batch carrying no bins.
    pub fn heartbeat(full_sweep_done: bool, bin_width_hz: f32) -> Self {
        Self {
            full_sweep_done,
            bin_width_hz,
            ..Default::default()
        }
    }

    pub fn has_data(&self) -> bool {
        !self.freq_start_hz.is_empty() && !self.power_dbm.is_empty()
    }

    /// Iterate over `(frequency Hz, power dBm)` pairs.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.freq_start_hz
            .iter()
            .copied()
            .zip(self.power_dbm.iter().copied())
    }
}
