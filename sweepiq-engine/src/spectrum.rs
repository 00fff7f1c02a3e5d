use sweepiq_messages::{ConfigError, Decibels, FftBatch, FrequencyRange, SweepConfig};

/// Linear frequency axis shared by every buffer of one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAxis {
    bin_size_hz: f32,
    range: FrequencyRange,
    bins: usize,
}

impl FrequencyAxis {
    pub fn new(bin_size_hz: f32, range: FrequencyRange) -> Result<Self, ConfigError> {
        if !bin_size_hz.is_finite() || bin_size_hz <= 0.0 {
            return Err(ConfigError::InvalidBinWidth(bin_size_hz));
        }
        let bins = (range.span().as_hz() as f64 / bin_size_hz as f64).ceil() as usize;
        Ok(Self {
            bin_size_hz,
            range,
            bins,
        })
    }

    pub fn from_config(config: &SweepConfig) -> Result<Self, ConfigError> {
        Self::new(config.bin_width_hz, config.frequency)
    }

    pub fn bin_size_hz(&self) -> f32 {
        self.bin_size_hz
    }

    pub fn range(&self) -> FrequencyRange {
        self.range
    }

    pub fn start_hz(&self) -> f64 {
        self.range.start().as_hz() as f64
    }

    pub fn len(&self) -> usize {
        self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.bins == 0
    }

    /// Absolute frequency in Hz at the start of bin `index`.
    pub fn frequency_hz(&self, index: usize) -> f64 {
        self.start_hz() + self.bin_size_hz as f64 * index as f64
    }

    /// Bin containing `freq_hz`, or `None` outside the swept span.
    pub fn index_of(&self, freq_hz: f64) -> Option<usize> {
        let index = ((freq_hz - self.start_hz()) / self.bin_size_hz as f64).floor();
        if index.is_nan() || index < 0.0 || index >= self.bins as f64 {
            return None;
        }
        Some(index as usize)
    }
}

/// Fixed-size array of power samples addressed by absolute frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBuffer {
    axis: FrequencyAxis,
    power: Vec<f32>,
    floor_dbm: f32,
}

impl SpectrumBuffer {
    pub fn new(axis: FrequencyAxis, floor_dbm: f32) -> Self {
        Self {
            axis,
            power: vec![floor_dbm; axis.len()],
            floor_dbm,
        }
    }

    /// Write every bin of the batch into the buffer.
    ///
    /// Samples outside the span are ignored. Returns whether the batch
    /// completes a sweep.
    pub fn add_new_data(&mut self, batch: &FftBatch) -> bool {
        for (freq_hz, power) in batch.bins() {
            if let Some(index) = self.axis.index_of(freq_hz) {
                self.power[index] = power;
            }
        }
        batch.full_sweep_done
    }

    pub fn reset(&mut self) {
        self.power.fill(self.floor_dbm);
    }

    pub fn axis(&self) -> &FrequencyAxis {
        &self.axis
    }

    pub fn floor_dbm(&self) -> f32 {
        self.floor_dbm
    }

    pub fn power(&self) -> &[f32] {
        &self.power
    }

    pub fn power_mut(&mut self) -> &mut [f32] {
        &mut self.power
    }

    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Total power across the band in dBm.
    pub fn total_power_dbm(&self) -> f32 {
        total_power_dbm(&self.power)
    }
}

/// Sum dBm values in linear milliwatts and convert back to dBm.
pub fn total_power_dbm(power: &[f32]) -> f32 {
    let milliwatts: f64 = power.iter().map(|&p| Decibels(p).to_milliwatts()).sum();
    Decibels::from_milliwatts(milliwatts).as_db()
}
