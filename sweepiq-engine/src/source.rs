use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;
use sweepiq_messages::SweepConfig;

use crate::ingest::BatchSink;
use crate::spectrum::FrequencyAxis;

/// Shared stop flag for the acquisition and processing threads of one session.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Producer of raw FFT batches, usually a bridge to sweep hardware.
///
/// `run` pushes batches into `sink` until `cancel` fires or the device goes
/// away. Returning while the session is still active makes the engine call it
/// again after a retry delay.
pub trait SweepSource: Send {
    fn run(
        &mut self,
        config: &SweepConfig,
        sink: &BatchSink,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;
}

/// Software sweep: a jittery noise floor, one steady spur and one carrier
/// whose level breathes slowly.
#[derive(Debug, Clone)]
pub struct SyntheticSweep {
    pub noise_floor_dbm: f32,
    pub bins_per_batch: usize,
    pub sweep_interval: Duration,
    rng: u64,
    phase: f32,
}

impl Default for SyntheticSweep {
    fn default() -> Self {
        Self {
            noise_floor_dbm: -95.0,
            bins_per_batch: 256,
            sweep_interval: Duration::from_millis(40),
            rng: 0x9e37_79b9_7f4a_7c15,
            phase: 0.0,
        }
    }
}

impl SyntheticSweep {
    pub fn new() -> Self {
        Self::default()
    }

    // xorshift64, uniform in -1..1
    fn jitter(&mut self) -> f32 {
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        (self.rng >> 40) as f32 / (1u64 << 23) as f32 - 1.0
    }

    fn sweep(&mut self, axis: &FrequencyAxis) -> Vec<f32> {
        let bins = axis.len();
        let spur = bins / 4;
        let carrier = bins / 2;
        self.phase = (self.phase + 0.05) % std::f32::consts::TAU;
        let carrier_dbm = -50.0 + 10.0 * self.phase.sin();
        (0..bins)
            .map(|i| {
                let noise = self.noise_floor_dbm + 2.0 * self.jitter();
                if i == spur {
                    self.noise_floor_dbm + 12.0
                } else if i == carrier {
                    carrier_dbm + self.jitter()
                } else {
                    noise
                }
            })
            .collect()
    }
}

impl SweepSource for SyntheticSweep {
    fn run(
        &mut self,
        config: &SweepConfig,
        sink: &BatchSink,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let axis = FrequencyAxis::from_config(config)?;
        let half_bin = config.bin_width_hz as f64 / 2.0;
        let chunk = self.bins_per_batch.max(1);
        debug!(
            "Synthetic sweep over {} with {} bins",
            config.frequency,
            axis.len()
        );

        while !cancel.is_canceled() {
            let power = self.sweep(&axis);
            let chunks = power.len().div_ceil(chunk);
            for (n, block) in power.chunks(chunk).enumerate() {
                let first = n * chunk;
                let freq = (first..first + block.len())
                    .map(|i| axis.frequency_hz(i) + half_bin)
                    .collect();
                let last = n + 1 == chunks;
                if !sink.on_batch(last, Some(freq), config.bin_width_hz, Some(block.to_vec())) {
                    return Ok(());
                }
            }
            thread::sleep(self.sweep_interval);
        }
        Ok(())
    }
}
