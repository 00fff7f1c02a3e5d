use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Receiver, Sender, TrySendError};
use log::debug;
use sweepiq_messages::FftBatch;

/// Producer half of the ingestion queue, handed to the sweep source.
///
/// Never blocks: when the queue is full the batch is dropped and counted.
#[derive(Clone)]
pub struct BatchSink {
    tx: Sender<FftBatch>,
    dropped: Arc<AtomicU64>,
}

/// Create a bounded ingestion queue.
pub fn bounded(capacity: usize) -> (BatchSink, Receiver<FftBatch>) {
    bounded_with_counter(capacity, Arc::new(AtomicU64::new(0)))
}

/// Like [`bounded`], counting drops into a counter that outlives the queue.
pub fn bounded_with_counter(
    capacity: usize,
    dropped: Arc<AtomicU64>,
) -> (BatchSink, Receiver<FftBatch>) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (BatchSink { tx, dropped }, rx)
}

impl BatchSink {
    /// Entry point for the hardware bridge. `None` arrays mean a heartbeat
    /// batch with no bins.
    ///
    /// Returns `false` once the consumer is gone.
    pub fn on_batch(
        &self,
        full_sweep_done: bool,
        freq_start_hz: Option<Vec<f64>>,
        bin_width_hz: f32,
        power_dbm: Option<Vec<f32>>,
    ) -> bool {
        let batch = match (freq_start_hz, power_dbm) {
            (Some(freq), Some(power)) => FftBatch::new(full_sweep_done, freq, bin_width_hz, power),
            _ => FftBatch::heartbeat(full_sweep_done, bin_width_hz),
        };
        self.push(batch)
    }

    pub fn push(&self, batch: FftBatch) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Ingestion queue full, dropped batch ({} total)", dropped);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Ingestion queue consumer disconnected");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
