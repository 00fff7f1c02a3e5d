use std::time::{Duration, Instant};

use sweepiq_messages::{PipelineStatistics, StageTiming};

const WINDOW: Duration = Duration::from_secs(1);

/// Timed stages of the processing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SpurFilter,
    Peaks,
    Persistence,
    Waterfall,
}

impl Stage {
    const ALL: [Stage; 4] = [
        Stage::SpurFilter,
        Stage::Peaks,
        Stage::Persistence,
        Stage::Waterfall,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::SpurFilter => "Spur.fil",
            Stage::Peaks => "Peaks",
            Stage::Persistence => "Pers.disp",
            Stage::Waterfall => "Wtrfall.upd",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    total: Duration,
    calls: u32,
}

/// Per-stage timing rolled up once per second.
#[derive(Debug)]
pub struct PerfWatch {
    entries: [Entry; 4],
    sweeps: u32,
    window_start: Instant,
}

impl PerfWatch {
    pub fn new(now: Instant) -> Self {
        Self {
            entries: [Entry::default(); 4],
            sweeps: 0,
            window_start: now,
        }
    }

    /// Run `f` and charge its duration to `stage`.
    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(stage, started.elapsed());
        out
    }

    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let entry = &mut self.entries[stage as usize];
        entry.total += elapsed;
        entry.calls += 1;
    }

    pub fn sweep_done(&mut self) {
        self.sweeps += 1;
    }

    /// Close the window if a second has passed and return its statistics.
    pub fn poll_at(&mut self, now: Instant, dropped_batches: u64) -> Option<PipelineStatistics> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return None;
        }
        let secs = elapsed.as_secs_f32();
        let stages = Stage::ALL
            .iter()
            .map(|&stage| {
                let entry = self.entries[stage as usize];
                StageTiming {
                    name: stage.name(),
                    millis: entry.total.as_millis() as u64,
                    calls_per_sec: entry.calls as f32 / secs,
                }
            })
            .collect();
        let statistics = PipelineStatistics {
            stages,
            sweeps_per_sec: self.sweeps as f32 / secs,
            dropped_batches,
        };
        self.entries = [Entry::default(); 4];
        self.sweeps = 0;
        self.window_start = now;
        Some(statistics)
    }
}
