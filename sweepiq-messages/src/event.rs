use crate::EngineState;

/// Events sent from the engine to the presentation layer.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new acquisition session is running.
    SessionStarted(EngineState),
    /// The running session was torn down.
    SessionStopped,
    /// Hardware started or stopped delivering batches.
    HardwareStatus { sending_data: bool },
    /// Spur calibration finished with this many confirmed spurs.
    SpurCalibrated { spurs: usize },
    /// Rolling processing statistics, published once per second.
    Statistics(PipelineStatistics),
}

/// Time spent in one pipeline stage over the last statistics window.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub name: &'static str,
    pub millis: u64,
    pub calls_per_sec: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStatistics {
    pub stages: Vec<StageTiming>,
    pub sweeps_per_sec: f32,
    /// Batches dropped because the ingestion queue was full, since the engine started
    pub dropped_batches: u64,
}

impl std::fmt::Display for PipelineStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut total = 0;
        for stage in &self.stages {
            total += stage.millis;
            writeln!(
                f,
                "{} {:3}ms ({:5.1} calls/s)",
                stage.name, stage.millis, stage.calls_per_sec
            )?;
        }
        write!(
            f,
            "Total: {:4}ms / {:.1} sweeps/s / dropped {}",
            total, self.sweeps_per_sec, self.dropped_batches
        )
    }
}
