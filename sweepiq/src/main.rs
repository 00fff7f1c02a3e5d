use sweepiq_engine::{Engine, EngineConfig, SyntheticSweep};
use sweepiq_messages::{Command, Event, FrequencyRange};

use clap::Parser;
use log::{LevelFilter, info, warn};
use std::io::Write;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "sweepiq")]
#[command(about = "Headless swept-spectrum pipeline fed by a synthetic sweep")]
#[command(version = "0.1.0")]
struct Args {
    /// Start of the swept range in MHz
    #[arg(long, default_value = "2400")]
    start_mhz: u32,

    /// End of the swept range in MHz
    #[arg(long, default_value = "2500")]
    stop_mhz: u32,

    /// FFT bin width in Hz
    #[arg(long, default_value = "100000")]
    bin_hz: f32,

    /// Seconds to run before stopping
    #[arg(long, default_value = "10")]
    seconds: u64,

    /// Enable spur removal
    #[arg(long)]
    spur_removal: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .filter_module("sweepiq_engine", LevelFilter::Info)
        .filter_module("sweepiq", LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::default();
    config.sweep.frequency = FrequencyRange::new(args.start_mhz, args.stop_mhz)?;
    config.sweep.bin_width_hz = args.bin_hz;
    config.display.spur_removal = args.spur_removal;

    // Create flume channels for bidirectional communication
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::bounded(64);

    let engine = Engine::new(cmd_rx, event_tx, config, Box::new(SyntheticSweep::new()));
    let view = engine.view();

    // Spawn engine thread
    let engine_handle = std::thread::spawn(move || engine.run());

    // Stand in for a presentation layer: drain events and pull snapshots
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut last_report = Instant::now();
    while Instant::now() < deadline {
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Event::SessionStarted(state)) => info!(
                "Sweeping {} to {} with {} bins",
                state.start_frequency, state.stop_frequency, state.bin_count
            ),
            Ok(Event::SpurCalibrated { spurs }) => info!("{} spurs removed", spurs),
            Ok(Event::HardwareStatus { sending_data }) => {
                info!("Hardware sending data: {}", sending_data)
            }
            Ok(_) | Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => {
                warn!("Engine closed its event channel");
                break;
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let snapshot = view.snapshot();
            if let Some(strongest) = snapshot
                .spectrum
                .iter()
                .max_by(|a, b| a.power_dbm.total_cmp(&b.power_dbm))
            {
                info!(
                    "Strongest {:.1} dBm at {:.3} MHz, band power {:.1} dBm",
                    strongest.power_dbm, strongest.frequency_mhz, snapshot.total_power_dbm
                );
            }
            let persistence = view.persistence_frame();
            info!(
                "{} / persistence {}x{}",
                view.rendering_info(),
                persistence.size[0],
                persistence.size[1]
            );
        }
    }

    let _ = cmd_tx.send(Command::Stop);

    // Wait for engine thread to finish
    engine_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Engine thread panicked"))??;

    Ok(())
}
