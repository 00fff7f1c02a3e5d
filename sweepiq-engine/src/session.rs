//! Session lifecycle: the launcher thread and the threads of one session.
//!
//! Restart requests go through a one-slot queue. A request that arrives
//! while another is still pending replaces it, so a burst of setting changes
//! costs a single restart.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use sweepiq_messages::{DisplayConfig, EngineState, Event, SweepConfig};

use crate::ingest;
use crate::processing::{Control, Processor};
use crate::source::{CancellationToken, SweepSource};
use crate::spur_filter::SpurFilterParams;
use crate::view::PipelineView;

const RETRY_POLL: Duration = Duration::from_millis(20);

pub(crate) type SharedSource = Arc<Mutex<Box<dyn SweepSource>>>;

/// Display settings plus the control channel of the running session.
///
/// Kept under one lock so a session never starts with settings older than
/// the last update sent to it.
#[derive(Debug)]
pub(crate) struct SessionSettings {
    pub display: DisplayConfig,
    control: Option<Sender<Control>>,
}

impl SessionSettings {
    pub fn new(display: DisplayConfig) -> Self {
        Self {
            display,
            control: None,
        }
    }

    /// Forward the current display settings to the running session, if any.
    pub fn push(&self) {
        if let Some(control) = &self.control {
            if control.send(Control::Display(self.display.clone())).is_err() {
                debug!("Processing thread gone, display update not delivered");
            }
        }
    }
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(err) => {
            error!("Lock poisoned: {err}");
            err.into_inner()
        }
    }
}

/// Everything a session needs that outlives it.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub source: SharedSource,
    pub view: Arc<PipelineView>,
    pub event_tx: Sender<Event>,
    pub settings: Arc<Mutex<SessionSettings>>,
    pub spur: SpurFilterParams,
    pub queue_capacity: usize,
    pub retry_delay: Duration,
    pub data_timeout: Duration,
}

impl SessionContext {
    fn emit(&self, event: Event) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            debug!("Event channel full, dropped {:?}", event);
        }
    }
}

/// The acquisition and processing threads of one sweep configuration.
pub(crate) struct Session {
    cancel: CancellationToken,
    acquisition: Option<JoinHandle<()>>,
    processing: Option<JoinHandle<()>>,
    settings: Arc<Mutex<SessionSettings>>,
}

impl Session {
    pub fn start(config: SweepConfig, ctx: &SessionContext) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = flume::unbounded();
        let processor = {
            let mut settings = lock(&ctx.settings);
            let processor = Processor::new(
                config.clone(),
                settings.display.clone(),
                ctx.spur,
                Arc::clone(&ctx.view),
                ctx.event_tx.clone(),
                ctx.data_timeout,
            )?;
            settings.control = Some(control_tx);
            processor
        };
        let state = EngineState {
            start_frequency: config.frequency.start(),
            stop_frequency: config.frequency.stop(),
            bin_width_hz: config.bin_width_hz,
            bin_count: processor.axis().len(),
            sweep_config: config.clone(),
        };
        ctx.view.persistence().restart();

        let (sink, batches) = ingest::bounded_with_counter(ctx.queue_capacity, ctx.view.dropped_counter());
        let cancel = CancellationToken::new();

        let processing = {
            let cancel = cancel.clone();
            thread::spawn(move || processor.run(batches, control_rx, cancel))
        };

        let acquisition = {
            let cancel = cancel.clone();
            let config = config.clone();
            let source = Arc::clone(&ctx.source);
            let retry_delay = ctx.retry_delay;
            thread::spawn(move || {
                while !cancel.is_canceled() {
                    let result = lock(&source).run(&config, &sink, &cancel);
                    if cancel.is_canceled() {
                        break;
                    }
                    match result {
                        Ok(()) => warn!("Sweep source stopped, restarting in {:?}", retry_delay),
                        Err(err) => warn!("Sweep source failed: {err:#}, restarting in {:?}", retry_delay),
                    }
                    let resume_at = Instant::now() + retry_delay;
                    while !cancel.is_canceled() && Instant::now() < resume_at {
                        thread::sleep(RETRY_POLL);
                    }
                }
                debug!("Acquisition thread exiting");
            })
        };

        info!(
            "Session started: {} at {:.1} kHz bins ({} bins)",
            config.frequency,
            config.bin_width_hz / 1000.0,
            state.bin_count
        );
        ctx.emit(Event::SessionStarted(state));

        Ok(Self {
            cancel,
            acquisition: Some(acquisition),
            processing: Some(processing),
            settings: Arc::clone(&ctx.settings),
        })
    }

    /// Cancel both threads and wait for them. Safe to call more than once.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        let mut stopped = false;
        for (name, handle) in [
            ("acquisition", self.acquisition.take()),
            ("processing", self.processing.take()),
        ] {
            if let Some(handle) = handle {
                stopped = true;
                if handle.join().is_err() {
                    error!("Session {name} thread panicked");
                }
            }
        }
        if stopped {
            lock(&self.settings).control = None;
            info!("Session stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Launch {
    Start(SweepConfig),
    Shutdown,
}

/// Single-slot request queue in front of the launcher thread.
#[derive(Clone)]
pub(crate) struct LaunchSlot {
    tx: Sender<Launch>,
    rx: Receiver<Launch>,
}

impl LaunchSlot {
    pub fn new() -> Self {
        let (tx, rx) = flume::bounded(1);
        Self { tx, rx }
    }

    /// Queue `request`, replacing one that has not been picked up yet.
    pub fn request(&self, mut request: Launch) {
        loop {
            match self.tx.try_send(request) {
                Ok(()) => return,
                Err(TrySendError::Full(pending)) => {
                    if let Ok(replaced) = self.rx.try_recv() {
                        debug!("Coalescing launch request {:?}", replaced);
                    }
                    request = pending;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn receiver(&self) -> Receiver<Launch> {
        self.rx.clone()
    }
}

/// Owns the running session; restarts it on every request.
pub(crate) struct Launcher {
    slot: LaunchSlot,
    handle: Option<JoinHandle<()>>,
}

impl Launcher {
    pub fn spawn(ctx: SessionContext) -> Self {
        let slot = LaunchSlot::new();
        let requests = slot.receiver();
        let handle = thread::spawn(move || launcher_loop(requests, ctx));
        Self {
            slot,
            handle: Some(handle),
        }
    }

    pub fn restart(&self, config: SweepConfig) {
        self.slot.request(Launch::Start(config));
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Stop the running session and the launcher thread.
    pub fn shutdown(&mut self) {
        self.slot.request(Launch::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Launcher thread panicked");
            }
        }
    }
}

fn launcher_loop(requests: Receiver<Launch>, ctx: SessionContext) {
    let mut session: Option<Session> = None;
    while let Ok(request) = requests.recv() {
        if let Some(mut running) = session.take() {
            running.stop();
            ctx.emit(Event::SessionStopped);
        }
        match request {
            Launch::Start(config) => match Session::start(config, &ctx) {
                Ok(started) => session = Some(started),
                Err(err) => error!("Could not start session: {err:#}"),
            },
            Launch::Shutdown => break,
        }
    }
    if let Some(mut running) = session.take() {
        running.stop();
        ctx.emit(Event::SessionStopped);
    }
    debug!("Launcher thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweepiq_messages::FrequencyRange;

    fn start(stop_mhz: u32) -> Launch {
        Launch::Start(SweepConfig {
            frequency: FrequencyRange::new(2400, stop_mhz).unwrap(),
            ..Default::default()
        })
    }

    #[test]
    fn test_slot_keeps_latest_request() {
        let slot = LaunchSlot::new();
        slot.request(start(2410));
        slot.request(start(2420));
        slot.request(start(2430));

        let rx = slot.receiver();
        match rx.try_recv() {
            Ok(Launch::Start(config)) => assert_eq!(config.frequency.stop_mhz(), 2430),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_replaces_pending_start() {
        let slot = LaunchSlot::new();
        slot.request(start(2410));
        slot.request(Launch::Shutdown);
        assert!(matches!(slot.receiver().try_recv(), Ok(Launch::Shutdown)));
    }
}
