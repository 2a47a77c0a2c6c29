//! Arbitration Loop - the long-running worker around [`Arbiter`].
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopped
//! ```
//!
//! `start()` while Running and `stop()` while Stopped are no-ops. `stop()`
//! does not join: the worker finishes the round in progress, sends one
//! [`UiMessage::Reset`] and parks the arbiter so the next `start()` resumes
//! with the same cursor and statistics. A `start()` that arrives before the
//! worker has parked simply keeps that worker going, so there is never more
//! than one worker per loop.
//!
//! # Contexts
//!
//! The worker owns the arbiter (and with it the rotation cursor) while it
//! runs. Everything visible goes out as [`UiMessage`]s. The mode is read
//! once per round from a [`ModeCell`]; a change lands at the next round.

use crate::models::DeviceStatus;
use crate::orchestrator::engine::{Arbiter, EngineConfig, RoundResult, SimulationError};
use crate::policy::{ArbitrationMode, ModeSetting, PolicyError};
use crate::view::{RoundUpdate, UiMessage};
use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Public loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

const UNRECOGNIZED_MODE: u8 = u8::MAX;

/// Mode shared between the control context (writer) and the worker (reader).
///
/// Known modes are a single atomic byte. An unrecognized name is kept
/// alongside so the worker can report it each round.
#[derive(Debug)]
pub struct ModeCell {
    code: AtomicU8,
    unrecognized: Mutex<String>,
}

impl ModeCell {
    pub fn new(mode: impl Into<ModeSetting>) -> Self {
        let cell = Self {
            code: AtomicU8::new(ArbitrationMode::default().code()),
            unrecognized: Mutex::new(String::new()),
        };
        cell.store(mode.into());
        cell
    }

    pub fn set(&self, mode: ArbitrationMode) {
        self.code.store(mode.code(), Ordering::Release);
    }

    fn store(&self, setting: ModeSetting) {
        match setting {
            ModeSetting::Mode(mode) => self.set(mode),
            ModeSetting::Unrecognized(name) => {
                *self.unrecognized.lock() = name;
                self.code.store(UNRECOGNIZED_MODE, Ordering::Release);
            }
        }
    }

    /// Set the mode by name. An unknown name is stored as-is (rounds fall
    /// back to Fixed Priority and report it) and also returned as an error.
    pub fn set_name(&self, name: &str) -> Result<ArbitrationMode, PolicyError> {
        match name.parse::<ArbitrationMode>() {
            Ok(mode) => {
                self.set(mode);
                Ok(mode)
            }
            Err(err) => {
                self.store(ModeSetting::Unrecognized(name.to_string()));
                Err(err)
            }
        }
    }

    pub fn load(&self) -> ModeSetting {
        let code = self.code.load(Ordering::Acquire);
        match ArbitrationMode::from_code(code) {
            Some(mode) => ModeSetting::Mode(mode),
            None => ModeSetting::Unrecognized(self.unrecognized.lock().clone()),
        }
    }
}

struct Lifecycle {
    requested: LoopState,
    /// Arbiter waiting for the next worker; `None` while a worker holds it
    parked: Option<Arbiter>,
}

struct LoopShared {
    lifecycle: Mutex<Lifecycle>,
    wake: Condvar,
    mode: ModeCell,
    round_delay: Duration,
    ui: Sender<UiMessage>,
}

impl LoopShared {
    fn send(&self, message: UiMessage) {
        // The UI side may already be gone during shutdown.
        let _ = self.ui.send(message);
    }

    fn log(&self, line: impl Into<String>) {
        self.send(UiMessage::Log(line.into()));
    }
}

/// Handle to the arbitration worker.
///
/// # Example
///
/// ```rust,no_run
/// use bus_arbiter_core::orchestrator::{ArbitrationLoop, EngineConfig};
/// use bus_arbiter_core::policy::ArbitrationMode;
///
/// let (tx, rx) = crossbeam_channel::unbounded();
/// let arbitration = ArbitrationLoop::from_config(&EngineConfig::default(), tx).unwrap();
///
/// arbitration.start();
/// arbitration.set_mode(ArbitrationMode::RoundRobin);
/// // ... UI drains `rx` ...
/// arbitration.stop();
/// # drop(rx);
/// ```
pub struct ArbitrationLoop {
    shared: Arc<LoopShared>,
    emission: Arc<AtomicBool>,
}

impl ArbitrationLoop {
    /// Loop starting in `mode`. An unrecognized name is accepted; its rounds
    /// run as Fixed Priority and report the fallback.
    pub fn new(
        arbiter: Arbiter,
        mode: impl Into<ModeSetting>,
        round_delay: Duration,
        ui: Sender<UiMessage>,
    ) -> Self {
        let mode = mode.into();
        if let ModeSetting::Unrecognized(name) = &mode {
            warn!(requested = %name, "unknown initial arbitration mode, using Fixed Priority");
        }
        let emission = arbiter.emitter().enabled_flag();
        Self {
            shared: Arc::new(LoopShared {
                lifecycle: Mutex::new(Lifecycle {
                    requested: LoopState::Stopped,
                    parked: Some(arbiter),
                }),
                wake: Condvar::new(),
                mode: ModeCell::new(mode),
                round_delay,
                ui,
            }),
            emission,
        }
    }

    /// Loop over a UDP-emitting arbiter built from `config`.
    pub fn from_config(config: &EngineConfig, ui: Sender<UiMessage>) -> Result<Self, SimulationError> {
        let arbiter = Arbiter::from_config(config)?;
        Ok(Self::new(
            arbiter,
            config.initial_mode.clone(),
            config.round_delay(),
            ui,
        ))
    }

    pub fn state(&self) -> LoopState {
        self.shared.lifecycle.lock().requested
    }

    /// Stopped → Running. Returns false if already running.
    pub fn start(&self) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.requested == LoopState::Running {
            return false;
        }
        lifecycle.requested = LoopState::Running;

        self.shared.send(UiMessage::ClearError);
        self.shared.log("Simulation started.");
        info!(mode = %self.shared.mode.load(), "simulation started");

        match lifecycle.parked.take() {
            Some(arbiter) => {
                let shared = Arc::clone(&self.shared);
                let spawned = thread::Builder::new()
                    .name("bus-arbiter".to_string())
                    .spawn(move || run_worker(shared, arbiter));
                if let Err(err) = spawned {
                    // The arbiter went down with the closure; the loop cannot run again.
                    error!(error = %err, "failed to spawn arbitration worker");
                    lifecycle.requested = LoopState::Stopped;
                    self.shared.log(format!("[Simulation error] failed to start worker: {}", err));
                    self.shared.send(UiMessage::Error("Simulation error - see log.".to_string()));
                    return false;
                }
            }
            None => {
                // Previous worker has not parked yet; it sees Running and carries on.
                self.shared.wake.notify_all();
            }
        }
        true
    }

    /// Running → Stopped. Returns false if already stopped. Does not wait.
    pub fn stop(&self) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.requested == LoopState::Stopped {
            return false;
        }
        lifecycle.requested = LoopState::Stopped;
        self.shared.wake.notify_all();
        drop(lifecycle);

        self.shared.log("Simulation stopped.");
        info!("simulation stopped");
        true
    }

    /// Whether a worker thread currently holds the arbiter.
    pub fn worker_active(&self) -> bool {
        self.shared.lifecycle.lock().parked.is_none()
    }

    pub fn set_mode(&self, mode: ArbitrationMode) {
        self.shared.mode.set(mode);
    }

    /// Set the mode by name; see [`ModeCell::set_name`].
    pub fn set_mode_name(&self, name: &str) -> Result<ArbitrationMode, PolicyError> {
        self.shared.mode.set_name(name)
    }

    pub fn mode(&self) -> ModeSetting {
        self.shared.mode.load()
    }

    pub fn set_emission_enabled(&self, enabled: bool) {
        self.emission.store(enabled, Ordering::Relaxed);
    }

    pub fn emission_enabled(&self) -> bool {
        self.emission.load(Ordering::Relaxed)
    }

    /// Run `f` against the parked arbiter. `None` while a worker holds it.
    pub fn with_parked<R>(&self, f: impl FnOnce(&Arbiter) -> R) -> Option<R> {
        self.shared.lifecycle.lock().parked.as_ref().map(f)
    }
}

impl Drop for ArbitrationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ArbitrationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationLoop")
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("round_delay", &self.shared.round_delay)
            .finish()
    }
}

fn run_worker(shared: Arc<LoopShared>, mut arbiter: Arbiter) {
    loop {
        run_one_round(&shared, &mut arbiter);

        let deadline = Instant::now() + shared.round_delay;
        let mut lifecycle = shared.lifecycle.lock();
        while lifecycle.requested == LoopState::Running {
            if shared.wake.wait_until(&mut lifecycle, deadline).timed_out() {
                break;
            }
        }
        if lifecycle.requested == LoopState::Stopped {
            shared.send(UiMessage::Reset);
            lifecycle.parked = Some(arbiter);
            return;
        }
    }
}

fn run_one_round(shared: &LoopShared, arbiter: &mut Arbiter) {
    let mode = shared.mode.load();
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| arbiter.next_round(&mode)));
    let result = attempt.unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(SimulationError::RoundPanicked(reason))
    });

    match result {
        Ok(round) => publish_round(shared, arbiter, &mode, round),
        Err(err) => {
            error!(error = %err, loop_fault = err.is_loop_fault(), "round failed");
            shared.log(format!("[Simulation error] {}", err));
            shared.send(UiMessage::Error("Simulation error - see log.".to_string()));
        }
    }
}

fn publish_round(shared: &LoopShared, arbiter: &Arbiter, mode: &ModeSetting, round: RoundResult) {
    if let Some(fallback) = &round.fallback {
        shared.log(format!("[Error] {}.", fallback));
    }

    shared.send(UiMessage::Round(RoundUpdate {
        statuses: DeviceStatus::for_round(&round.requests, &round.outcome),
        requests: round.requests.clone(),
        outcome: round.outcome,
        snapshot: arbiter.snapshot(mode),
    }));
    shared.log(round.log_line());

    for (record, err) in &round.emission.failed {
        shared.log(format!("[Event send error] {}: {}", record.kind, err));
        shared.send(UiMessage::Error("Event send failed - see log.".to_string()));
    }
}
