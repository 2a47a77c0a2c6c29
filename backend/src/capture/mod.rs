//! Capture Listener - watches the engine's own traffic on the wire.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --toggle--> Starting --(source open)--> Listening
//!   ^                 |                            |
//!   |               toggle                       toggle
//!   |                 v                            v
//!   +------------- Stopping <----------------------+
//! ```
//!
//! The listener is independent of the arbitration loop: it can be missing,
//! fail to start or run forever without touching a round. It shares nothing
//! with the loop except the UI channel.

pub mod frame;
pub mod source;

pub use frame::CapturedFrame;
pub use source::{
    classify_init_failure, find_capture_source, list_interfaces, parse_interface_listing,
    CaptureRequest, CaptureSource, FrameStream, TsharkSource,
};

use crate::events::DEFAULT_EVENT_PORT;
use crate::view::UiMessage;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Listener state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Listening,
    Stopping,
}

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture interface name is empty")]
    EmptyInterface,

    #[error("Capture source path is empty")]
    EmptySourcePath,

    #[error("Capture source '{path}' does not exist")]
    SourceMissing { path: String },

    #[error("Capture source '{path}' could not be started: {detail}")]
    SourceNotFound { path: String, detail: String },

    #[error("Capture interface '{interface}' not found: {detail}")]
    InterfaceNotFound { interface: String, detail: String },

    #[error("Capture failed to start: {0}")]
    InitFailed(String),

    #[error("Malformed frame ({reason}): {line}")]
    Packet { line: String, reason: String },

    #[error("Capture stream error: {0}")]
    Stream(String),
}

/// Coarse grouping of [`CaptureError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Bad inputs; nothing was started
    Configuration,
    /// The source could not be opened
    Init,
    /// One frame could not be read; capture goes on
    Packet,
    /// The open source failed mid-capture
    Stream,
}

impl CaptureError {
    pub fn kind(&self) -> CaptureErrorKind {
        match self {
            CaptureError::EmptyInterface
            | CaptureError::EmptySourcePath
            | CaptureError::SourceMissing { .. } => CaptureErrorKind::Configuration,
            CaptureError::SourceNotFound { .. }
            | CaptureError::InterfaceNotFound { .. }
            | CaptureError::InitFailed(_) => CaptureErrorKind::Init,
            CaptureError::Packet { .. } => CaptureErrorKind::Packet,
            CaptureError::Stream(_) => CaptureErrorKind::Stream,
        }
    }

    /// What the user can do about it, where there is something to do.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            CaptureError::EmptySourcePath
            | CaptureError::SourceMissing { .. }
            | CaptureError::SourceNotFound { .. } => Some(
                "Install Wireshark (tshark) or set the capture source path to the tshark executable.",
            ),
            CaptureError::EmptyInterface | CaptureError::InterfaceNotFound { .. } => Some(
                "Choose an interface from 'tshark -D'; events go to 127.0.0.1, so use the loopback interface.",
            ),
            CaptureError::InitFailed(_) => Some(
                "Check that this user may capture packets (for example, membership in the 'wireshark' group).",
            ),
            CaptureError::Packet { .. } | CaptureError::Stream(_) => None,
        }
    }
}

fn default_interface() -> String {
    "lo".to_string()
}

/// Capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// tshark executable; discovered when unset
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            interface: default_interface(),
        }
    }
}

impl CaptureConfig {
    /// Configured path, or the first tshark found on this machine.
    pub fn resolve_source_path(&self) -> Option<PathBuf> {
        self.source_path.clone().or_else(find_capture_source)
    }
}

const CAPTURE_BANNER: &str = "Capture failed - see log.";

struct CaptureShared {
    source: Arc<dyn CaptureSource>,
    port: u16,
    state: Mutex<CaptureState>,
    running: AtomicBool,
    ui: Sender<UiMessage>,
}

impl CaptureShared {
    fn log(&self, line: impl Into<String>) {
        let _ = self.ui.send(UiMessage::Log(line.into()));
    }

    /// Caller holds the state lock.
    fn enter(&self, state: &mut CaptureState, next: CaptureState) {
        *state = next;
        let _ = self.ui.send(UiMessage::Capture(next));
    }

    /// Log line, guidance and banner for a failure that ends (or prevents)
    /// a capture. Per-frame errors only get the log line.
    fn report(&self, err: &CaptureError) {
        self.log(format!("[Capture error] {}", err));
        if let Some(hint) = err.guidance() {
            self.log(format!("[Capture] {}", hint));
        }
        let _ = self.ui.send(UiMessage::Error(CAPTURE_BANNER.to_string()));
    }
}

/// Handle to the capture worker.
///
/// # Example
///
/// ```rust,no_run
/// use bus_arbiter_core::capture::{CaptureListener, TsharkSource};
/// use std::sync::Arc;
///
/// let (tx, _rx) = crossbeam_channel::unbounded();
/// let capture = CaptureListener::new(Arc::new(TsharkSource), 5555, tx);
///
/// capture.toggle_capture("lo", "/usr/bin/tshark").unwrap(); // start
/// capture.toggle_capture("lo", "/usr/bin/tshark").unwrap(); // stop
/// ```
pub struct CaptureListener {
    shared: Arc<CaptureShared>,
}

impl CaptureListener {
    pub fn new(source: Arc<dyn CaptureSource>, port: u16, ui: Sender<UiMessage>) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                source,
                port,
                state: Mutex::new(CaptureState::Idle),
                running: AtomicBool::new(false),
                ui,
            }),
        }
    }

    /// tshark-backed listener on the default event port.
    pub fn tshark(ui: Sender<UiMessage>) -> Self {
        Self::new(Arc::new(TsharkSource), DEFAULT_EVENT_PORT, ui)
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Start when idle, stop when starting or listening, nothing while
    /// stopping. Never waits for the worker.
    ///
    /// Returns the state the listener moved to. Bad inputs leave it Idle and
    /// come back as a configuration error (also reported on the UI channel).
    pub fn toggle_capture(
        &self,
        interface: &str,
        source_path: impl AsRef<Path>,
    ) -> Result<CaptureState, CaptureError> {
        let mut state = self.shared.state.lock();
        match *state {
            CaptureState::Idle => {
                let request = CaptureRequest {
                    source_path: source_path.as_ref().to_path_buf(),
                    interface: interface.trim().to_string(),
                    port: self.shared.port,
                };
                if let Err(err) = request.validate() {
                    warn!(error = %err, "capture not started");
                    self.shared.report(&err);
                    return Err(err);
                }

                self.shared.running.store(true, Ordering::Release);
                self.shared.enter(&mut state, CaptureState::Starting);
                self.shared.log(format!(
                    "Starting capture on '{}' ({})...",
                    request.interface,
                    request.capture_filter()
                ));

                let shared = Arc::clone(&self.shared);
                let spawned = thread::Builder::new()
                    .name("bus-capture".to_string())
                    .spawn(move || run_capture(shared, request));
                if let Err(err) = spawned {
                    self.shared.running.store(false, Ordering::Release);
                    self.shared.enter(&mut state, CaptureState::Idle);
                    let err = CaptureError::InitFailed(format!("failed to start worker: {}", err));
                    self.shared.report(&err);
                    return Err(err);
                }
                Ok(CaptureState::Starting)
            }
            CaptureState::Starting | CaptureState::Listening => {
                self.shared.running.store(false, Ordering::Release);
                self.shared.enter(&mut state, CaptureState::Stopping);
                self.shared.log("Capture stopping...");
                info!("capture stop requested");
                Ok(CaptureState::Stopping)
            }
            CaptureState::Stopping => Ok(CaptureState::Stopping),
        }
    }
}

impl Drop for CaptureListener {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for CaptureListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureListener")
            .field("state", &self.state())
            .field("port", &self.shared.port)
            .finish()
    }
}

fn run_capture(shared: Arc<CaptureShared>, request: CaptureRequest) {
    let mut stream = match shared.source.open(&request) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, interface = %request.interface, "capture failed to start");
            shared.report(&err);
            let mut state = shared.state.lock();
            shared.running.store(false, Ordering::Release);
            shared.enter(&mut state, CaptureState::Idle);
            return;
        }
    };

    {
        let mut state = shared.state.lock();
        if *state == CaptureState::Starting {
            shared.enter(&mut state, CaptureState::Listening);
            info!(interface = %request.interface, port = request.port, "capture listening");
        }
    }

    let mut frames = 0u64;
    while shared.running.load(Ordering::Acquire) {
        match stream.next_line() {
            Ok(Some(line)) => match CapturedFrame::parse(&line) {
                Ok(frame) => {
                    frames += 1;
                    shared.log(frame.render());
                }
                Err(err) => {
                    debug!(error = %err, "skipping malformed frame");
                    shared.log(format!("[Capture error] {}", err));
                }
            },
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "capture stream failed");
                shared.report(&err);
                break;
            }
        }
    }

    stream.close();
    info!(frames, "capture stopped");

    let mut state = shared.state.lock();
    shared.running.store(false, Ordering::Release);
    shared.log("Capture stopped.");
    shared.enter(&mut state, CaptureState::Idle);
}
