//! Integration tests for the capture listener state machine.
//!
//! An in-memory capture source replays prepared field lines, so no packet
//! capture privileges or tshark install are needed.

use bus_arbiter_core::capture::{
    CaptureErrorKind, CaptureRequest, CaptureSource, FrameStream,
};
use bus_arbiter_core::events::MemorySink;
use bus_arbiter_core::{
    Arbiter, ArbitrationLoop, ArbitrationMode, BusView, CaptureError, CaptureListener,
    CaptureState, DeviceRoster, EngineConfig, UiMessage,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PATIENCE: Duration = Duration::from_secs(5);
const GRANT_HEX: &str = "4255535f4556454e54204752414e54204445564943453d446576696365203120444154413d2d";

#[derive(Clone)]
enum Script {
    /// Play these lines, then end
    Lines(Vec<String>),
    /// Repeat a valid frame until closed
    Endless,
    /// Fail to open on this interface
    NoInterface,
    /// Play these lines, then fail the read
    Broken(Vec<String>),
}

/// Capture source backed by a script.
#[derive(Clone)]
struct ScriptedCapture {
    script: Script,
    closed: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<CaptureRequest>>>,
}

impl ScriptedCapture {
    fn new(script: Script) -> Self {
        Self {
            script,
            closed: Arc::new(AtomicBool::new(false)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CaptureSource for ScriptedCapture {
    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn FrameStream>, CaptureError> {
        self.requests.lock().push(request.clone());
        match &self.script {
            Script::NoInterface => Err(CaptureError::InterfaceNotFound {
                interface: request.interface.clone(),
                detail: "No such device exists".to_string(),
            }),
            Script::Lines(lines) => Ok(Box::new(ScriptedStream {
                lines: lines.iter().cloned().collect(),
                endless: false,
                broken: false,
                closed: Arc::clone(&self.closed),
            })),
            Script::Endless => Ok(Box::new(ScriptedStream {
                lines: VecDeque::new(),
                endless: true,
                broken: false,
                closed: Arc::clone(&self.closed),
            })),
            Script::Broken(lines) => Ok(Box::new(ScriptedStream {
                lines: lines.iter().cloned().collect(),
                endless: false,
                broken: true,
                closed: Arc::clone(&self.closed),
            })),
        }
    }
}

struct ScriptedStream {
    lines: VecDeque<String>,
    endless: bool,
    broken: bool,
    closed: Arc<AtomicBool>,
}

impl FrameStream for ScriptedStream {
    fn next_line(&mut self) -> Result<Option<String>, CaptureError> {
        if self.endless {
            std::thread::sleep(Duration::from_millis(50));
            return Ok(Some(format!("127.0.0.1\t127.0.0.1\t70\t{}", GRANT_HEX)));
        }
        match self.lines.pop_front() {
            None if self.broken => Err(CaptureError::Stream("pipe closed".to_string())),
            next => Ok(next),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A path that certainly exists, standing in for the tshark executable
fn existing_source_path() -> PathBuf {
    std::env::current_exe().unwrap()
}

fn listener(script: Script, port: u16) -> (CaptureListener, ScriptedCapture, Receiver<UiMessage>) {
    let source = ScriptedCapture::new(script);
    let (tx, rx) = crossbeam_channel::unbounded();
    let listener = CaptureListener::new(Arc::new(source.clone()), port, tx);
    (listener, source, rx)
}

fn collect_until(
    rx: &Receiver<UiMessage>,
    mut done: impl FnMut(&UiMessage) -> bool,
) -> Vec<UiMessage> {
    let deadline = Instant::now() + PATIENCE;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(message) => {
                let finished = done(&message);
                seen.push(message);
                if finished {
                    return seen;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("expected message never arrived; saw {:?}", seen);
}

fn logs(messages: &[UiMessage]) -> Vec<&str> {
    messages
        .iter()
        .filter_map(|m| match m {
            UiMessage::Log(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

fn banners(messages: &[UiMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, UiMessage::Error(banner) if banner == "Capture failed - see log."))
        .count()
}

fn states(messages: &[UiMessage]) -> Vec<CaptureState> {
    messages
        .iter()
        .filter_map(|m| match m {
            UiMessage::Capture(state) => Some(*state),
            _ => None,
        })
        .collect()
}

#[test]
fn test_invalid_inputs_stay_idle() {
    let (listener, source, rx) = listener(Script::Endless, 5555);

    let cases: Vec<(&str, PathBuf)> = vec![
        ("", existing_source_path()),
        ("lo", PathBuf::new()),
        ("lo", PathBuf::from("/no/such/dir/tshark")),
    ];
    for (interface, path) in cases {
        let err = listener.toggle_capture(interface, &path).unwrap_err();
        assert_eq!(err.kind(), CaptureErrorKind::Configuration, "{}", err);
        assert!(err.guidance().is_some());
        assert_eq!(listener.state(), CaptureState::Idle);
    }

    let seen: Vec<UiMessage> = rx.try_iter().collect();
    assert!(states(&seen).is_empty());
    assert_eq!(banners(&seen), 3);
    assert_eq!(
        logs(&seen)
            .iter()
            .filter(|l| l.starts_with("[Capture error]"))
            .count(),
        3
    );
    assert!(source.requests.lock().is_empty());
}

#[test]
fn test_frames_are_rendered_and_bad_frames_skipped() {
    let lines = vec![
        format!("127.0.0.1\t127.0.0.1\t70\t{}", GRANT_HEX),
        "not a frame".to_string(),
        "127.0.0.1\t127.0.0.1\t62\t4255535f4556454e542049444c45".to_string(),
    ];
    let (listener, source, rx) = listener(Script::Lines(lines), 6000);

    assert_eq!(
        listener
            .toggle_capture("lo", existing_source_path())
            .unwrap(),
        CaptureState::Starting
    );
    let seen = collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle));

    assert_eq!(
        states(&seen),
        vec![CaptureState::Starting, CaptureState::Listening, CaptureState::Idle]
    );
    let lines = logs(&seen);
    assert_eq!(lines[0], "Starting capture on 'lo' (udp port 6000)...");
    assert!(lines.contains(
        &"[Capture] 127.0.0.1 -> 127.0.0.1 len=70 payload=BUS_EVENT GRANT DEVICE=Device 1 DATA=-"
    ));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("[Capture error] Malformed frame")));
    assert!(lines.contains(&"[Capture] 127.0.0.1 -> 127.0.0.1 len=62 payload=BUS_EVENT IDLE"));
    assert_eq!(lines.last(), Some(&"Capture stopped."));
    // A bad frame is not worth a banner
    assert_eq!(banners(&seen), 0);

    assert!(source.closed.load(Ordering::SeqCst));
    assert_eq!(source.requests.lock()[0].capture_filter(), "udp port 6000");
    assert_eq!(listener.state(), CaptureState::Idle);
}

#[test]
fn test_init_failure_reports_guidance_and_returns_idle() {
    let (listener, _source, rx) = listener(Script::NoInterface, 5555);

    listener.toggle_capture("eth9", existing_source_path()).unwrap();
    let seen = collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle));

    assert_eq!(states(&seen), vec![CaptureState::Starting, CaptureState::Idle]);
    let lines = logs(&seen);
    assert!(lines
        .iter()
        .any(|l| l.starts_with("[Capture error] Capture interface 'eth9' not found")));
    assert!(lines.iter().any(|l| l.contains("tshark -D")));
    assert_eq!(banners(&seen), 1);
    assert_eq!(listener.state(), CaptureState::Idle);
}

#[test]
fn test_stream_failure_sets_banner_and_returns_idle() {
    let lines = vec!["127.0.0.1\t127.0.0.1\t62\t4255535f4556454e542049444c45".to_string()];
    let (listener, source, rx) = listener(Script::Broken(lines), 5555);

    listener.toggle_capture("lo", existing_source_path()).unwrap();
    let seen = collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle));

    let lines = logs(&seen);
    assert!(lines.contains(&"[Capture] 127.0.0.1 -> 127.0.0.1 len=62 payload=BUS_EVENT IDLE"));
    assert!(lines.contains(&"[Capture error] Capture stream error: pipe closed"));
    assert_eq!(lines.last(), Some(&"Capture stopped."));
    assert_eq!(banners(&seen), 1);
    assert!(source.closed.load(Ordering::SeqCst));
    assert_eq!(listener.state(), CaptureState::Idle);
}

#[test]
fn test_toggle_stops_a_running_capture() {
    let (listener, source, rx) = listener(Script::Endless, 5555);

    listener.toggle_capture("lo", existing_source_path()).unwrap();
    collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Listening));
    collect_until(&rx, |m| matches!(m, UiMessage::Log(l) if l.starts_with("[Capture] 127.0.0.1")));

    assert_eq!(
        listener.toggle_capture("lo", existing_source_path()).unwrap(),
        CaptureState::Stopping
    );
    // Stopping ignores further toggles
    assert_eq!(
        listener.toggle_capture("lo", existing_source_path()).unwrap(),
        CaptureState::Stopping
    );

    let seen = collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle));
    assert!(logs(&seen).contains(&"Capture stopped."));
    assert!(source.closed.load(Ordering::SeqCst));
    assert_eq!(listener.state(), CaptureState::Idle);

    // And can be started again
    assert_eq!(
        listener.toggle_capture("lo", existing_source_path()).unwrap(),
        CaptureState::Starting
    );
    collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Listening));
    listener.toggle_capture("lo", existing_source_path()).unwrap();
    collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle));
}

#[test]
fn test_capture_failure_does_not_disturb_arbitration() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let config = EngineConfig::with_device_count(2);
    let arbiter = Arbiter::new(&config, Box::new(MemorySink::new())).unwrap();
    let arbitration =
        ArbitrationLoop::new(arbiter, ArbitrationMode::RoundRobin, Duration::from_millis(5), tx.clone());
    let capture = CaptureListener::new(
        Arc::new(ScriptedCapture::new(Script::NoInterface)),
        config.event_port,
        tx,
    );
    let mut view = BusView::new(DeviceRoster::numbered(2));

    arbitration.start();
    capture.toggle_capture("eth9", existing_source_path()).unwrap();

    for message in collect_until(&rx, |m| *m == UiMessage::Capture(CaptureState::Idle)) {
        view.apply(message);
    }
    let mut rounds_after = 0;
    for message in collect_until(&rx, |m| {
        if matches!(m, UiMessage::Round(_)) {
            rounds_after += 1;
        }
        rounds_after == 3
    }) {
        view.apply(message);
    }

    assert_eq!(view.capture_state(), CaptureState::Idle);
    assert!(view.last_snapshot().is_some());
    arbitration.stop();
}
