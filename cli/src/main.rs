//! Bus Arbiter CLI
//!
//! Runs the arbitration loop headless and prints the log-line stream.
//!
//! # Example
//!
//! ```bash
//! # Ten Round Robin rounds, half a second apart, reproducible
//! bus-arbiter --mode "Round Robin" --rounds 10 --delay-ms 500 --seed 42
//!
//! # Run until stdin closes (Ctrl-D), watching the events on loopback
//! bus-arbiter --devices 6 --capture-iface lo
//! ```

use bus_arbiter_core::capture::{find_capture_source, list_interfaces, TsharkSource};
use bus_arbiter_core::{
    ArbitrationLoop, BusView, CaptureConfig, CaptureListener, CaptureState, EngineConfig,
    ModeSetting, UiMessage,
};
use clap::Parser;
use crossbeam_channel::{select, Receiver};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Bus Arbitration Simulator
///
/// Devices request a shared bus every round; the selected policy grants it
/// to one of them. Every decision is also sent as a BUS_EVENT datagram to
/// 127.0.0.1:<port>.
#[derive(Parser, Debug)]
#[command(name = "bus-arbiter")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON engine config; flags below override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of devices, named "Device 1".."Device N"
    #[arg(short = 'n', long)]
    devices: Option<usize>,

    /// Arbitration mode: "Fixed Priority", "Round Robin" or "Daisy Chain"
    #[arg(short = 'm', long)]
    mode: Option<String>,

    /// Pause between rounds in milliseconds
    #[arg(short = 'd', long)]
    delay_ms: Option<u64>,

    /// UDP port for BUS_EVENT records
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Per-device request probability (0.0-1.0)
    #[arg(long)]
    probability: Option<f64>,

    /// Random seed for reproducible runs. When omitted, one is taken from the clock.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many rounds instead of at end of stdin
    #[arg(short = 'r', long)]
    rounds: Option<u64>,

    /// Do not send BUS_EVENT records
    #[arg(long)]
    no_emit: bool,

    /// Also capture the event traffic on this interface
    #[arg(long)]
    capture_iface: Option<String>,

    /// Path to tshark; searched for when omitted
    #[arg(long)]
    tshark: Option<PathBuf>,

    /// Print the capture interfaces and exit
    #[arg(long)]
    list_interfaces: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,bus_arbiter_core=info")),
        )
        .init();

    let args = Args::parse();

    if args.list_interfaces {
        return print_interfaces(args.tshark.or_else(find_capture_source));
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let arbitration = match ArbitrationLoop::from_config(&config, tx.clone()) {
        Ok(arbitration) => arbitration,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    info!(
        devices = config.device_names.len(),
        mode = %arbitration.mode(),
        delay_ms = config.round_delay_ms,
        port = config.event_port,
        seed = config.rng_seed,
        "Starting simulation"
    );

    let capture = CaptureListener::new(Arc::new(TsharkSource), config.event_port, tx);
    if let Some(interface) = &args.capture_iface {
        let capture_config = CaptureConfig {
            source_path: args.tshark.clone(),
            interface: interface.clone(),
        };
        match capture_config.resolve_source_path() {
            // Failures are reported on the UI channel
            Some(path) => {
                let _ = capture.toggle_capture(&capture_config.interface, path);
            }
            None => warn!("tshark not found; capture disabled"),
        }
    }

    let mut view = BusView::new(config.roster());
    let stdin_closed = watch_stdin();

    arbitration.start();
    let mut rounds = 0u64;
    let finished = loop {
        select! {
            recv(rx) -> message => match message {
                Ok(message) => {
                    if matches!(message, UiMessage::Round(_)) {
                        rounds += 1;
                    }
                    show(&mut view, message);
                    if args.rounds.is_some_and(|limit| rounds >= limit) {
                        break true;
                    }
                }
                Err(_) => break false,
            },
            recv(stdin_closed) -> _ => break true,
        }
    };

    arbitration.stop();
    if finished {
        // Let the worker finish its round and park
        while let Ok(message) = rx.recv_timeout(config.round_delay() + Duration::from_secs(1)) {
            let reset = message == UiMessage::Reset;
            show(&mut view, message);
            if reset {
                break;
            }
        }
    }

    if matches!(capture.state(), CaptureState::Starting | CaptureState::Listening) {
        // Stopping ignores the interface and path
        let _ = capture.toggle_capture("", "");
    }
    for message in rx.try_iter() {
        show(&mut view, message);
    }

    println!("{}", view.stats_summary());
    ExitCode::SUCCESS
}

fn build_config(args: &Args) -> Result<EngineConfig, bus_arbiter_core::SimulationError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(name) = &args.mode {
        config.initial_mode = ModeSetting::from_name(name);
    }
    if let Some(devices) = args.devices {
        config.device_names = EngineConfig::with_device_count(devices).device_names;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.round_delay_ms = delay_ms;
    }
    if let Some(port) = args.port {
        config.event_port = port;
    }
    if let Some(probability) = args.probability {
        config.request_probability = probability;
    }
    if args.no_emit {
        config.emit_events = false;
    }
    config.rng_seed = args.seed.unwrap_or_else(clock_seed);

    config.validate()?;
    Ok(config)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(1)
}

/// Fires once stdin reaches end of file.
fn watch_stdin() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut sink = [0u8; 256];
        let mut stdin = std::io::stdin();
        while matches!(stdin.read(&mut sink), Ok(n) if n > 0) {}
        let _ = tx.send(());
    });
    rx
}

fn show(view: &mut BusView, message: UiMessage) {
    match &message {
        UiMessage::Log(line) => println!("{}", line),
        UiMessage::Error(banner) => eprintln!("! {}", banner),
        _ => {}
    }
    view.apply(message);
}

fn print_interfaces(source_path: Option<PathBuf>) -> ExitCode {
    let Some(path) = source_path else {
        eprintln!("tshark not found; pass --tshark <path>");
        return ExitCode::FAILURE;
    };
    match list_interfaces(&path) {
        Ok(interfaces) => {
            for interface in interfaces {
                println!("{}", interface);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            if let Some(hint) = err.guidance() {
                eprintln!("{}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
