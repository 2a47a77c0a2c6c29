//! Bus Arbiter Core - Rust Engine
//!
//! Simulates devices contending for a single shared bus under a selectable
//! arbitration policy, and reports every decision to the UI and, as UDP
//! datagrams, to any packet observer on the wire.
//!
//! # Architecture
//!
//! - **rng**: Deterministic random number generation
//! - **models**: Domain types (devices, request vectors, statistics, event log)
//! - **policy**: Winner selection (Fixed Priority, Round Robin, Daisy Chain)
//! - **requests**: Per-round request generation
//! - **events**: `BUS_EVENT` records and their UDP emitter
//! - **orchestrator**: Single-round arbiter and the worker loop around it
//! - **view**: UI messages and the state they build up
//! - **capture**: Independent listener that watches the event traffic
//!
//! # Critical Invariants
//!
//! 1. At most one device holds the bus per round, and only a requesting one
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Grant counts only ever grow, by one per granted round

// Module declarations
pub mod capture;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod requests;
pub mod rng;
pub mod view;

// Re-exports for convenience
pub use capture::{CaptureConfig, CaptureError, CaptureListener, CaptureState};
pub use events::{BusEvent, BusEventType, EventEmitter, TransportError, UdpEmitter};
pub use models::{
    device::{Device, DeviceRoster, DeviceStatus, GrantOutcome, RequestVector},
    event::{Event, EventLog},
    state::GrantStatistics,
};
pub use orchestrator::{
    Arbiter, ArbitrationLoop, EngineConfig, EngineSnapshot, LoopState, RoundResult,
    SimulationError,
};
pub use policy::{ArbitrationMode, ModeSetting, PolicyError, RotationCursor};
pub use requests::{RandomRequests, RequestError, RequestSource, ScriptedRequests};
pub use rng::RngManager;
pub use view::{BusView, RoundUpdate, UiMessage};
