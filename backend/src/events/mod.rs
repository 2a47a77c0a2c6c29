//! Bus event records and their delivery to packet observers.
//!
//! - `types`: the `BUS_EVENT` text record
//! - `emitter`: best-effort delivery over UDP (or any [`EventSink`])

pub mod emitter;
pub mod types;

pub use emitter::{
    EmitReport, EventEmitter, EventSink, MemorySink, TransportError, UdpEmitter,
    DEFAULT_EVENT_PORT,
};
pub use types::{BusEvent, BusEventType, WireError};
