//! Domain models for the bus arbitration simulator

pub mod device;
pub mod event;
pub mod state;

// Re-exports
pub use device::{Device, DeviceRoster, DeviceStatus, GrantOutcome, RequestVector};
pub use event::{Event, EventLog};
pub use state::GrantStatistics;
