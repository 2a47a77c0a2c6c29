//! Bus event wire format
//!
//! One space-delimited text record per datagram:
//!
//! ```text
//! BUS_EVENT <TYPE> DEVICE=<name|NONE> DATA=<byte-value|->
//! ```
//!
//! # Design Principles
//!
//! 1. **Self-describing**: readable in a packet viewer without a dissector
//! 2. **One record per datagram**: no framing, no batching
//! 3. **Names may contain spaces**: `DATA=` is located from the right, so
//!    `DEVICE=Device 2` parses back intact

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const RECORD_TAG: &str = "BUS_EVENT";
const DEVICE_NONE: &str = "NONE";
const DATA_NONE: &str = "-";

/// Record parse failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Record does not start with BUS_EVENT: {0}")]
    MissingTag(String),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Missing field {field} in record: {record}")]
    MissingField { field: &'static str, record: String },

    #[error("Invalid DATA value: {0}")]
    InvalidData(String),
}

/// Kind of bus event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusEventType {
    /// Bus granted to a device
    Grant,
    /// Granted device transferred a payload byte
    Data,
    /// No device requested
    Idle,
}

impl BusEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusEventType::Grant => "GRANT",
            BusEventType::Data => "DATA",
            BusEventType::Idle => "IDLE",
        }
    }
}

impl fmt::Display for BusEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusEventType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GRANT" => Ok(BusEventType::Grant),
            "DATA" => Ok(BusEventType::Data),
            "IDLE" => Ok(BusEventType::Idle),
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

/// A single `BUS_EVENT` record.
///
/// # Example
///
/// ```
/// use bus_arbiter_core::events::{BusEvent, BusEventType};
///
/// let grant = BusEvent::new(BusEventType::Grant, Some("Device 2".to_string()), None);
/// assert_eq!(grant.to_string(), "BUS_EVENT GRANT DEVICE=Device 2 DATA=-");
///
/// let parsed: BusEvent = "BUS_EVENT DATA DEVICE=Device 2 DATA=17".parse().unwrap();
/// assert_eq!(parsed.data, Some(17));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEvent {
    pub kind: BusEventType,
    /// Device display name; `None` renders as `NONE`
    pub device: Option<String>,
    /// Payload byte; `None` renders as `-`
    pub data: Option<u8>,
}

impl BusEvent {
    pub fn new(kind: BusEventType, device: Option<String>, data: Option<u8>) -> Self {
        Self { kind, device, data }
    }

    pub fn idle() -> Self {
        Self::new(BusEventType::Idle, None, None)
    }
}

impl fmt::Display for BusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} DEVICE={} DATA=",
            RECORD_TAG,
            self.kind,
            self.device.as_deref().unwrap_or(DEVICE_NONE)
        )?;
        match self.data {
            Some(value) => write!(f, "{}", value),
            None => f.write_str(DATA_NONE),
        }
    }
}

impl FromStr for BusEvent {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let record = s.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let rest = record
            .strip_prefix(RECORD_TAG)
            .and_then(|r| r.strip_prefix(' '))
            .ok_or_else(|| WireError::MissingTag(record.to_string()))?;

        let (kind, rest) = rest.split_once(' ').ok_or_else(|| WireError::MissingField {
            field: "DEVICE",
            record: record.to_string(),
        })?;
        let kind = kind.parse::<BusEventType>()?;

        let device_and_data = rest.strip_prefix("DEVICE=").ok_or_else(|| WireError::MissingField {
            field: "DEVICE",
            record: record.to_string(),
        })?;
        let split = device_and_data
            .rfind(" DATA=")
            .ok_or_else(|| WireError::MissingField {
                field: "DATA",
                record: record.to_string(),
            })?;
        let device = &device_and_data[..split];
        let data = &device_and_data[split + " DATA=".len()..];

        let device = match device {
            DEVICE_NONE => None,
            name => Some(name.to_string()),
        };
        let data = match data {
            DATA_NONE => None,
            value => Some(
                value
                    .parse::<u8>()
                    .map_err(|_| WireError::InvalidData(value.to_string()))?,
            ),
        };

        Ok(BusEvent { kind, device, data })
    }
}
