//! Event emission
//!
//! This module handles:
//! - Rendering grant/idle outcomes into `BUS_EVENT` records
//! - Sending each record as one datagram through an [`EventSink`]
//! - Reporting, never raising, transport failures
//!
//! Delivery is fire-and-forget: no acknowledgement, no retry. Records leave
//! in call order; UDP may still drop or reorder them.

use crate::events::types::{BusEvent, BusEventType};
use crate::models::{DeviceRoster, GrantOutcome};
use parking_lot::Mutex;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Default UDP port for event records.
pub const DEFAULT_EVENT_PORT: u16 = 5555;

/// Device name used when an index is outside the roster.
const INVALID_DEVICE: &str = "INVALID";

/// Event transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open event socket: {0}")]
    Bind(#[source] io::Error),

    #[error("Failed to send event to {endpoint}: {source}")]
    Send {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Event sink closed")]
    Closed,
}

/// Destination for rendered records.
pub trait EventSink: Send + Sync {
    fn send(&self, record: &str) -> Result<(), TransportError>;

    /// Where records go, for logs.
    fn endpoint(&self) -> String;
}

/// Sends records as UDP datagrams to a loopback port.
///
/// # Example
///
/// ```no_run
/// use bus_arbiter_core::events::{EventSink, UdpEmitter};
///
/// let emitter = UdpEmitter::new(5555).unwrap();
/// emitter.send("BUS_EVENT IDLE DEVICE=NONE DATA=-").unwrap();
/// ```
#[derive(Debug)]
pub struct UdpEmitter {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpEmitter {
    /// Emitter targeting `127.0.0.1:<port>` from an ephemeral local port.
    pub fn new(port: u16) -> Result<Self, TransportError> {
        Self::with_target(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    pub fn with_target(target: SocketAddr) -> Result<Self, TransportError> {
        let socket =
            UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).map_err(TransportError::Bind)?;
        Ok(Self { socket, target })
    }
}

impl EventSink for UdpEmitter {
    fn send(&self, record: &str) -> Result<(), TransportError> {
        self.socket
            .send_to(record.as_bytes(), self.target)
            .map(|_| ())
            .map_err(|source| TransportError::Send {
                endpoint: self.target.to_string(),
                source,
            })
    }

    fn endpoint(&self) -> String {
        format!("udp://{}", self.target)
    }
}

/// Keeps records in memory. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl EventSink for MemorySink {
    fn send(&self, record: &str) -> Result<(), TransportError> {
        self.records.lock().push(record.to_string());
        Ok(())
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

/// What happened to the records of one outcome.
#[derive(Debug, Default)]
pub struct EmitReport {
    /// Records handed to the sink successfully, in order
    pub sent: Vec<BusEvent>,
    /// Records that failed, with the reason
    pub failed: Vec<(BusEvent, TransportError)>,
    /// Emission was switched off; nothing was attempted
    pub skipped: bool,
}

impl EmitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Renders outcomes against the device roster and pushes them to a sink.
pub struct EventEmitter {
    sink: Box<dyn EventSink>,
    roster: DeviceRoster,
    enabled: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(sink: Box<dyn EventSink>, roster: DeviceRoster) -> Self {
        Self {
            sink,
            roster,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared on/off switch; the control context flips it between rounds.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> String {
        self.sink.endpoint()
    }

    /// Build the record for one event.
    pub fn record(&self, kind: BusEventType, device: Option<usize>, data: Option<u8>) -> BusEvent {
        let device = device.map(|index| {
            self.roster
                .name(index)
                .unwrap_or(INVALID_DEVICE)
                .to_string()
        });
        BusEvent::new(kind, device, data)
    }

    /// Send one record.
    ///
    /// Returns the record that was sent, or `None` when emission is off.
    pub fn emit(
        &self,
        kind: BusEventType,
        device: Option<usize>,
        data: Option<u8>,
    ) -> Result<Option<BusEvent>, (BusEvent, TransportError)> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let event = self.record(kind, device, data);
        let line = event.to_string();
        match self.sink.send(&line) {
            Ok(()) => {
                trace!(record = %line, endpoint = %self.sink.endpoint(), "event sent");
                Ok(Some(event))
            }
            Err(err) => {
                warn!(record = %line, error = %err, "event send failed");
                Err((event, err))
            }
        }
    }

    /// Emit the records for a round outcome: GRANT then DATA for a winner,
    /// a single IDLE otherwise. A failed GRANT does not suppress the DATA.
    pub fn emit_outcome(&self, outcome: &GrantOutcome) -> EmitReport {
        let mut report = EmitReport::default();
        if !self.is_enabled() {
            report.skipped = true;
            return report;
        }

        let plan: Vec<(BusEventType, Option<usize>, Option<u8>)> = match *outcome {
            GrantOutcome::Granted { device, payload } => vec![
                (BusEventType::Grant, Some(device), None),
                (BusEventType::Data, Some(device), Some(payload)),
            ],
            GrantOutcome::Idle => vec![(BusEventType::Idle, None, None)],
        };

        for (kind, device, data) in plan {
            match self.emit(kind, device, data) {
                Ok(Some(event)) => report.sent.push(event),
                Ok(None) => report.skipped = true,
                Err(failure) => report.failed.push(failure),
            }
        }
        report
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("endpoint", &self.sink.endpoint())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
