//! Captured frame parsing
//!
//! The capture source reports one frame per line as tab-separated fields:
//!
//! ```text
//! <ip.src>\t<ip.dst>\t<frame.len>\t<udp.payload hex>
//! ```
//!
//! Addresses may be empty (non-IP frames); the payload hex may use `:`
//! separators. The payload is decoded as text since the engine only ever
//! sends `BUS_EVENT` records.

use crate::capture::CaptureError;
use crate::events::BusEvent;

/// A frame seen on the engine's port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub length: usize,
    pub payload: String,
}

impl CapturedFrame {
    /// Parse one field line.
    ///
    /// # Example
    /// ```
    /// use bus_arbiter_core::capture::CapturedFrame;
    ///
    /// let line = "127.0.0.1\t127.0.0.1\t75\t4255535f4556454e542049444c45";
    /// let frame = CapturedFrame::parse(line).unwrap();
    /// assert_eq!(frame.payload, "BUS_EVENT IDLE");
    /// ```
    pub fn parse(line: &str) -> Result<Self, CaptureError> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(CaptureError::Packet {
                line: line.to_string(),
                reason: format!("expected 4 fields, found {}", fields.len()),
            });
        }

        let address = |field: &str| {
            let field = field.trim();
            (!field.is_empty()).then(|| field.to_string())
        };

        let length = fields[2].trim().parse::<usize>().map_err(|_| CaptureError::Packet {
            line: line.to_string(),
            reason: format!("invalid frame length '{}'", fields[2]),
        })?;

        let hex_payload: String = fields[3].chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(hex_payload.trim()).map_err(|e| CaptureError::Packet {
            line: line.to_string(),
            reason: format!("payload is not hex: {}", e),
        })?;

        Ok(Self {
            src: address(fields[0]),
            dst: address(fields[1]),
            length,
            payload: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// The payload as a bus event, if it is one.
    pub fn bus_event(&self) -> Option<BusEvent> {
        self.payload.parse().ok()
    }

    /// Log line for the UI.
    pub fn render(&self) -> String {
        format!(
            "[Capture] {} -> {} len={} payload={}",
            self.src.as_deref().unwrap_or("?"),
            self.dst.as_deref().unwrap_or("?"),
            self.length,
            self.payload
        )
    }
}
