//! Round event log.
//!
//! Every arbitration step leaves a typed [`Event`] behind so a session can be
//! inspected after the fact:
//! - which devices requested in a round
//! - who was granted (and with which payload) or that the bus idled
//! - mode fallbacks and failed emissions
//!
//! The log keeps a bounded window of the most recent events; the loop runs
//! indefinitely and old rounds are dropped first.
//!
//! # Example
//!
//! ```rust
//! use bus_arbiter_core::models::{Event, EventLog};
//!
//! let mut log = EventLog::with_capacity(16);
//! log.log(Event::Idle { round: 3, mode: "Fixed Priority".to_string() });
//!
//! assert_eq!(log.events_in_round(3).len(), 1);
//! assert_eq!(log.events_of_type("Idle").len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of events kept by [`EventLog::new`].
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 4096;

/// Something that happened during a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Request vector generated for the round
    Requests { round: u64, requests: Vec<bool> },

    /// Mode name did not parse; Fixed Priority was used instead
    ModeFallback { round: u64, requested: String },

    /// Bus granted to a device
    Granted {
        round: u64,
        device: usize,
        device_name: String,
        payload: u8,
        mode: String,
    },

    /// No device requested
    Idle { round: u64, mode: String },

    /// An event record could not be sent
    EmissionFailed {
        round: u64,
        record: String,
        error: String,
    },
}

impl Event {
    pub fn round(&self) -> u64 {
        match self {
            Event::Requests { round, .. }
            | Event::ModeFallback { round, .. }
            | Event::Granted { round, .. }
            | Event::Idle { round, .. }
            | Event::EmissionFailed { round, .. } => *round,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Requests { .. } => "Requests",
            Event::ModeFallback { .. } => "ModeFallback",
            Event::Granted { .. } => "Granted",
            Event::Idle { .. } => "Idle",
            Event::EmissionFailed { .. } => "EmissionFailed",
        }
    }

    /// Device the event is about, if any.
    pub fn device(&self) -> Option<usize> {
        match self {
            Event::Granted { device, .. } => Some(*device),
            _ => None,
        }
    }
}

/// Bounded, append-only log of round events.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// Log that keeps at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_LOG_CAPACITY)),
            capacity,
            dropped: 0,
        }
    }

    pub fn log(&mut self, event: Event) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events evicted to stay within capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn events_in_round(&self, round: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.round() == round).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_device(&self, device: usize) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.device() == Some(device))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
