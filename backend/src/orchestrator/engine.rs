//! Arbiter Engine
//!
//! One arbitration round, end to end:
//!
//! ```text
//! For each round r:
//! 1. Obtain the request vector (one flag per device)
//! 2. Select a winner under the current mode (always called, even all-idle)
//! 3. Draw a payload byte and count the grant, if there is a winner
//! 4. Record round events
//! 5. Emit BUS_EVENT records (GRANT + DATA, or IDLE)
//! ```
//!
//! The [`Arbiter`] is synchronous and has no notion of time; the worker
//! thread in `runner` adds the delay, the UI channel and the lifecycle.
//!
//! # Example
//!
//! ```rust
//! use bus_arbiter_core::events::MemorySink;
//! use bus_arbiter_core::orchestrator::{Arbiter, EngineConfig};
//! use bus_arbiter_core::policy::ArbitrationMode;
//! use bus_arbiter_core::RequestVector;
//!
//! let sink = MemorySink::new();
//! let mut arbiter = Arbiter::new(&EngineConfig::default(), Box::new(sink.clone())).unwrap();
//!
//! let result = arbiter
//!     .run_round(
//!         &ArbitrationMode::FixedPriority.into(),
//!         RequestVector::new(vec![false, true, true, false]),
//!     )
//!     .unwrap();
//!
//! assert_eq!(result.outcome.winner(), Some(1));
//! assert_eq!(arbiter.statistics().counts(), &[0, 1, 0, 0]);
//! assert_eq!(sink.records().len(), 2);
//! ```

use crate::events::{EmitReport, EventEmitter, EventSink, TransportError, UdpEmitter, DEFAULT_EVENT_PORT};
use crate::models::event::{Event, EventLog, DEFAULT_EVENT_LOG_CAPACITY};
use crate::models::{DeviceRoster, GrantOutcome, GrantStatistics, RequestVector};
use crate::orchestrator::snapshot::EngineSnapshot;
use crate::policy::{ArbitrationMode, ModeSetting, PolicyError, RotationCursor};
use crate::requests::{RandomRequests, RequestError, RequestSource};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

// ============================================================================
// Configuration Types
// ============================================================================

/// Engine configuration
///
/// # Fields
///
/// * `device_names` - Display names; their count fixes N
/// * `initial_mode` - Mode in effect until the control surface changes it;
///   an unrecognized name runs as Fixed Priority and is reported each round
/// * `round_delay_ms` - Pause between rounds
/// * `event_port` - UDP port on 127.0.0.1 receiving BUS_EVENT records
/// * `emit_events` - Whether records are sent at start-up
/// * `request_probability` - Per-device, per-round request probability
/// * `rng_seed` - Seed for requests and payload bytes
/// * `event_log_capacity` - Round events kept in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device_names: Vec<String>,

    pub initial_mode: ModeSetting,

    pub round_delay_ms: u64,

    pub event_port: u16,

    pub emit_events: bool,

    pub request_probability: f64,

    pub rng_seed: u64,

    pub event_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_names: DeviceRoster::numbered(4).names(),
            initial_mode: ModeSetting::Mode(ArbitrationMode::FixedPriority),
            round_delay_ms: 2_000,
            event_port: DEFAULT_EVENT_PORT,
            emit_events: true,
            request_probability: 0.5,
            rng_seed: 42,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Config with `count` devices named "Device 1".."Device N".
    pub fn with_device_count(count: usize) -> Self {
        Self {
            device_names: DeviceRoster::numbered(count).names(),
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SimulationError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: EngineConfig =
            serde_json::from_str(&text).map_err(|e| SimulationError::ConfigLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.round_delay_ms)
    }

    pub fn roster(&self) -> DeviceRoster {
        DeviceRoster::from_names(self.device_names.iter().cloned())
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.device_names.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "Must have at least one device".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for name in &self.device_names {
            if name.trim().is_empty() {
                return Err(SimulationError::InvalidConfig(
                    "Device names must not be empty".to_string(),
                ));
            }
            if !names.insert(name) {
                return Err(SimulationError::InvalidConfig(format!(
                    "Duplicate device name: {}",
                    name
                )));
            }
        }

        if self.event_port == 0 {
            return Err(SimulationError::InvalidConfig(
                "event_port must be non-zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.request_probability) {
            return Err(SimulationError::InvalidConfig(format!(
                "request_probability must be within [0, 1], got {}",
                self.request_probability
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Simulation error types
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration validation error
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Config file could not be read or parsed
    #[error("Failed to load config {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Event transport could not be set up
    #[error("Event transport error: {0}")]
    Transport(#[from] TransportError),

    /// Request source failed for a round
    #[error("Request generation failed: {0}")]
    Requests(#[from] RequestError),

    /// Request vector does not cover the roster
    #[error("Request vector has {actual} entries, expected {expected}")]
    RequestWidth { expected: usize, actual: usize },

    /// A round panicked
    #[error("Round panicked: {0}")]
    RoundPanicked(String),
}

impl SimulationError {
    /// Errors that affect only the round they happened in.
    pub fn is_loop_fault(&self) -> bool {
        matches!(
            self,
            SimulationError::Requests(_)
                | SimulationError::RequestWidth { .. }
                | SimulationError::RoundPanicked(_)
        )
    }
}

// ============================================================================
// Round Result
// ============================================================================

/// Everything one round produced.
#[derive(Debug)]
pub struct RoundResult {
    /// Round number, starting at 1
    pub round: u64,

    pub requests: RequestVector,

    /// Policy that actually ran
    pub mode: ArbitrationMode,

    pub outcome: GrantOutcome,

    /// Winner's display name
    pub winner_name: Option<String>,

    /// Unknown-mode report, when the fallback was used
    pub fallback: Option<PolicyError>,

    /// Rotation cursor after the round
    pub cursor: RotationCursor,

    pub emission: EmitReport,
}

impl RoundResult {
    /// User-facing log line for the round.
    pub fn log_line(&self) -> String {
        match &self.winner_name {
            Some(name) => format!("Bus granted to {}.", name),
            None => "No requests. Bus idle.".to_string(),
        }
    }
}

// ============================================================================
// Arbiter
// ============================================================================

/// Round-by-round arbitration state: cursor, statistics, rng, event log.
pub struct Arbiter {
    roster: DeviceRoster,
    cursor: RotationCursor,
    statistics: GrantStatistics,
    rng: RngManager,
    request_source: Box<dyn RequestSource>,
    emitter: EventEmitter,
    event_log: EventLog,
    round: u64,
}

impl Arbiter {
    /// Build an arbiter emitting into `sink`, with random requests.
    pub fn new(config: &EngineConfig, sink: Box<dyn EventSink>) -> Result<Self, SimulationError> {
        config.validate()?;

        let roster = config.roster();
        let emitter = EventEmitter::new(sink, roster.clone());
        emitter.set_enabled(config.emit_events);

        Ok(Self {
            statistics: GrantStatistics::new(roster.len()),
            cursor: RotationCursor::default(),
            rng: RngManager::new(config.rng_seed),
            request_source: Box::new(RandomRequests::new(config.request_probability)),
            emitter,
            event_log: EventLog::with_capacity(config.event_log_capacity),
            round: 0,
            roster,
        })
    }

    /// Build an arbiter emitting UDP records to `127.0.0.1:<event_port>`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let sink = UdpEmitter::new(config.event_port)?;
        info!(endpoint = %sink.endpoint(), devices = config.device_names.len(), "arbiter ready");
        Self::new(config, Box::new(sink))
    }

    /// Replace the request source.
    pub fn with_request_source(mut self, source: Box<dyn RequestSource>) -> Self {
        self.request_source = source;
        self
    }

    /// Start the rotation somewhere other than device 0.
    pub fn with_cursor(mut self, cursor: RotationCursor) -> Self {
        self.cursor = cursor;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn roster(&self) -> &DeviceRoster {
        &self.roster
    }

    pub fn device_count(&self) -> usize {
        self.roster.len()
    }

    pub fn cursor(&self) -> RotationCursor {
        self.cursor
    }

    pub fn statistics(&self) -> &GrantStatistics {
        &self.statistics
    }

    /// Rounds completed so far
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn snapshot(&self, mode: &ModeSetting) -> EngineSnapshot {
        EngineSnapshot {
            round: self.round,
            mode: mode.to_string(),
            cursor: self.cursor.position(),
            device_names: self.roster.names(),
            grant_counts: self.statistics.counts().to_vec(),
            rng_state: self.rng.get_state(),
        }
    }

    // ========================================================================
    // Round Execution
    // ========================================================================

    /// Pull the next request vector from the source and run a round on it.
    pub fn next_round(&mut self, mode: &ModeSetting) -> Result<RoundResult, SimulationError> {
        let requests = self
            .request_source
            .next_requests(self.roster.len(), &mut self.rng)?;
        self.run_round(mode, requests)
    }

    /// Run one round on the given requests.
    ///
    /// Fails only when `requests` does not have one entry per device; the
    /// round counter does not move in that case.
    pub fn run_round(
        &mut self,
        mode: &ModeSetting,
        requests: RequestVector,
    ) -> Result<RoundResult, SimulationError> {
        if requests.len() != self.roster.len() {
            return Err(SimulationError::RequestWidth {
                expected: self.roster.len(),
                actual: requests.len(),
            });
        }

        self.round += 1;
        let round = self.round;
        self.event_log.log(Event::Requests {
            round,
            requests: requests.as_slice().to_vec(),
        });

        let selection = mode.resolve(&requests, &mut self.cursor);
        if let Some(PolicyError::UnknownMode { name }) = &selection.fallback {
            self.event_log.log(Event::ModeFallback {
                round,
                requested: name.clone(),
            });
        }

        let (outcome, winner_name) = match selection.winner {
            Some(device) => {
                debug_assert!(requests.is_requesting(device));
                let payload = self.rng.payload_byte();
                self.statistics.record_grant(device);
                let name = self.roster.name(device).unwrap_or_default().to_string();
                self.event_log.log(Event::Granted {
                    round,
                    device,
                    device_name: name.clone(),
                    payload,
                    mode: selection.mode.to_string(),
                });
                debug!(round, device, payload, mode = %selection.mode, "bus granted");
                (GrantOutcome::Granted { device, payload }, Some(name))
            }
            None => {
                self.event_log.log(Event::Idle {
                    round,
                    mode: selection.mode.to_string(),
                });
                debug!(round, mode = %selection.mode, "bus idle");
                (GrantOutcome::Idle, None)
            }
        };

        let emission = self.emitter.emit_outcome(&outcome);
        for (record, err) in &emission.failed {
            self.event_log.log(Event::EmissionFailed {
                round,
                record: record.to_string(),
                error: err.to_string(),
            });
        }

        Ok(RoundResult {
            round,
            requests,
            mode: selection.mode,
            outcome,
            winner_name,
            fallback: selection.fallback,
            cursor: self.cursor,
            emission,
        })
    }
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("devices", &self.roster.len())
            .field("round", &self.round)
            .field("cursor", &self.cursor)
            .field("statistics", &self.statistics)
            .field("emitter", &self.emitter)
            .finish()
    }
}
