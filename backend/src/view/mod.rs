//! UI-side state and the messages that feed it.
//!
//! Worker contexts (the arbitration loop, the capture listener) never touch
//! visual state. They send [`UiMessage`]s over a channel; the UI context
//! drains the channel and applies each message to its [`BusView`].

use crate::capture::CaptureState;
use crate::models::{DeviceRoster, DeviceStatus, GrantOutcome, GrantStatistics, RequestVector};
use crate::orchestrator::EngineSnapshot;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;

/// Default number of log lines a view keeps.
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

/// Per-round update for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundUpdate {
    pub requests: RequestVector,
    pub outcome: GrantOutcome,
    pub statuses: Vec<DeviceStatus>,
    pub snapshot: EngineSnapshot,
}

/// Message from a worker context to the UI context.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// A round completed
    Round(RoundUpdate),
    /// Append a line to the log
    Log(String),
    /// Show the error banner
    Error(String),
    /// Clear the error banner
    ClearError,
    /// Loop stopped; devices and arbiter back to idle, statistics kept
    Reset,
    /// Capture listener changed state
    Capture(CaptureState),
}

/// Everything the UI shows: device lights, statistics, log, error banner.
#[derive(Debug, Clone)]
pub struct BusView {
    roster: DeviceRoster,
    statuses: Vec<DeviceStatus>,
    statistics: GrantStatistics,
    last_outcome: Option<GrantOutcome>,
    last_snapshot: Option<EngineSnapshot>,
    log: VecDeque<String>,
    log_capacity: usize,
    error: Option<String>,
    capture: CaptureState,
}

impl BusView {
    pub fn new(roster: DeviceRoster) -> Self {
        Self::with_log_capacity(roster, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(roster: DeviceRoster, log_capacity: usize) -> Self {
        Self {
            statuses: vec![DeviceStatus::Idle; roster.len()],
            statistics: GrantStatistics::new(roster.len()),
            roster,
            last_outcome: None,
            last_snapshot: None,
            log: VecDeque::new(),
            log_capacity: log_capacity.max(1),
            error: None,
            capture: CaptureState::Idle,
        }
    }

    pub fn apply(&mut self, message: UiMessage) {
        match message {
            UiMessage::Round(update) => {
                self.statuses = update.statuses;
                self.statistics = GrantStatistics::from_counts(update.snapshot.grant_counts.clone());
                self.last_outcome = Some(update.outcome);
                self.last_snapshot = Some(update.snapshot);
            }
            UiMessage::Log(line) => self.push_log(line),
            UiMessage::Error(message) => self.error = Some(message),
            UiMessage::ClearError => self.error = None,
            UiMessage::Reset => {
                self.statuses.fill(DeviceStatus::Idle);
                self.last_outcome = None;
            }
            UiMessage::Capture(state) => self.capture = state,
        }
    }

    /// Apply everything currently queued; returns how many messages were applied.
    pub fn drain(&mut self, receiver: &Receiver<UiMessage>) -> usize {
        let mut applied = 0;
        for message in receiver.try_iter() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    pub fn roster(&self) -> &DeviceRoster {
        &self.roster
    }

    pub fn statuses(&self) -> &[DeviceStatus] {
        &self.statuses
    }

    pub fn statistics(&self) -> &GrantStatistics {
        &self.statistics
    }

    pub fn stats_summary(&self) -> String {
        self.statistics.summary(&self.roster)
    }

    /// Arbiter lit up: the last round granted the bus.
    pub fn bus_busy(&self) -> bool {
        matches!(self.last_outcome, Some(GrantOutcome::Granted { .. }))
    }

    pub fn last_snapshot(&self) -> Option<&EngineSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture
    }
}
