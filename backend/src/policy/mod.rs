//! Arbitration Policy Module
//!
//! Decides which requesting device gets the bus for a round.
//!
//! # Overview
//!
//! Each round the loop hands the full request vector to the selector,
//! including all-false vectors. "No winner" is a normal outcome; no policy
//! ever panics on an empty or all-idle vector.
//!
//! Available policies:
//! 1. **FixedPriority**: lowest index wins
//! 2. **RoundRobin**: first requester at or after the rotation cursor wins;
//!    the cursor then moves just past the winner
//! 3. **DaisyChain**: highest index wins (the grant line propagates from the
//!    far end of the bus)
//!
//! # Policy Interface
//!
//! All policies implement [`ArbitrationPolicy`]:
//! ```rust
//! use bus_arbiter_core::policy::{ArbitrationPolicy, RotationCursor};
//! use bus_arbiter_core::RequestVector;
//!
//! struct LastOneWins;
//!
//! impl ArbitrationPolicy for LastOneWins {
//!     fn select(&self, requests: &RequestVector, _cursor: &mut RotationCursor) -> Option<usize> {
//!         requests.requesting().last()
//!     }
//! }
//! ```
//!
//! # Mode names
//!
//! The control surface may hand over a mode by name. A name that does not
//! parse falls back to Fixed Priority, and the fallback is always reported
//! (see [`select_named`]) so it can never be mistaken for a deliberate
//! Fixed Priority choice.

use crate::models::RequestVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub mod daisy_chain;
pub mod fixed_priority;
pub mod round_robin;

pub use daisy_chain::DaisyChainPolicy;
pub use fixed_priority::FixedPriorityPolicy;
pub use round_robin::RoundRobinPolicy;

/// Policy-level errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown mode '{name}', using Fixed Priority")]
    UnknownMode { name: String },
}

/// Which policy governs winner selection.
///
/// Serialized as its display name and deserialized through [`FromStr`], so
/// config files accept the same spellings as the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArbitrationMode {
    #[default]
    FixedPriority,
    RoundRobin,
    DaisyChain,
}

impl ArbitrationMode {
    pub const ALL: [ArbitrationMode; 3] = [
        ArbitrationMode::FixedPriority,
        ArbitrationMode::RoundRobin,
        ArbitrationMode::DaisyChain,
    ];

    /// Name shown to users ("Fixed Priority", ...).
    pub fn display_name(&self) -> &'static str {
        match self {
            ArbitrationMode::FixedPriority => "Fixed Priority",
            ArbitrationMode::RoundRobin => "Round Robin",
            ArbitrationMode::DaisyChain => "Daisy Chain",
        }
    }

    /// Compact code for lock-free storage.
    pub fn code(&self) -> u8 {
        match self {
            ArbitrationMode::FixedPriority => 0,
            ArbitrationMode::RoundRobin => 1,
            ArbitrationMode::DaisyChain => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ArbitrationMode::FixedPriority),
            1 => Some(ArbitrationMode::RoundRobin),
            2 => Some(ArbitrationMode::DaisyChain),
            _ => None,
        }
    }

    fn policy(&self) -> &'static dyn ArbitrationPolicy {
        match self {
            ArbitrationMode::FixedPriority => &FixedPriorityPolicy,
            ArbitrationMode::RoundRobin => &RoundRobinPolicy,
            ArbitrationMode::DaisyChain => &DaisyChainPolicy,
        }
    }
}

impl fmt::Display for ArbitrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ArbitrationMode {
    type Err = PolicyError;

    /// Accepts display names and identifier spellings, ignoring case,
    /// spaces, dashes and underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "fixedpriority" | "fixed" => Ok(ArbitrationMode::FixedPriority),
            "roundrobin" | "rr" => Ok(ArbitrationMode::RoundRobin),
            "daisychain" | "daisy" => Ok(ArbitrationMode::DaisyChain),
            _ => Err(PolicyError::UnknownMode {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ArbitrationMode {
    type Error = PolicyError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<ArbitrationMode> for String {
    fn from(mode: ArbitrationMode) -> Self {
        mode.display_name().to_string()
    }
}

/// Round-Robin rotation state: the index the next scan starts from.
///
/// Only a Round-Robin decision that produces a winner moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationCursor {
    position: usize,
}

impl RotationCursor {
    pub fn new(position: usize) -> Self {
        Self { position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to the slot just after `winner`, wrapping at `device_count`.
    pub fn advance_past(&mut self, winner: usize, device_count: usize) {
        if device_count > 0 {
            self.position = (winner + 1) % device_count;
        }
    }
}

/// Winner selection strategy.
pub trait ArbitrationPolicy: Send + Sync {
    /// Pick a requesting device, or `None` when nobody requests.
    ///
    /// Must hold: a returned index is requesting in `requests`.
    fn select(&self, requests: &RequestVector, cursor: &mut RotationCursor) -> Option<usize>;
}

/// Run the policy for `mode`.
///
/// # Example
///
/// ```rust
/// use bus_arbiter_core::policy::{select, ArbitrationMode, RotationCursor};
/// use bus_arbiter_core::RequestVector;
///
/// let mut cursor = RotationCursor::new(2);
/// let requests = RequestVector::uniform(4, true);
///
/// assert_eq!(select(ArbitrationMode::RoundRobin, &requests, &mut cursor), Some(2));
/// assert_eq!(cursor.position(), 3);
/// ```
pub fn select(
    mode: ArbitrationMode,
    requests: &RequestVector,
    cursor: &mut RotationCursor,
) -> Option<usize> {
    mode.policy().select(requests, cursor)
}

/// Outcome of a selection made from a mode name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub winner: Option<usize>,
    /// Policy that actually ran
    pub mode: ArbitrationMode,
    /// Set when the requested name was not recognized
    pub fallback: Option<PolicyError>,
}

/// Select with a mode given by name.
///
/// An unrecognized name runs Fixed Priority, logs a warning, and returns the
/// [`PolicyError::UnknownMode`] in [`Selection::fallback`].
pub fn select_named(
    name: &str,
    requests: &RequestVector,
    cursor: &mut RotationCursor,
) -> Selection {
    match name.parse::<ArbitrationMode>() {
        Ok(mode) => Selection {
            winner: select(mode, requests, cursor),
            mode,
            fallback: None,
        },
        Err(err) => {
            warn!(requested = name, "unknown arbitration mode, falling back to Fixed Priority");
            let mode = ArbitrationMode::FixedPriority;
            Selection {
                winner: select(mode, requests, cursor),
                mode,
                fallback: Some(err),
            }
        }
    }
}

/// The mode as last set by the control surface.
///
/// Keeps a name that did not parse so that every round run under it reports
/// the fallback instead of quietly becoming Fixed Priority. Serialized as a
/// plain name; any string deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModeSetting {
    Mode(ArbitrationMode),
    Unrecognized(String),
}

impl ModeSetting {
    pub fn from_name(name: &str) -> Self {
        ModeSetting::from(name.to_string())
    }

    /// Run the selector for this setting.
    pub fn resolve(&self, requests: &RequestVector, cursor: &mut RotationCursor) -> Selection {
        match self {
            ModeSetting::Mode(mode) => Selection {
                winner: select(*mode, requests, cursor),
                mode: *mode,
                fallback: None,
            },
            ModeSetting::Unrecognized(name) => select_named(name, requests, cursor),
        }
    }
}

impl From<ArbitrationMode> for ModeSetting {
    fn from(mode: ArbitrationMode) -> Self {
        ModeSetting::Mode(mode)
    }
}

impl From<String> for ModeSetting {
    fn from(name: String) -> Self {
        match name.parse::<ArbitrationMode>() {
            Ok(mode) => ModeSetting::Mode(mode),
            Err(_) => ModeSetting::Unrecognized(name),
        }
    }
}

impl From<ModeSetting> for String {
    fn from(setting: ModeSetting) -> Self {
        match setting {
            ModeSetting::Mode(mode) => mode.into(),
            ModeSetting::Unrecognized(name) => name,
        }
    }
}

impl Default for ModeSetting {
    fn default() -> Self {
        ModeSetting::Mode(ArbitrationMode::default())
    }
}

impl fmt::Display for ModeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeSetting::Mode(mode) => write!(f, "{}", mode),
            ModeSetting::Unrecognized(name) => write!(f, "{} (unrecognized)", name),
        }
    }
}
