//! Snapshot - read-only view of engine state
//!
//! Taken after every round and shipped to the UI context, which never gets
//! access to the arbiter itself. Serializable so a session can be exported.

use serde::{Deserialize, Serialize};

/// Engine state at the end of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Rounds completed
    pub round: u64,

    /// Mode setting as displayed
    pub mode: String,

    /// Round-Robin cursor position
    pub cursor: usize,

    pub device_names: Vec<String>,

    /// Grants per device, same order as `device_names`
    pub grant_counts: Vec<u64>,

    /// RNG state; a new engine seeded with this value continues the sequence
    pub rng_state: u64,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Grants for a device by name.
    pub fn grants_for(&self, device_name: &str) -> Option<u64> {
        self.device_names
            .iter()
            .position(|name| name == device_name)
            .and_then(|i| self.grant_counts.get(i).copied())
    }

    pub fn total_grants(&self) -> u64 {
        self.grant_counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EngineSnapshot {
        EngineSnapshot {
            round: 12,
            mode: "Round Robin".to_string(),
            cursor: 3,
            device_names: vec!["Device 1".to_string(), "Device 2".to_string()],
            grant_counts: vec![4, 6],
            rng_state: 987654321,
        }
    }

    #[test]
    fn test_snapshot_json_preserves_counts() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"grant_counts\""));
        assert_eq!(EngineSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_grants_for_device_name() {
        let snapshot = sample();
        assert_eq!(snapshot.grants_for("Device 2"), Some(6));
        assert_eq!(snapshot.grants_for("Device 9"), None);
        assert_eq!(snapshot.total_grants(), 10);
    }
}
