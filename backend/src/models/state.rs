//! Grant statistics
//!
//! Session-scoped grant counters, one per device.
//!
//! # Critical Invariants
//!
//! 1. **Monotonic**: counts never decrease
//! 2. **Exact**: a count moves by exactly 1, exactly when that device wins a round
//! 3. **Sticky**: stopping the loop does not clear counts; only a new engine does

use crate::models::device::DeviceRoster;
use serde::{Deserialize, Serialize};

/// Cumulative grants per device index.
///
/// # Example
///
/// ```rust
/// use bus_arbiter_core::GrantStatistics;
///
/// let mut stats = GrantStatistics::new(4);
/// stats.record_grant(1);
/// assert_eq!(stats.counts(), &[0, 1, 0, 0]);
/// assert_eq!(stats.total(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantStatistics {
    counts: Vec<u64>,
}

impl GrantStatistics {
    pub fn new(device_count: usize) -> Self {
        Self {
            counts: vec![0; device_count],
        }
    }

    /// Rebuild from counts carried in a snapshot.
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Count one grant for `device`.
    ///
    /// Returns false (and counts nothing) when the index is outside the roster.
    pub fn record_grant(&mut self, device: usize) -> bool {
        match self.counts.get_mut(device) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Grants for one device; 0 for unknown indices.
    pub fn count(&self, device: usize) -> u64 {
        self.counts.get(device).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Status-bar text: `Stats: Device 1=0 | Device 2=1 | ...`
    pub fn summary(&self, roster: &DeviceRoster) -> String {
        let parts: Vec<String> = roster
            .iter()
            .map(|device| format!("{}={}", device.name(), self.count(device.index())))
            .collect();
        format!("Stats: {}", parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_grant_out_of_range_is_ignored() {
        let mut stats = GrantStatistics::new(2);
        assert!(!stats.record_grant(2));
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_summary_format() {
        let roster = DeviceRoster::numbered(3);
        let mut stats = GrantStatistics::new(3);
        stats.record_grant(1);
        stats.record_grant(1);
        stats.record_grant(2);
        assert_eq!(
            stats.summary(&roster),
            "Stats: Device 1=0 | Device 2=2 | Device 3=1"
        );
    }
}
