//! Devices competing for the bus, and the per-round values they produce.
//!
//! A device is identified by its ordinal index; the display name is only used
//! for logs and for the `DEVICE=` field on the wire. The roster is fixed when
//! the engine is built.

use serde::{Deserialize, Serialize};

/// A bus client with a fixed ordinal index and a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    index: usize,
    name: String,
}

impl Device {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The fixed, ordered set of devices attached to the bus.
///
/// # Example
/// ```
/// use bus_arbiter_core::DeviceRoster;
///
/// let roster = DeviceRoster::numbered(4);
/// assert_eq!(roster.len(), 4);
/// assert_eq!(roster.name(1), Some("Device 2"));
/// assert_eq!(roster.name(4), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRoster {
    devices: Vec<Device>,
}

impl DeviceRoster {
    /// Build a roster from display names; index follows position.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Device {
                index,
                name: name.into(),
            })
            .collect();
        Self { devices }
    }

    /// Roster named "Device 1" .. "Device N".
    pub fn numbered(count: usize) -> Self {
        Self::from_names((1..=count).map(|n| format!("Device {}", n)))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.get(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.devices.get(index).map(Device::name)
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }
}

/// One round's bus requests, one flag per device.
///
/// Regenerated every round; never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVector(Vec<bool>);

impl RequestVector {
    pub fn new(requests: Vec<bool>) -> Self {
        Self(requests)
    }

    /// Every device in the same state.
    pub fn uniform(len: usize, requesting: bool) -> Self {
        Self(vec![requesting; len])
    }

    /// Vector with only the given indices requesting. Out-of-range indices
    /// are ignored.
    pub fn with_requesting(len: usize, indices: &[usize]) -> Self {
        let mut requests = vec![false; len];
        for &i in indices {
            if let Some(slot) = requests.get_mut(i) {
                *slot = true;
            }
        }
        Self(requests)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `index` is requesting; out of range reads as not requesting.
    pub fn is_requesting(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&r| r)
    }

    /// Indices of requesting devices, ascending.
    pub fn requesting(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, r)| **r)
            .map(|(i, _)| i)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

impl From<Vec<bool>> for RequestVector {
    fn from(requests: Vec<bool>) -> Self {
        Self(requests)
    }
}

/// Result of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantOutcome {
    /// `device` holds the bus for this round and transfers `payload`.
    Granted { device: usize, payload: u8 },
    /// Nobody requested; the bus stays idle.
    Idle,
}

impl GrantOutcome {
    pub fn winner(&self) -> Option<usize> {
        match self {
            GrantOutcome::Granted { device, .. } => Some(*device),
            GrantOutcome::Idle => None,
        }
    }

    pub fn payload(&self) -> Option<u8> {
        match self {
            GrantOutcome::Granted { payload, .. } => Some(*payload),
            GrantOutcome::Idle => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, GrantOutcome::Idle)
    }
}

/// What the UI shows for a device after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeviceStatus {
    #[default]
    Idle,
    Requesting,
    Granted,
}

impl DeviceStatus {
    /// Status of every device given a round's requests and outcome.
    pub fn for_round(requests: &RequestVector, outcome: &GrantOutcome) -> Vec<DeviceStatus> {
        let winner = outcome.winner();
        (0..requests.len())
            .map(|i| {
                if winner == Some(i) {
                    DeviceStatus::Granted
                } else if requests.is_requesting(i) {
                    DeviceStatus::Requesting
                } else {
                    DeviceStatus::Idle
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_from_names_keeps_order() {
        let roster = DeviceRoster::from_names(["CPU", "DMA", "GPU"]);
        assert_eq!(roster.get(2).map(Device::index), Some(2));
        assert_eq!(roster.name(0), Some("CPU"));
        assert_eq!(roster.names(), vec!["CPU", "DMA", "GPU"]);
    }

    #[test]
    fn test_request_vector_requesting_indices() {
        let requests = RequestVector::new(vec![false, true, true, false]);
        assert_eq!(requests.requesting().collect::<Vec<_>>(), vec![1, 2]);
        assert!(requests.any());
        assert!(!requests.is_requesting(7));
    }

    #[test]
    fn test_with_requesting_ignores_out_of_range() {
        let requests = RequestVector::with_requesting(3, &[0, 5]);
        assert_eq!(requests.as_slice(), &[true, false, false]);
    }

    #[test]
    fn test_status_for_round() {
        let requests = RequestVector::new(vec![false, true, true, false]);
        let outcome = GrantOutcome::Granted {
            device: 1,
            payload: 9,
        };
        assert_eq!(
            DeviceStatus::for_round(&requests, &outcome),
            vec![
                DeviceStatus::Idle,
                DeviceStatus::Granted,
                DeviceStatus::Requesting,
                DeviceStatus::Idle
            ]
        );
    }
}
