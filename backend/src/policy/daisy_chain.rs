//! Daisy Chain Policy
//!
//! The grant line enters at the far end of the bus, so the highest index is
//! served first. Stateless, the mirror image of Fixed Priority.

use super::{ArbitrationPolicy, RotationCursor};
use crate::models::RequestVector;

/// Highest requesting index wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct DaisyChainPolicy;

impl ArbitrationPolicy for DaisyChainPolicy {
    fn select(&self, requests: &RequestVector, _cursor: &mut RotationCursor) -> Option<usize> {
        requests.as_slice().iter().rposition(|&r| r)
    }
}
