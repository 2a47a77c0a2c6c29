//! Fixed Priority Policy
//!
//! Lower index means strictly higher priority. Stateless; the cursor is
//! never touched. Devices at the top of the order can starve everyone else.

use super::{ArbitrationPolicy, RotationCursor};
use crate::models::RequestVector;

/// Lowest requesting index wins.
///
/// # Example
///
/// ```
/// use bus_arbiter_core::policy::{ArbitrationPolicy, FixedPriorityPolicy, RotationCursor};
/// use bus_arbiter_core::RequestVector;
///
/// let mut cursor = RotationCursor::default();
/// let requests = RequestVector::new(vec![false, true, true, false]);
///
/// assert_eq!(FixedPriorityPolicy.select(&requests, &mut cursor), Some(1));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPriorityPolicy;

impl ArbitrationPolicy for FixedPriorityPolicy {
    fn select(&self, requests: &RequestVector, _cursor: &mut RotationCursor) -> Option<usize> {
        requests.requesting().next()
    }
}
