//! Round Robin Policy
//!
//! Scans from the rotation cursor, wrapping around the roster, and grants the
//! first requester found. After a win the cursor moves just past the winner,
//! so a device that was served goes to the back of the line. When every
//! device keeps requesting, N consecutive rounds grant each device once.
//!
//! The cursor only moves on a win; an idle round leaves it where it was.

use super::{ArbitrationPolicy, RotationCursor};
use crate::models::RequestVector;

/// Rotating priority starting at the cursor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinPolicy;

impl ArbitrationPolicy for RoundRobinPolicy {
    fn select(&self, requests: &RequestVector, cursor: &mut RotationCursor) -> Option<usize> {
        let n = requests.len();
        if n == 0 {
            return None;
        }

        let start = cursor.position() % n;
        let winner = (0..n)
            .map(|offset| (start + offset) % n)
            .find(|&idx| requests.is_requesting(idx))?;

        cursor.advance_past(winner, n);
        Some(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_cursor() {
        let mut cursor = RotationCursor::new(2);
        let requests = RequestVector::uniform(4, true);
        assert_eq!(RoundRobinPolicy.select(&requests, &mut cursor), Some(2));
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn test_wraps_around() {
        let mut cursor = RotationCursor::new(3);
        let requests = RequestVector::new(vec![true, true, false, false]);
        assert_eq!(RoundRobinPolicy.select(&requests, &mut cursor), Some(0));
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_winner_at_end_wraps_cursor_to_zero() {
        let mut cursor = RotationCursor::new(1);
        let requests = RequestVector::new(vec![false, false, false, true]);
        assert_eq!(RoundRobinPolicy.select(&requests, &mut cursor), Some(3));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_idle_round_keeps_cursor() {
        let mut cursor = RotationCursor::new(2);
        assert_eq!(
            RoundRobinPolicy.select(&RequestVector::uniform(4, false), &mut cursor),
            None
        );
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_out_of_range_cursor_is_normalized() {
        let mut cursor = RotationCursor::new(9);
        let requests = RequestVector::uniform(4, true);
        // 9 % 4 == 1
        assert_eq!(RoundRobinPolicy.select(&requests, &mut cursor), Some(1));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_full_rotation_serves_everyone_once() {
        let mut cursor = RotationCursor::new(1);
        let requests = RequestVector::uniform(4, true);
        let winners: Vec<_> = (0..4)
            .filter_map(|_| RoundRobinPolicy.select(&requests, &mut cursor))
            .collect();
        assert_eq!(winners, vec![1, 2, 3, 0]);
    }
}
