//! Property tests for the arbitration policies.
//!
//! Every policy must be total over any roster size and any request vector,
//! and may only grant the bus to a device that asked for it.

use bus_arbiter_core::policy::{select, select_named, ArbitrationMode, RotationCursor};
use bus_arbiter_core::RequestVector;
use proptest::prelude::*;

fn request_vectors() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..16)
}

fn modes() -> impl Strategy<Value = ArbitrationMode> {
    prop::sample::select(ArbitrationMode::ALL.to_vec())
}

proptest! {
    #[test]
    fn winner_is_always_a_requester(
        requests in request_vectors(),
        mode in modes(),
        start in 0usize..32,
    ) {
        let requests = RequestVector::new(requests);
        let mut cursor = RotationCursor::new(start);

        match select(mode, &requests, &mut cursor) {
            Some(winner) => prop_assert!(requests.is_requesting(winner)),
            None => prop_assert!(!requests.any()),
        }
    }

    #[test]
    fn all_false_grants_nothing_and_keeps_cursor(
        len in 1usize..16,
        mode in modes(),
        start in 0usize..16,
    ) {
        let requests = RequestVector::uniform(len, false);
        let mut cursor = RotationCursor::new(start);

        prop_assert_eq!(select(mode, &requests, &mut cursor), None);
        prop_assert_eq!(cursor.position(), start);
    }

    #[test]
    fn fixed_priority_picks_lowest(requests in request_vectors()) {
        let requests = RequestVector::new(requests);
        let mut cursor = RotationCursor::default();

        let expected = requests.as_slice().iter().position(|r| *r);
        prop_assert_eq!(select(ArbitrationMode::FixedPriority, &requests, &mut cursor), expected);
    }

    #[test]
    fn daisy_chain_picks_highest(requests in request_vectors()) {
        let requests = RequestVector::new(requests);
        let mut cursor = RotationCursor::default();

        let expected = requests.as_slice().iter().rposition(|r| *r);
        prop_assert_eq!(select(ArbitrationMode::DaisyChain, &requests, &mut cursor), expected);
    }

    #[test]
    fn fixed_and_daisy_leave_cursor_alone(
        requests in request_vectors(),
        start in 0usize..16,
    ) {
        let requests = RequestVector::new(requests);
        for mode in [ArbitrationMode::FixedPriority, ArbitrationMode::DaisyChain] {
            let mut cursor = RotationCursor::new(start);
            select(mode, &requests, &mut cursor);
            prop_assert_eq!(cursor.position(), start);
        }
    }

    #[test]
    fn round_robin_is_fair_over_a_window(n in 1usize..12, start in 0usize..12) {
        let start = start % n;
        let requests = RequestVector::uniform(n, true);
        let mut cursor = RotationCursor::new(start);

        let winners: Vec<usize> = (0..n)
            .filter_map(|_| select(ArbitrationMode::RoundRobin, &requests, &mut cursor))
            .collect();

        let expected: Vec<usize> = (0..n).map(|k| (start + k) % n).collect();
        prop_assert_eq!(winners, expected);
        prop_assert_eq!(cursor.position(), start);
    }

    #[test]
    fn round_robin_moves_just_past_winner(
        requests in request_vectors(),
        start in 0usize..16,
    ) {
        let requests = RequestVector::new(requests);
        let n = requests.len();
        let mut cursor = RotationCursor::new(start % n);

        if let Some(winner) = select(ArbitrationMode::RoundRobin, &requests, &mut cursor) {
            prop_assert_eq!(cursor.position(), (winner + 1) % n);
        } else {
            prop_assert_eq!(cursor.position(), start % n);
        }
    }

    #[test]
    fn unknown_names_behave_as_fixed_priority(
        requests in request_vectors(),
        name in "[a-z]{3,10}",
    ) {
        prop_assume!(name.parse::<ArbitrationMode>().is_err());
        let requests = RequestVector::new(requests);
        let mut cursor = RotationCursor::default();

        let selection = select_named(&name, &requests, &mut cursor);
        let mut fixed_cursor = RotationCursor::default();
        prop_assert_eq!(
            selection.winner,
            select(ArbitrationMode::FixedPriority, &requests, &mut fixed_cursor)
        );
        prop_assert!(selection.fallback.is_some());
    }
}

#[test]
fn test_empty_vector_is_total() {
    let requests = RequestVector::new(Vec::new());
    for mode in ArbitrationMode::ALL {
        let mut cursor = RotationCursor::new(3);
        assert_eq!(select(mode, &requests, &mut cursor), None);
        assert_eq!(cursor.position(), 3);
    }
}

#[test]
fn test_round_robin_skips_idle_devices() {
    let requests = RequestVector::with_requesting(5, &[0, 3]);
    let mut cursor = RotationCursor::new(1);

    assert_eq!(select(ArbitrationMode::RoundRobin, &requests, &mut cursor), Some(3));
    assert_eq!(cursor.position(), 4);
    // Wraps around
    assert_eq!(select(ArbitrationMode::RoundRobin, &requests, &mut cursor), Some(0));
    assert_eq!(cursor.position(), 1);
}
