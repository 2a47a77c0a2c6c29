//! Request generation for arbitration rounds.
//!
//! Each round every device independently decides whether it wants the bus.
//! All randomness is drawn from the engine's [`RngManager`], so a seeded
//! engine produces the same request vectors every run.
//!
//! # Key Principles
//!
//! 1. **Full replacement**: a fresh vector every round, one flag per device
//! 2. **Pluggable**: anything implementing [`RequestSource`] can drive the loop
//! 3. **Checked width**: the engine rejects vectors whose length is not N
//!
//! # Example
//!
//! ```
//! use bus_arbiter_core::requests::{RandomRequests, RequestSource};
//! use bus_arbiter_core::rng::RngManager;
//!
//! let mut rng = RngManager::new(42);
//! let mut source = RandomRequests::new(0.5);
//! let requests = source.next_requests(4, &mut rng).unwrap();
//! assert_eq!(requests.len(), 4);
//! ```

use crate::models::RequestVector;
use crate::rng::RngManager;
use std::collections::VecDeque;
use thiserror::Error;

/// Request source failures. The loop treats these as a faulted round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Request script exhausted after {rounds} rounds")]
    Exhausted { rounds: usize },

    #[error("Request source failed: {0}")]
    Source(String),
}

/// Produces the request vector for each round.
pub trait RequestSource: Send {
    fn next_requests(
        &mut self,
        device_count: usize,
        rng: &mut RngManager,
    ) -> Result<RequestVector, RequestError>;
}

/// Independent coin flip per device per round.
#[derive(Debug, Clone)]
pub struct RandomRequests {
    probability: f64,
}

impl RandomRequests {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl RequestSource for RandomRequests {
    fn next_requests(
        &mut self,
        device_count: usize,
        rng: &mut RngManager,
    ) -> Result<RequestVector, RequestError> {
        let requests = (0..device_count)
            .map(|_| rng.chance(self.probability))
            .collect::<Vec<_>>();
        Ok(RequestVector::new(requests))
    }
}

/// Replays a fixed list of request vectors.
///
/// Useful for tests and for reproducing a reported sequence. The rng is not
/// consumed.
#[derive(Debug, Clone)]
pub struct ScriptedRequests {
    script: VecDeque<RequestVector>,
    played: usize,
    cycle: bool,
}

impl ScriptedRequests {
    /// Play each vector once, then fail with [`RequestError::Exhausted`].
    pub fn new<I>(rounds: I) -> Self
    where
        I: IntoIterator<Item = RequestVector>,
    {
        Self {
            script: rounds.into_iter().collect(),
            played: 0,
            cycle: false,
        }
    }

    /// Play the vectors in order forever.
    pub fn cycling<I>(rounds: I) -> Self
    where
        I: IntoIterator<Item = RequestVector>,
    {
        Self {
            cycle: true,
            ..Self::new(rounds)
        }
    }
}

impl RequestSource for ScriptedRequests {
    fn next_requests(
        &mut self,
        _device_count: usize,
        _rng: &mut RngManager,
    ) -> Result<RequestVector, RequestError> {
        let next = self.script.pop_front().ok_or(RequestError::Exhausted {
            rounds: self.played,
        })?;
        if self.cycle {
            self.script.push_back(next.clone());
        }
        self.played += 1;
        Ok(next)
    }
}
