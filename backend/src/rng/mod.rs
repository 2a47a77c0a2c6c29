//! Deterministic random number generation
//!
//! Request vectors and payload bytes are both drawn from a seeded xorshift64*
//! generator, so a seeded engine replays the same rounds.

mod xorshift;

pub use xorshift::RngManager;
