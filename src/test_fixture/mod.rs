//! In-process multi-party test driver: an in-memory mesh plus a pump
//! loop per party, so a protocol can be exercised through the real
//! [`crate::engine::Engine`] instead of calling its handlers directly,
//! and local dealing helpers that stand in for a dealer party where a
//! test doesn't need one.

pub mod local_deal;
pub mod world;

pub use world::TestWorld;
