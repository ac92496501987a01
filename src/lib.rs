//! A multi-party computation runtime: an engine that drives a tree of
//! cooperatively-scheduled "fronctocol" instances across a set of
//! parties, the primitive arithmetic protocols built on top of it
//! (reveal, Beaver multiply, type casting, comparison, sorting,
//! division, matrix multiplication), and the trusted-dealer randomness
//! those primitives consume.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod ff;
pub mod helpers;
pub mod peers;
pub mod protocol;
pub mod randomness;

#[cfg(feature = "test-fixture")]
pub mod test_fixture;

pub use error::{Error, Result};
