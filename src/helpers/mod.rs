//! Transport layer: the [`mesh::Mesh`] contract the run loop drives, and
//! two implementations of it — the concrete transport is left to the
//! embedding application, so we supply both an in-memory one for tests
//! and a TCP one for real runs.

pub mod in_memory;
pub mod mesh;

#[cfg(feature = "real-world-infra")]
pub mod tcp;
