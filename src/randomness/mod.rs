//! Trusted-dealer randomness: the share kinds and their dealing infos,
//! a FIFO dispenser per kind, and the `House`/`Patron` fronctocols that
//! move dealt shares from the dealer to every computing party in
//! batches.

pub mod dealer;
pub mod dispenser;
pub mod kinds;

pub use dealer::{downcast_dispenser, House, Patron};
pub use dispenser::Dispenser;
