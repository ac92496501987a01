//! The fronctocol execution engine.

mod engine;
mod fronctocol;

pub use engine::Engine;
pub use fronctocol::{Action, Fronctocol, FronctocolContext, FronctocolId};
