//! The comparison stack: from `UnboundedFaninOr`'s masked polynomial
//! evaluation up through `PosIntCompare`, every stage operates over the
//! small field `S`; only the type casts at the very end move results
//! into XOR sharing.

pub mod bitwise_compare;
#[allow(clippy::module_inception)]
pub mod compare;
pub mod dealer;
mod lagrange;
pub mod pos_int_compare;
pub mod prefix_or;
pub mod unbounded_fanin_or;

pub use compare::{Compare, CompareInfo, CompareOutput, CompareRandomness};
pub use pos_int_compare::{PosIntCompare, PosIntCompareRandomness};
