//! The composite MPC sort: a Waksman-network random permutation
//! followed by a quicksort whose comparisons are batched MPC
//! comparisons, plus the neighbour-combining zip helpers that typically
//! run over the sorted output.

pub mod dealer;
pub mod observation;
pub mod quicksort;
pub mod siso_sort;
pub mod waksman;
pub mod zip;

pub use observation::{Observation, ObservationList};
pub use siso_sort::SisoSort;
