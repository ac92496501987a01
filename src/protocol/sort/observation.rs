//! One sortable row and the list type the sort operates on.
//!
//! A row carries three parallel column groups: the keys the sort
//! compares on and any arithmetic satellite data, both shared over the
//! large field, and single-bit satellite data shared as XOR. The list
//! records the per-group column counts so a malformed row is caught
//! before it desynchronises a batch.

use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Observation<P: Field> {
    pub key_cols: Vec<P>,
    pub arithmetic_payload_cols: Vec<P>,
    pub xor_payload_cols: Vec<Gf2>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationList<P: Field> {
    pub num_key_cols: usize,
    pub num_arithmetic_payload_cols: usize,
    pub num_xor_payload_cols: usize,
    pub elements: Vec<Observation<P>>,
}

impl<P: Field> ObservationList<P> {
    #[must_use]
    pub fn new(
        num_key_cols: usize,
        num_arithmetic_payload_cols: usize,
        num_xor_payload_cols: usize,
        elements: Vec<Observation<P>>,
    ) -> Self {
        ObservationList {
            num_key_cols,
            num_arithmetic_payload_cols,
            num_xor_payload_cols,
            elements,
        }
    }

    /// Every row must carry exactly the declared column counts.
    pub fn schema_check(&self) -> Result<()> {
        crate::invariant!(
            self.num_key_cols > 0,
            Error::InconsistentRandomnessInfo {
                kind: "an observation list needs at least one key column"
            }
        );
        for row in &self.elements {
            crate::invariant!(
                row.key_cols.len() == self.num_key_cols
                    && row.arithmetic_payload_cols.len() == self.num_arithmetic_payload_cols
                    && row.xor_payload_cols.len() == self.num_xor_payload_cols,
                Error::InconsistentRandomnessInfo {
                    kind: "observation row disagrees with the list schema"
                }
            );
        }
        Ok(())
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.elements.swap(i, j);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::Fp97;

    #[test]
    fn schema_check_catches_a_ragged_row() {
        let good = Observation::<Fp97> {
            key_cols: vec![Fp97::ONE],
            arithmetic_payload_cols: vec![],
            xor_payload_cols: vec![Gf2::ZERO],
        };
        let bad = Observation::<Fp97> {
            key_cols: vec![Fp97::ONE, Fp97::ZERO],
            arithmetic_payload_cols: vec![],
            xor_payload_cols: vec![Gf2::ZERO],
        };
        let list = ObservationList::new(1, 0, 1, vec![good.clone(), bad]);
        assert!(list.schema_check().is_err());
        let list = ObservationList::new(1, 0, 1, vec![good]);
        assert!(list.schema_check().is_ok());
    }
}
