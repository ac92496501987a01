//! FIFO queue of pre-dealt randomness units, and the `little_dispenser`
//! slicing helper used when a fronctocol needs exactly `k` units at once.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// A FIFO of pre-dealt units of one randomness kind. A fronctocol draws
/// from the front as it consumes randomness during a protocol run.
/// Drawing past the end is a provisioning bug, not a runtime condition,
/// and fails fast.
#[derive(Debug)]
pub struct Dispenser<R> {
    label: &'static str,
    units: VecDeque<R>,
}

impl<R> Dispenser<R> {
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Dispenser {
            label,
            units: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn insert(&mut self, unit: R) {
        self.units.push_back(unit);
    }

    pub fn extend(&mut self, units: impl IntoIterator<Item = R>) {
        self.units.extend(units);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Draws the next unit, or an error if the dispenser is empty.
    pub fn draw(&mut self) -> Result<R> {
        self.units.pop_front().ok_or(Error::RandomnessDepleted {
            kind: self.label,
            requested: 1,
            available: 0,
        })
    }

    /// Moves the next `k` units into a new dispenser of the same kind,
    /// or an error leaving this one untouched if fewer than `k` remain.
    pub fn little_dispenser(&mut self, k: usize) -> Result<Dispenser<R>> {
        if self.units.len() < k {
            return Err(Error::RandomnessDepleted {
                kind: self.label,
                requested: k,
                available: self.units.len(),
            });
        }
        let mut little = Dispenser::new(self.label);
        little.units.extend(self.units.drain(..k));
        Ok(little)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_in_fifo_order() {
        let mut d = Dispenser::new("test");
        d.extend([1, 2, 3]);
        assert_eq!(d.draw().unwrap(), 1);
        assert_eq!(d.draw().unwrap(), 2);
    }

    #[test]
    fn little_dispenser_slices_atomically() {
        let mut d = Dispenser::new("test");
        d.extend([1, 2, 3]);
        assert!(d.little_dispenser(4).is_err());
        assert_eq!(d.len(), 3, "a failed draw must not consume any units");
        let mut little = d.little_dispenser(2).unwrap();
        assert_eq!(little.draw().unwrap(), 1);
        assert_eq!(little.draw().unwrap(), 2);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn depleted_dispenser_errors() {
        let mut d: Dispenser<u8> = Dispenser::new("test");
        assert!(matches!(d.draw(), Err(Error::RandomnessDepleted { .. })));
    }
}
