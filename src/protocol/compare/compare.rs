//! Compares two arithmetic shares without revealing either value: the
//! doubled difference `2(x - y)` is masked with a pre-dealt random `r`
//! and revealed, the revealed value's bits are bitwise-compared against
//! `r`'s pre-shared bit decomposition, and the result is unmasked with
//! two local XORs against `r`'s secret low bit and the revealed value's
//! public low bit.
//!
//! Doubling the difference keeps its sign in the low bit of the
//! revealed value even though `r`'s own low bit is unknown: for inputs
//! below `p/2` the doubled difference wraps the modulus exactly when
//! `x < y`, flipping the parity the mask arithmetic then recovers.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::reveal::{self, Reveal};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{BeaverTriple, DecomposedBitSet, ExponentSeries, TypeCastTriple};
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::bitwise_compare::{
    self, BitwiseCompare, BitwiseCompareOutput, BitwiseCompareRandomness,
};
use super::lagrange::unbounded_fanin_or_needs;
use super::prefix_or::{PrefixOrInfo, PrefixOrRandomness};

/// Shape parameters shared by every comparison over keys in `P` with
/// small-field arithmetic in `S`.
#[derive(Debug)]
pub struct CompareInfo<I: Identity, P: Field, S: Field> {
    pub ell: usize,
    pub lambda: usize,
    pub prefix: Arc<PrefixOrInfo<I, S>>,
    _marker: PhantomData<P>,
}

impl<I: Identity, P: Field, S: Field> CompareInfo<I, P, S> {
    #[must_use]
    pub fn new(revealer: I) -> Self {
        let ell = P::bits();
        let prefix = Arc::new(PrefixOrInfo::<I, S>::new(ell, revealer));
        CompareInfo {
            ell,
            lambda: prefix.lambda,
            prefix,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn revealer(&self) -> &I {
        &self.prefix.revealer
    }

    /// How many small-field Beaver triples one comparison consumes: the
    /// inner `PrefixOr`'s multiplies plus one per unbounded fan-in OR
    /// plus the two output type casts.
    #[must_use]
    pub fn beaver_triples_per_compare(&self) -> usize {
        2 * self.ell + unbounded_fanin_or_needs(self.ell, self.lambda).len() + 2
    }

    /// The exponent-series fan-in sizes one comparison consumes, in
    /// consumption order.
    #[must_use]
    pub fn fanin_or_needs(&self) -> Vec<usize> {
        unbounded_fanin_or_needs(self.ell, self.lambda)
    }
}

/// Everything one `Compare` consumes, sliced off the full patron
/// dispensers by `CompareRandomnessPatron`.
pub struct CompareRandomness<P: Field, S: Field> {
    pub exponent_series: Vec<ExponentSeries<S>>,
    pub multiply: Dispenser<BeaverTriple<S>>,
    pub tct_lt: TypeCastTriple<S>,
    pub tct_eq: TypeCastTriple<S>,
    pub dbs: DecomposedBitSet<P, S>,
}

/// XOR shares of the two-bit comparison outcome. Reconstructed across
/// every party, `gt + 2*eq` is `0` iff `x < y`, `1` iff `x > y`, and
/// `2` iff `x = y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOutput {
    pub gt: Gf2,
    pub eq: Gf2,
}

impl CompareOutput {
    /// The packed two-bit form used when a whole outcome gets revealed.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        u8::from(self.gt.as_bool()) | (u8::from(self.eq.as_bool()) << 1)
    }
}

enum CompareState {
    AwaitingReveal,
    AwaitingBitwiseCompare { c_lsb: bool },
}

pub struct Compare<I: Identity, P: Field, S: Field> {
    share_of_x: P,
    share_of_y: P,
    info: Arc<CompareInfo<I, P, S>>,
    randomness: Option<CompareRandomness<P, S>>,
    r_lsb: Gf2,
    state: CompareState,
}

impl<I: Identity, P: Field, S: Field> Compare<I, P, S> {
    #[must_use]
    pub fn new(
        share_of_x: P,
        share_of_y: P,
        info: Arc<CompareInfo<I, P, S>>,
        randomness: CompareRandomness<P, S>,
    ) -> Self {
        Compare {
            share_of_x,
            share_of_y,
            info,
            randomness: Some(randomness),
            r_lsb: Gf2::ZERO,
            state: CompareState::AwaitingReveal,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for Compare<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        crate::invariant!(
            self.info.lambda * self.info.lambda > self.info.ell,
            Error::InconsistentRandomnessInfo {
                kind: "Compare block size too small for the key width"
            }
        );
        let two = P::ONE + P::ONE;
        let r = self.randomness.as_ref().expect("constructed with randomness").dbs.r;
        let masked = two * (self.share_of_x - self.share_of_y) + r;
        let reveal = Reveal::new(masked, self.info.revealer().clone());
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(reveal), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("Compare"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            CompareState::AwaitingReveal => {
                let c = result
                    .and_then(reveal::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("Compare reveal"))?;
                let c_val = c.as_u128();
                let ell = self.info.ell;
                let c_bits: Vec<bool> = (0..ell).map(|i| (c_val >> (ell - 1 - i)) & 1 == 1).collect();

                let mut randomness = self.randomness.take().expect("present until the reveal");
                self.r_lsb = randomness.dbs.r_lsb;
                let beaver_lt = randomness.multiply.draw()?;
                let beaver_eq = randomness.multiply.draw()?;
                let bwc_randomness = BitwiseCompareRandomness {
                    prefix: PrefixOrRandomness {
                        exponent_series: randomness.exponent_series,
                        multiply: randomness.multiply,
                    },
                    beaver_lt,
                    tct_lt: randomness.tct_lt,
                    beaver_eq,
                    tct_eq: randomness.tct_eq,
                };
                let bwc = BitwiseCompare::new(
                    randomness.dbs.r_bits,
                    c_bits,
                    Arc::clone(&self.info.prefix),
                    bwc_randomness,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(bwc), peers);
                self.state = CompareState::AwaitingBitwiseCompare {
                    c_lsb: c_val & 1 == 1,
                };
                Ok(())
            }
            CompareState::AwaitingBitwiseCompare { c_lsb } => {
                let BitwiseCompareOutput { lt, eq } = result
                    .and_then(bitwise_compare::downcast)
                    .ok_or(Error::UnexpectedResultType("Compare bitwise compare"))?;
                // lt ^ lsb(r) ^ lsb(c) recovers the sign of the doubled
                // difference; the public lsb(c) is folded in by the
                // revealer alone.
                let mut gt = lt + self.r_lsb;
                if ctx.me() == self.info.revealer() && c_lsb {
                    gt += Gf2::ONE;
                }
                ctx.complete_with_result(Box::new(CompareOutput { gt, eq }));
                Ok(())
            }
        }
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("Compare"))
    }
}

/// Downcasts a completed `Compare`'s result.
#[must_use]
pub fn downcast(result: Box<dyn Any + Send>) -> Option<CompareOutput> {
    result.downcast::<CompareOutput>().ok().map(|b| *b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::{Fp11, Fp32BitPrime, Fp97, FpSmall};

    #[test]
    fn production_field_pair_shapes_the_comparison() {
        let info = CompareInfo::<String, Fp32BitPrime, FpSmall>::new("p0".to_string());
        assert_eq!(info.ell, 32);
        assert_eq!(info.lambda, 6);
        assert_eq!(
            info.fanin_or_needs(),
            vec![6, 12, 18, 24, 30, 32, 1, 2, 3, 4, 5, 6]
        );
        assert_eq!(info.beaver_triples_per_compare(), 2 * 32 + 12 + 2);
    }

    #[test]
    fn test_field_pair_matches_the_hand_counts() {
        let info = CompareInfo::<String, Fp97, Fp11>::new("p0".to_string());
        assert_eq!(info.ell, 7);
        assert_eq!(info.lambda, 3);
        assert_eq!(info.fanin_or_needs(), vec![3, 6, 7, 1, 2, 3]);
        assert_eq!(info.beaver_triples_per_compare(), 14 + 6 + 2);
    }

    #[test]
    fn packed_outcome_encodes_both_bits() {
        use crate::ff::Gf2;
        let less = CompareOutput { gt: Gf2::ZERO, eq: Gf2::ZERO };
        let greater = CompareOutput { gt: Gf2::ONE, eq: Gf2::ZERO };
        let equal = CompareOutput { gt: Gf2::ZERO, eq: Gf2::ONE };
        assert_eq!(less.as_u8(), 0);
        assert_eq!(greater.as_u8(), 1);
        assert_eq!(equal.as_u8(), 2);
    }
}
