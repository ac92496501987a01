//! Compares a bit-decomposed secret `r` against a *public* value `c`
//! (both most-significant-bit first) without revealing `r`: the XOR of
//! corresponding bits is a local computation when one side is public, a
//! [`PrefixOr`] from the most significant end turns the difference
//! vector into "has a difference occurred yet" indicators, and the
//! first-difference indicator selects which side is larger. Two type
//! casts move the arithmetic selector bits into XOR sharing.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::type_cast::{self, TypeCast};
use crate::randomness::kinds::{BeaverTriple, TypeCastTriple};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::prefix_or::{self, PrefixOr, PrefixOrInfo, PrefixOrRandomness};

/// Everything one `BitwiseCompare` consumes: a full [`PrefixOr`]'s
/// randomness plus a Beaver/type-cast pair for each of its two output
/// bits.
pub struct BitwiseCompareRandomness<S: Field> {
    pub prefix: PrefixOrRandomness<S>,
    pub beaver_lt: BeaverTriple<S>,
    pub tct_lt: TypeCastTriple<S>,
    pub beaver_eq: BeaverTriple<S>,
    pub tct_eq: TypeCastTriple<S>,
}

/// XOR shares of the comparison's two output bits: `lt` reconstructs to
/// `1` iff the shared value is strictly below the public one, `eq` iff
/// they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitwiseCompareOutput {
    pub lt: Gf2,
    pub eq: Gf2,
}

enum BwcState {
    AwaitingPrefixOr,
    AwaitingLtCast,
    AwaitingEqCast,
}

pub struct BitwiseCompare<I: Identity, S: Field> {
    r_bits: Vec<S>,
    c_bits: Vec<bool>,
    info: Arc<PrefixOrInfo<I, S>>,
    randomness: Option<BitwiseCompareRandomness<S>>,
    beaver_lt: Option<BeaverTriple<S>>,
    beaver_eq: Option<BeaverTriple<S>>,
    tct_lt: Option<TypeCastTriple<S>>,
    tct_eq: Option<TypeCastTriple<S>>,
    equality_share: S,
    lt: Option<Gf2>,
    state: BwcState,
}

impl<I: Identity, S: Field> BitwiseCompare<I, S> {
    /// `r_bits` are this party's shares of the secret value's bits and
    /// `c_bits` the public comparand's bits, both MSB first and of equal
    /// length.
    #[must_use]
    pub fn new(
        r_bits: Vec<S>,
        c_bits: Vec<bool>,
        info: Arc<PrefixOrInfo<I, S>>,
        randomness: BitwiseCompareRandomness<S>,
    ) -> Self {
        BitwiseCompare {
            r_bits,
            c_bits,
            info,
            randomness: Some(randomness),
            beaver_lt: None,
            beaver_eq: None,
            tct_lt: None,
            tct_eq: None,
            equality_share: S::ZERO,
            lt: None,
            state: BwcState::AwaitingPrefixOr,
        }
    }
}

#[async_trait]
impl<I: Identity, S: Field> Fronctocol<I> for BitwiseCompare<I, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        crate::invariant!(
            self.r_bits.len() == self.c_bits.len(),
            Error::InconsistentRandomnessInfo {
                kind: "BitwiseCompare operand widths differ"
            }
        );
        let randomness = self.randomness.take().expect("constructed with randomness");
        self.beaver_lt = Some(randomness.beaver_lt);
        self.beaver_eq = Some(randomness.beaver_eq);
        self.tct_lt = Some(randomness.tct_lt);
        self.tct_eq = Some(randomness.tct_eq);

        // r_i XOR c_i is local when c_i is public: the share of the
        // difference bit is r_i itself for c_i = 0 and 1 - r_i (the 1
        // contributed by the revealer) for c_i = 1.
        let i_am_revealer = *ctx.me() == self.info.revealer;
        let diffs: Vec<S> = self
            .r_bits
            .iter()
            .zip(&self.c_bits)
            .map(|(&r, &c)| {
                if c {
                    if i_am_revealer {
                        S::ONE - r
                    } else {
                        -r
                    }
                } else {
                    r
                }
            })
            .collect();

        let prefix_or = PrefixOr::new(diffs, Arc::clone(&self.info), randomness.prefix);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(prefix_or), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("BitwiseCompare"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            BwcState::AwaitingPrefixOr => {
                let prefixes = result
                    .and_then(prefix_or::downcast::<S>)
                    .ok_or(Error::UnexpectedResultType("BitwiseCompare prefix-or"))?;

                // The first-difference indicator at position i is
                // p_i - p_{i-1}; summing it over the positions where
                // c_i = 1 (so r_i = 0 at the first difference) yields
                // an arithmetic share of [r < c].
                let mut lt_share = S::ZERO;
                let mut previous = S::ZERO;
                for (i, &c) in self.c_bits.iter().enumerate() {
                    let indicator = prefixes[i] - previous;
                    previous = prefixes[i];
                    if c {
                        lt_share += indicator;
                    }
                }
                // No difference anywhere means equality.
                let last = *prefixes.last().expect("bit width is never zero");
                self.equality_share = if *ctx.me() == self.info.revealer {
                    S::ONE - last
                } else {
                    -last
                };

                let cast = TypeCast::new(
                    lt_share,
                    self.info.revealer.clone(),
                    self.beaver_lt.take().expect("stashed in init"),
                    self.tct_lt.take().expect("stashed in init"),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = BwcState::AwaitingLtCast;
                Ok(())
            }
            BwcState::AwaitingLtCast => {
                let lt = result
                    .and_then(type_cast::downcast::<Gf2>)
                    .ok_or(Error::UnexpectedResultType("BitwiseCompare lt cast"))?;
                self.lt = Some(lt);
                let cast = TypeCast::new(
                    self.equality_share,
                    self.info.revealer.clone(),
                    self.beaver_eq.take().expect("stashed in init"),
                    self.tct_eq.take().expect("stashed in init"),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = BwcState::AwaitingEqCast;
                Ok(())
            }
            BwcState::AwaitingEqCast => {
                let eq = result
                    .and_then(type_cast::downcast::<Gf2>)
                    .ok_or(Error::UnexpectedResultType("BitwiseCompare eq cast"))?;
                let lt = self.lt.take().expect("set by the lt cast");
                ctx.complete_with_result(Box::new(BitwiseCompareOutput { lt, eq }));
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
        Err(Error::UnexpectedMessage("BitwiseCompare"))
    }
}

/// Downcasts a completed `BitwiseCompare`'s result.
#[must_use]
pub fn downcast(result: Box<dyn Any + Send>) -> Option<BitwiseCompareOutput> {
    result.downcast::<BitwiseCompareOutput>().ok().map(|b| *b)
}
