//! Prefix-OR: for `ell` shared bits `x_0..x_{ell-1}` (most significant
//! first), computes every `p_i = OR(x_0, .., x_i)` in a constant number
//! of batched rounds.
//!
//! The bits are cut into `lambda`-sized blocks, `lambda ~ sqrt(ell)`.
//! Round one ORs each cumulative block prefix (`y_b`); round two masks
//! each bit by its block's "first true block" indicator and sums the
//! masked bits column-wise (`w_j`); round three ORs the cumulative
//! column prefixes (`v_j`); round four recombines block and column
//! results into the per-bit prefix ORs.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::Field;
use crate::peers::Identity;
use crate::protocol::batch::{self, Batch};
use crate::protocol::multiply::{self, Multiply};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{BeaverTriple, ExponentSeries};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::lagrange::generate_lagrange_polynomial_set;
use super::unbounded_fanin_or::{self, UnboundedFaninOr};

/// Shape parameters shared by every `PrefixOr` (and `BitwiseCompare`)
/// over the same bit width: the width `ell`, the block size `lambda`
/// with `lambda^2 > ell`, one pre-computed Lagrange polynomial per
/// fan-in in [`super::lagrange::unbounded_fanin_or_needs`] order, and
/// the revealer identity.
#[derive(Debug)]
pub struct PrefixOrInfo<I: Identity, S: Field> {
    pub ell: usize,
    pub lambda: usize,
    pub lagrange_polynomial_set: Vec<Vec<S>>,
    pub revealer: I,
}

impl<I: Identity, S: Field> PrefixOrInfo<I, S> {
    /// # Panics
    /// Panics if the small field cannot seat the interpolation points
    /// (`S::MODULUS` must exceed `ell + 2`).
    #[must_use]
    pub fn new(ell: usize, revealer: I) -> Self {
        assert!(
            S::MODULUS > (ell as u128) + 2,
            "small modulus {} too small for {} bits",
            S::MODULUS,
            ell
        );
        let lambda = (ell as f64 + 1.0).sqrt().ceil() as usize;
        PrefixOrInfo {
            ell,
            lambda,
            lagrange_polynomial_set: generate_lagrange_polynomial_set::<S>(ell, lambda),
            revealer,
        }
    }

    /// The exponent-series fan-in sizes one `PrefixOr` consumes, in
    /// consumption order.
    #[must_use]
    pub fn fanin_or_needs(&self) -> Vec<usize> {
        super::lagrange::unbounded_fanin_or_needs(self.ell, self.lambda)
    }
}

/// The pre-dealt randomness one `PrefixOr` consumes: one exponent
/// series per needed fan-in, and a dispenser of Beaver triples for its
/// multiplies.
pub struct PrefixOrRandomness<S: Field> {
    pub exponent_series: Vec<ExponentSeries<S>>,
    pub multiply: Dispenser<BeaverTriple<S>>,
}

enum PrefixOrState {
    AwaitingFirstFaninOr,
    AwaitingFirstMultiply,
    AwaitingSecondFaninOr,
    AwaitingSecondMultiply,
}

pub struct PrefixOr<I: Identity, S: Field> {
    input_vals: Vec<S>,
    info: Arc<PrefixOrInfo<I, S>>,
    randomness: PrefixOrRandomness<S>,
    series_index: usize,
    y_values: Vec<S>,
    v_values: Vec<S>,
    state: PrefixOrState,
}

impl<I: Identity, S: Field> PrefixOr<I, S> {
    #[must_use]
    pub fn new(
        input_vals: Vec<S>,
        info: Arc<PrefixOrInfo<I, S>>,
        randomness: PrefixOrRandomness<S>,
    ) -> Self {
        PrefixOr {
            input_vals,
            info,
            randomness,
            series_index: 0,
            y_values: Vec::new(),
            v_values: Vec::new(),
            state: PrefixOrState::AwaitingFirstFaninOr,
        }
    }

    fn next_fanin_or(&mut self, current_a: S, fan_in: usize) -> Result<UnboundedFaninOr<I, S>> {
        let series = self
            .randomness
            .exponent_series
            .get_mut(self.series_index)
            .map(|s| {
                std::mem::replace(
                    s,
                    ExponentSeries {
                        powers: Vec::new(),
                        inverse: S::ZERO,
                    },
                )
            })
            .ok_or(Error::InconsistentRandomnessInfo {
                kind: "PrefixOr ran out of exponent series",
            })?;
        let polynomial = self.info.lagrange_polynomial_set[self.series_index].clone();
        self.series_index += 1;
        Ok(UnboundedFaninOr::new(
            current_a,
            fan_in,
            series,
            self.randomness.multiply.draw()?,
            polynomial,
            self.info.revealer.clone(),
        ))
    }

    fn unpack<F: Field>(results: Option<Box<dyn Any + Send>>, what: &'static str) -> Result<Vec<F>> {
        let results = results
            .and_then(batch::downcast_results)
            .ok_or(Error::UnexpectedResultType(what))?;
        results
            .into_iter()
            .map(|r| {
                r.and_then(unbounded_fanin_or::downcast::<F>)
                    .ok_or(Error::UnexpectedResultType(what))
            })
            .collect()
    }
}

#[async_trait]
impl<I: Identity, S: Field> Fronctocol<I> for PrefixOr<I, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let lambda = self.info.lambda;
        crate::invariant!(
            self.input_vals.len() == self.info.ell && lambda * lambda > self.input_vals.len(),
            Error::InconsistentRandomnessInfo {
                kind: "PrefixOr input width disagrees with its info"
            }
        );
        let mut fanin_ors = Vec::new();
        let mut current_a = S::ZERO;
        for i in 0..self.input_vals.len() {
            current_a += self.input_vals[i];
            if (i + 1) % lambda == 0 {
                fanin_ors.push(self.next_fanin_or(current_a, i + 1)?);
            }
        }
        if self.input_vals.len() % lambda != 0 {
            fanin_ors.push(self.next_fanin_or(current_a, self.input_vals.len())?);
        }
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(Batch::of(fanin_ors)), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PrefixOr"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let lambda = self.info.lambda;
        let len = self.input_vals.len();
        let first_block = lambda.min(len);
        match self.state {
            PrefixOrState::AwaitingFirstFaninOr => {
                self.y_values = Self::unpack(result, "PrefixOr first fan-in batch")?;

                let mut multiplies = Vec::with_capacity(len);
                for i in 0..first_block {
                    multiplies.push(Multiply::new(
                        self.input_vals[i],
                        self.y_values[i / lambda],
                        self.randomness.multiply.draw()?,
                        self.info.revealer.clone(),
                    ));
                }
                for i in first_block..len {
                    let block = i / lambda;
                    multiplies.push(Multiply::new(
                        self.input_vals[i],
                        self.y_values[block] - self.y_values[block - 1],
                        self.randomness.multiply.draw()?,
                        self.info.revealer.clone(),
                    ));
                }
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(Batch::of(multiplies)), peers);
                self.state = PrefixOrState::AwaitingFirstMultiply;
                Ok(())
            }
            PrefixOrState::AwaitingFirstMultiply => {
                let masked: Vec<S> = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("PrefixOr first multiply batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(multiply::downcast::<S>)
                            .ok_or(Error::UnexpectedResultType("PrefixOr first multiply batch"))
                    })
                    .collect::<Result<_>>()?;

                // Column sums of the masked bits: only the first true
                // block survives the masking, so w_j is that block's
                // j-th bit.
                let mut fanin_ors = Vec::with_capacity(lambda);
                let mut current_a = S::ZERO;
                for j in 0..lambda {
                    let mut w = S::ZERO;
                    let mut i = 0;
                    while i * lambda + j < len {
                        w += masked[i * lambda + j];
                        i += 1;
                    }
                    current_a += w;
                    fanin_ors.push(self.next_fanin_or(current_a, j + 1)?);
                }
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(Batch::of(fanin_ors)), peers);
                self.state = PrefixOrState::AwaitingSecondFaninOr;
                Ok(())
            }
            PrefixOrState::AwaitingSecondFaninOr => {
                self.v_values = Self::unpack(result, "PrefixOr second fan-in batch")?;

                let mut multiplies = Vec::with_capacity(len);
                for i in 0..first_block {
                    multiplies.push(Multiply::new(
                        self.y_values[i / lambda],
                        self.v_values[i % lambda],
                        self.randomness.multiply.draw()?,
                        self.info.revealer.clone(),
                    ));
                }
                for i in first_block..len {
                    let block = i / lambda;
                    multiplies.push(Multiply::new(
                        self.y_values[block] - self.y_values[block - 1],
                        self.v_values[i % lambda],
                        self.randomness.multiply.draw()?,
                        self.info.revealer.clone(),
                    ));
                }
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(Batch::of(multiplies)), peers);
                self.state = PrefixOrState::AwaitingSecondMultiply;
                Ok(())
            }
            PrefixOrState::AwaitingSecondMultiply => {
                let products: Vec<S> = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("PrefixOr second multiply batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(multiply::downcast::<S>)
                            .ok_or(Error::UnexpectedResultType("PrefixOr second multiply batch"))
                    })
                    .collect::<Result<_>>()?;

                let mut or_results = Vec::with_capacity(len);
                for i in 0..first_block {
                    or_results.push(products[i]);
                }
                for i in first_block..len {
                    or_results.push(products[i] + self.y_values[i / lambda - 1]);
                }
                ctx.complete_with_result(Box::new(or_results));
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
        Err(Error::UnexpectedMessage("PrefixOr"))
    }
}

/// Downcasts a completed `PrefixOr`'s result: one share per input bit.
#[must_use]
pub fn downcast<S: Field>(result: Box<dyn Any + Send>) -> Option<Vec<S>> {
    result.downcast::<Vec<S>>().ok().map(|b| *b)
}
