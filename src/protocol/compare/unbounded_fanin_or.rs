//! OR of an arbitrary number of secret-shared bits.
//!
//! The sum of `n` arithmetically-shared 0/1 values lands in `0..=n`, so
//! the OR is the Lagrange polynomial of
//! [`super::lagrange::prefix_or_coefficients`] evaluated at
//! `A = 1 + sum`. Revealing `A` directly would leak the count of set
//! bits, so it is masked multiplicatively with a pre-dealt
//! [`ExponentSeries`]: one [`Multiply`] produces a share of `A * r^-1`,
//! a [`Reveal`] opens that uniformly-random non-zero scalar, and every
//! party then gets a share of `A^k` for free as
//! `(A * r^-1)^k * share_of(r^k)` — a public power times a pre-shared
//! one.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::Field;
use crate::peers::Identity;
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::reveal::{self, Reveal};
use crate::randomness::kinds::{BeaverTriple, ExponentSeries};
use async_trait::async_trait;
use std::any::Any;

enum UfoState {
    AwaitingMultiply,
    AwaitingReveal,
}

/// ORs `num_values` arithmetically-shared bits whose local sum is
/// `sum_of_values`. The completed result is a share of the OR.
pub struct UnboundedFaninOr<I: Identity, F: Field> {
    sum_of_values: F,
    num_values: usize,
    series: ExponentSeries<F>,
    beaver: Option<BeaverTriple<F>>,
    lagrange_polynomial: Vec<F>,
    revealer: I,
    state: UfoState,
}

impl<I: Identity, F: Field> UnboundedFaninOr<I, F> {
    #[must_use]
    pub fn new(
        sum_of_values: F,
        num_values: usize,
        series: ExponentSeries<F>,
        beaver: BeaverTriple<F>,
        lagrange_polynomial: Vec<F>,
        revealer: I,
    ) -> Self {
        UnboundedFaninOr {
            sum_of_values,
            num_values,
            series,
            beaver: Some(beaver),
            lagrange_polynomial,
            revealer,
            state: UfoState::AwaitingMultiply,
        }
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for UnboundedFaninOr<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        crate::invariant!(
            self.series.powers.len() >= self.num_values
                && self.lagrange_polynomial.len() == self.num_values + 1,
            Error::InconsistentRandomnessInfo {
                kind: "ExponentSeries or polynomial degree below the fan-in"
            }
        );
        let mut a = self.sum_of_values;
        if *ctx.me() == self.revealer {
            a += F::ONE;
        }
        let beaver = self.beaver.take().expect("constructed with a triple");
        let multiply = Multiply::new(a, self.series.inverse, beaver, self.revealer.clone());
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(multiply), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("UnboundedFaninOr"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            UfoState::AwaitingMultiply => {
                let masked = result
                    .and_then(multiply::downcast::<F>)
                    .ok_or(Error::UnexpectedResultType("UnboundedFaninOr multiply"))?;
                let reveal = Reveal::new(masked, self.revealer.clone());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(reveal), peers);
                self.state = UfoState::AwaitingReveal;
                Ok(())
            }
            UfoState::AwaitingReveal => {
                let a_times_r_inv = result
                    .and_then(reveal::downcast::<F>)
                    .ok_or(Error::UnexpectedResultType("UnboundedFaninOr reveal"))?;
                let mut total = if *ctx.me() == self.revealer {
                    self.lagrange_polynomial[0]
                } else {
                    F::ZERO
                };
                let mut public_power = F::ONE;
                for i in 1..self.lagrange_polynomial.len() {
                    public_power *= a_times_r_inv;
                    total += self.lagrange_polynomial[i] * public_power * self.series.powers[i - 1];
                }
                ctx.complete_with_result(Box::new(total));
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
        Err(Error::UnexpectedMessage("UnboundedFaninOr"))
    }
}

/// Downcasts a completed `UnboundedFaninOr`'s result.
#[must_use]
pub fn downcast<F: Field>(result: Box<dyn Any + Send>) -> Option<F> {
    result.downcast::<F>().ok().map(|b| *b)
}
