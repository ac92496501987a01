//! Oblivious random permutation of an [`ObservationList`] through a
//! Waksman network driven by dealer-supplied control bit shares.
//!
//! The network runs `d` "left half" stages (switch span doubling each
//! stage) followed by `d - 1` "right half" stages (span halving back
//! down), `(d - 1) * 2^d + 1` switches in all. Each switch consumes one
//! control bit share per column group and conditionally exchanges two
//! rows: one multiply of the control bit by the column difference,
//! added to one side and subtracted from the other, moves every column
//! without revealing whether the rows crossed.
//!
//! Before the first stage the list is padded to `2^d` rows and every
//! row gains a boolean live-row marker (shared `1` for real rows, `0`
//! for padding). After the last stage the markers are revealed and the
//! padding rows, wherever the permutation carried them, are deleted.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::batch::{self, Batch};
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::reveal::{self, Reveal};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{BeaverTriple, WaksmanBits};
use async_trait::async_trait;
use std::any::Any;

use super::observation::{Observation, ObservationList};

enum ShuffleState {
    LeftHalf,
    RightHalf,
    AwaitingFinalReveal,
}

pub struct WaksmanShuffle<I: Identity, P: Field> {
    list: Option<ObservationList<P>>,
    d: usize,
    bits: WaksmanBits<P>,
    arithmetic_beavers: Dispenser<BeaverTriple<P>>,
    key_beavers: Dispenser<BeaverTriple<P>>,
    xor_beavers: Dispenser<BeaverTriple<Gf2>>,
    revealer: I,
    depth: usize,
    counter: usize,
    stage_pairs: Vec<(usize, usize)>,
    arithmetic_results: Vec<P>,
    xor_batch: Option<Vec<Multiply<I, Gf2>>>,
    awaiting_arithmetic: bool,
    state: ShuffleState,
}

impl<I: Identity, P: Field> WaksmanShuffle<I, P> {
    #[must_use]
    pub fn new(
        list: ObservationList<P>,
        d: usize,
        bits: WaksmanBits<P>,
        arithmetic_beavers: Dispenser<BeaverTriple<P>>,
        key_beavers: Dispenser<BeaverTriple<P>>,
        xor_beavers: Dispenser<BeaverTriple<Gf2>>,
        revealer: I,
    ) -> Self {
        WaksmanShuffle {
            list: Some(list),
            d,
            bits,
            arithmetic_beavers,
            key_beavers,
            xor_beavers,
            revealer,
            depth: 0,
            counter: 0,
            stage_pairs: Vec::new(),
            arithmetic_results: Vec::new(),
            xor_batch: None,
            awaiting_arithmetic: false,
            state: ShuffleState::LeftHalf,
        }
    }

    fn current_stage_pairs(&self) -> Vec<(usize, usize)> {
        let n = 1_usize << self.d;
        let half = 1_usize << self.depth;
        let mut pairs = Vec::new();
        match self.state {
            ShuffleState::LeftHalf => {
                for j in 0..half {
                    let mut k = j;
                    while k < n {
                        pairs.push((k, k + half));
                        k += 2 * half;
                    }
                }
            }
            ShuffleState::RightHalf => {
                for j in 0..half {
                    let j_prime = half - 1 - j;
                    let mut k = j_prime + n - 2 * half;
                    while k != j_prime {
                        pairs.push((k, k + half));
                        k -= 2 * half;
                    }
                }
            }
            ShuffleState::AwaitingFinalReveal => unreachable!("no switches after the last stage"),
        }
        pairs
    }

    /// Builds and invokes this stage's arithmetic-and-key multiply
    /// batch, stashing the XOR batch to run right after it.
    fn batch_multiply_for_swaps(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.stage_pairs = self.current_stage_pairs();
        let list = self.list.as_ref().expect("owned until completion");

        let mut field_multiplies = Vec::new();
        let mut xor_multiplies = Vec::new();
        for &(low, high) in &self.stage_pairs {
            let key_bit = self.bits.key[self.counter];
            let arith_bit = self.bits.arithmetic[self.counter];
            let xor_bit = self.bits.xor[self.counter];
            for col in 0..list.num_key_cols {
                let difference =
                    list.elements[high].key_cols[col] - list.elements[low].key_cols[col];
                field_multiplies.push(Multiply::new(
                    key_bit,
                    difference,
                    self.key_beavers.draw()?,
                    self.revealer.clone(),
                ));
            }
            for col in 0..list.num_arithmetic_payload_cols {
                let difference = list.elements[high].arithmetic_payload_cols[col]
                    - list.elements[low].arithmetic_payload_cols[col];
                field_multiplies.push(Multiply::new(
                    arith_bit,
                    difference,
                    self.arithmetic_beavers.draw()?,
                    self.revealer.clone(),
                ));
            }
            // The extra column is the live-row marker appended in init.
            for col in 0..list.num_xor_payload_cols + 1 {
                let difference =
                    list.elements[high].xor_payload_cols[col] + list.elements[low].xor_payload_cols[col];
                xor_multiplies.push(Multiply::new(
                    xor_bit,
                    difference,
                    self.xor_beavers.draw()?,
                    self.revealer.clone(),
                ));
            }
            self.counter += 1;
        }

        self.xor_batch = Some(xor_multiplies);
        self.awaiting_arithmetic = true;
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(Batch::of(field_multiplies)), peers);
        Ok(())
    }

    fn apply_stage(&mut self, xor_results: Vec<Gf2>) -> Result<()> {
        let list = self.list.as_mut().expect("owned until completion");
        let per_pair_fields = list.num_key_cols + list.num_arithmetic_payload_cols;
        let per_pair_xor = list.num_xor_payload_cols + 1;
        crate::invariant!(
            self.arithmetic_results.len() == self.stage_pairs.len() * per_pair_fields
                && xor_results.len() == self.stage_pairs.len() * per_pair_xor,
            Error::InconsistentRandomnessInfo {
                kind: "Waksman stage result count disagrees with its switch count"
            }
        );
        let mut field_at = 0;
        let mut xor_at = 0;
        for &(low, high) in &self.stage_pairs {
            for col in 0..list.num_key_cols {
                let delta = self.arithmetic_results[field_at];
                field_at += 1;
                list.elements[low].key_cols[col] += delta;
                list.elements[high].key_cols[col] -= delta;
            }
            for col in 0..list.num_arithmetic_payload_cols {
                let delta = self.arithmetic_results[field_at];
                field_at += 1;
                list.elements[low].arithmetic_payload_cols[col] += delta;
                list.elements[high].arithmetic_payload_cols[col] -= delta;
            }
            for col in 0..per_pair_xor {
                let delta = xor_results[xor_at];
                xor_at += 1;
                list.elements[low].xor_payload_cols[col] += delta;
                list.elements[high].xor_payload_cols[col] += delta;
            }
        }
        self.arithmetic_results.clear();
        Ok(())
    }

    fn launch_final_reveal(&mut self, ctx: &mut FronctocolContext<I>) {
        let list = self.list.as_ref().expect("owned until completion");
        let marker_col = list.num_xor_payload_cols;
        let reveals: Vec<Reveal<I, Gf2>> = list
            .elements
            .iter()
            .map(|row| Reveal::new(row.xor_payload_cols[marker_col], self.revealer.clone()))
            .collect();
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(Batch::of(reveals)), peers);
        self.state = ShuffleState::AwaitingFinalReveal;
    }

    fn advance(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        match self.state {
            ShuffleState::LeftHalf => {
                if self.depth + 1 == self.d {
                    if self.d == 1 {
                        self.launch_final_reveal(ctx);
                        return Ok(());
                    }
                    self.state = ShuffleState::RightHalf;
                    self.depth = self.d - 2;
                } else {
                    self.depth += 1;
                }
                self.batch_multiply_for_swaps(ctx)
            }
            ShuffleState::RightHalf => {
                if self.depth == 0 {
                    self.launch_final_reveal(ctx);
                    Ok(())
                } else {
                    self.depth -= 1;
                    self.batch_multiply_for_swaps(ctx)
                }
            }
            ShuffleState::AwaitingFinalReveal => unreachable!("advance only runs between stages"),
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field> Fronctocol<I> for WaksmanShuffle<I, P> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let list = self.list.as_mut().expect("constructed with a list");
        list.schema_check()?;
        let n = 1_usize << self.d;
        crate::invariant!(
            list.elements.len() <= n && self.bits.arithmetic.len() == (self.d - 1) * n + 1,
            Error::InconsistentRandomnessInfo {
                kind: "Waksman control bits disagree with the list size"
            }
        );

        // Live-row marker: shares of 1 on real rows, 0 on padding.
        let marker = if *ctx.me() == self.revealer { Gf2::ONE } else { Gf2::ZERO };
        for row in &mut list.elements {
            row.xor_payload_cols.push(marker);
        }
        while list.elements.len() < n {
            list.elements.push(Observation {
                key_cols: vec![P::ZERO; list.num_key_cols],
                arithmetic_payload_cols: vec![P::ZERO; list.num_arithmetic_payload_cols],
                xor_payload_cols: vec![Gf2::ZERO; list.num_xor_payload_cols + 1],
            });
        }

        self.batch_multiply_for_swaps(ctx)
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("WaksmanShuffle"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        if self.awaiting_arithmetic {
            self.arithmetic_results = result
                .and_then(batch::downcast_results)
                .ok_or(Error::UnexpectedResultType("Waksman field multiply batch"))?
                .into_iter()
                .map(|r| {
                    r.and_then(multiply::downcast::<P>)
                        .ok_or(Error::UnexpectedResultType("Waksman field multiply batch"))
                })
                .collect::<Result<_>>()?;
            self.awaiting_arithmetic = false;
            let xor_batch = self.xor_batch.take().expect("stashed with the field batch");
            let peers = ctx.peers().clone();
            ctx.invoke(Box::new(Batch::of(xor_batch)), peers);
            return Ok(());
        }

        match self.state {
            ShuffleState::LeftHalf | ShuffleState::RightHalf => {
                let xor_results: Vec<Gf2> = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("Waksman xor multiply batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(multiply::downcast::<Gf2>)
                            .ok_or(Error::UnexpectedResultType("Waksman xor multiply batch"))
                    })
                    .collect::<Result<_>>()?;
                self.apply_stage(xor_results)?;
                self.advance(ctx)
            }
            ShuffleState::AwaitingFinalReveal => {
                let markers: Vec<Gf2> = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("Waksman marker reveal batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(reveal::downcast::<Gf2>)
                            .ok_or(Error::UnexpectedResultType("Waksman marker reveal batch"))
                    })
                    .collect::<Result<_>>()?;
                let mut list = self.list.take().expect("owned until completion");
                let marker_col = list.num_xor_payload_cols;
                for i in (0..list.elements.len()).rev() {
                    if markers[i].as_bool() {
                        list.elements[i].xor_payload_cols.remove(marker_col);
                    } else {
                        list.elements.remove(i);
                    }
                }
                ctx.complete_with_result(Box::new(list));
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
        Err(Error::UnexpectedMessage("WaksmanShuffle"))
    }
}

/// Downcasts a completed `WaksmanShuffle`'s result: the permuted list,
/// padding removed.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<ObservationList<P>> {
    result.downcast::<ObservationList<P>>().ok().map(|b| *b)
}
