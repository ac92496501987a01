//! Iterative quicksort over a secret-shared [`ObservationList`] whose
//! comparisons are batched MPC comparisons.
//!
//! The recursion is unpacked: each round keeps a list of disjoint
//! `[lo, hi]` blocks still to be sorted, compares every live row
//! against its block's middle element under MPC, reveals the per-row
//! outcome, and Hoare-partitions each block in the clear on the
//! revealed bits. Revealing the comparison pattern is safe here because
//! the caller shuffles the list through a random permutation first;
//! the pattern then only describes a secret permutation of the data.
//!
//! Randomness is pre-provisioned in one patron chain sized for the
//! worst case of `n * k * (3 * log2(n) + 1)` comparisons.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::{Identity, PeerSet};
use crate::protocol::batch::{self, Batch};
use crate::protocol::compare::compare::{
    self, Compare, CompareInfo, CompareOutput, CompareRandomness,
};
use crate::protocol::compare::dealer::CompareRandomnessPatron;
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::reveal::{self, Reveal};
use crate::randomness::dealer::{downcast_dispenser, Patron};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{BeaverInfo, BeaverTriple};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

const DO_NOT_COMPARE: usize = usize::MAX;

/// Worst-case number of comparisons an `n`-row, `k`-key-column sort
/// performs.
#[must_use]
pub fn max_number_compares(n: usize, num_key_cols: usize) -> usize {
    let log = (n.max(2) as f64).log2();
    n * num_key_cols * (3.0 * log + 1.0) as usize
}

/// Boolean triples the lexicographic combination rounds consume.
#[must_use]
pub fn xor_beaver_triples_needed(n: usize, num_key_cols: usize) -> usize {
    max_number_compares(n, num_key_cols) * (num_key_cols - 1) / num_key_cols
}

enum SortState {
    AwaitingCompareDispenser,
    AwaitingXorDispenser,
    AwaitingBatchedCompare,
    AwaitingBatchedMultiply,
    AwaitingBatchedReveal,
}

pub struct QuickSort<I: Identity, P: Field, S: Field> {
    list: Option<ObservationList<P>>,
    info: Arc<CompareInfo<I, P, S>>,
    dealer: I,
    pivots: Vec<usize>,
    blocks: Vec<(usize, usize)>,
    /// Revealed per-row outcome: 0 below the pivot, 1 above, 2 for rows
    /// outside this round's comparisons (the pivots themselves).
    comparisons: Vec<u8>,
    compare_outputs: Vec<CompareOutput>,
    partial: Vec<Gf2>,
    multiplies_remaining: usize,
    compare_dispenser: Option<Dispenser<CompareRandomness<P, S>>>,
    xor_beavers: Option<Dispenser<BeaverTriple<Gf2>>>,
    compare_patron_id: Option<FronctocolId>,
    xor_patron_id: Option<FronctocolId>,
    state: SortState,
}

use super::observation::ObservationList;

impl<I: Identity, P: Field, S: Field> QuickSort<I, P, S> {
    #[must_use]
    pub fn new(list: ObservationList<P>, info: Arc<CompareInfo<I, P, S>>, dealer: I) -> Self {
        let n = list.elements.len();
        QuickSort {
            list: Some(list),
            info,
            dealer,
            pivots: vec![0; n],
            blocks: Vec::new(),
            comparisons: vec![2; n],
            compare_outputs: Vec::new(),
            partial: Vec::new(),
            multiplies_remaining: 0,
            compare_dispenser: None,
            xor_beavers: None,
            compare_patron_id: None,
            xor_patron_id: None,
            state: SortState::AwaitingCompareDispenser,
        }
    }

    fn computing_peers(&self, ctx: &FronctocolContext<I>) -> PeerSet<I> {
        let mut peers = ctx.peers().clone();
        peers.remove(&self.dealer);
        peers
    }

    fn run_comparisons(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let list = self.list.as_ref().expect("owned until completion");
        let dispenser = self.compare_dispenser.as_mut().expect("provisioned before sorting");
        let mut compares = Vec::new();
        for (i, row) in list.elements.iter().enumerate() {
            let pivot = self.pivots[i];
            if pivot == DO_NOT_COMPARE || pivot == i {
                continue;
            }
            for col in 0..list.num_key_cols {
                compares.push(Compare::new(
                    row.key_cols[col],
                    list.elements[pivot].key_cols[col],
                    Arc::clone(&self.info),
                    dispenser.draw()?,
                ));
            }
        }
        let peers = self.computing_peers(ctx);
        ctx.invoke(Box::new(Batch::of(compares)), peers);
        self.state = SortState::AwaitingBatchedCompare;
        Ok(())
    }

    /// One round of the lexicographic AND-combination: folds key column
    /// `col`'s outcome into the running per-row bit.
    fn combine_round(&mut self, ctx: &mut FronctocolContext<I>, first: bool) -> Result<()> {
        let k = self.list.as_ref().expect("owned until completion").num_key_cols;
        let rows = self.compare_outputs.len() / k;
        let xor_beavers = self.xor_beavers.as_mut().expect("provisioned before sorting");
        let mut multiplies = Vec::with_capacity(rows);
        let col = self.multiplies_remaining;
        for row in 0..rows {
            let eq_prev = self.compare_outputs[row * k + col - 1].eq;
            let operand = if first {
                self.compare_outputs[row * k + col].gt
            } else {
                self.partial[row] + self.compare_outputs[row * k + col].gt
            };
            multiplies.push(Multiply::new(
                eq_prev,
                operand,
                xor_beavers.draw()?,
                self.info.revealer().clone(),
            ));
        }
        let peers = self.computing_peers(ctx);
        ctx.invoke(Box::new(Batch::of(multiplies)), peers);
        self.state = SortState::AwaitingBatchedMultiply;
        Ok(())
    }

    fn reveal_outcomes(&mut self, ctx: &mut FronctocolContext<I>) {
        let k = self.list.as_ref().expect("owned until completion").num_key_cols;
        let revealer = self.info.revealer().clone();
        let reveals: Vec<Reveal<I, Gf2>> = if k == 1 {
            // Single key column: the full two-bit outcome is opened,
            // greater bits first, equal bits after.
            self.compare_outputs
                .iter()
                .map(|o| o.gt)
                .chain(self.compare_outputs.iter().map(|o| o.eq))
                .map(|bit| Reveal::new(bit, revealer.clone()))
                .collect()
        } else {
            self.partial
                .iter()
                .enumerate()
                .map(|(row, &p)| Reveal::new(p + self.compare_outputs[row * k].gt, revealer.clone()))
                .collect()
        };
        let peers = self.computing_peers(ctx);
        ctx.invoke(Box::new(Batch::of(reveals)), peers);
        self.state = SortState::AwaitingBatchedReveal;
    }

    /// Hoare partition of every live block on the revealed outcomes;
    /// returns true when every block has shrunk to a single row.
    fn partition(&mut self) -> bool {
        let list = self.list.as_mut().expect("owned until completion");
        let mut done = true;
        let mut next_blocks = Vec::with_capacity(self.blocks.len() * 2);
        for &(lo, hi) in &self.blocks {
            if lo >= hi {
                next_blocks.push((lo, hi));
                continue;
            }
            let (mut i, mut j) = (lo, hi);
            loop {
                while self.comparisons[i] == 0 {
                    i += 1;
                }
                while self.comparisons[j] == 1 {
                    j -= 1;
                }
                if i >= j {
                    break;
                }
                list.swap(i, j);
                self.comparisons.swap(i, j);
                i += 1;
                j -= 1;
            }
            next_blocks.push((lo, j));
            next_blocks.push((j + 1, hi));

            if lo < j {
                done = false;
                for k in lo..=j {
                    self.pivots[k] = (lo + j) / 2;
                }
            } else {
                self.pivots[j] = DO_NOT_COMPARE;
            }
            if j + 1 < hi {
                done = false;
                for k in j + 1..=hi {
                    self.pivots[k] = (j + 1 + hi) / 2;
                }
            } else {
                self.pivots[j + 1] = DO_NOT_COMPARE;
            }
        }
        self.blocks = next_blocks;
        done
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for QuickSort<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let list = self.list.as_ref().expect("constructed with a list");
        list.schema_check()?;
        let n = list.elements.len();
        if n < 2 {
            let list = self.list.take().expect("just checked");
            ctx.complete_with_result(Box::new(list));
            return Ok(());
        }
        self.blocks.push((0, n - 1));
        for pivot in &mut self.pivots {
            *pivot = (n - 1) / 2;
        }

        let max_compares = max_number_compares(n, list.num_key_cols);
        let patron = CompareRandomnessPatron::new(
            Arc::clone(&self.info),
            self.dealer.clone(),
            max_compares,
        );
        let peers = ctx.peers().clone();
        let id = ctx.promise(Box::new(patron), peers);
        ctx.await_promise(id);
        self.compare_patron_id = Some(id);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("QuickSort"))
    }

    async fn handle_promise(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        promise: FronctocolId,
        result: Box<dyn Any + Send>,
    ) -> Result<()> {
        match self.state {
            SortState::AwaitingCompareDispenser if Some(promise) == self.compare_patron_id => {
                self.compare_dispenser = Some(
                    downcast_dispenser::<CompareRandomness<P, S>>(result)
                        .ok_or(Error::UnexpectedResultType("QuickSort compare patron"))?,
                );
                let list = self.list.as_ref().expect("owned until completion");
                let count =
                    xor_beaver_triples_needed(list.elements.len(), list.num_key_cols);
                let patron =
                    Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<Gf2>::new());
                let peers = ctx.peers().clone();
                let id = ctx.promise(Box::new(patron), peers);
                ctx.await_promise(id);
                self.xor_patron_id = Some(id);
                self.state = SortState::AwaitingXorDispenser;
                Ok(())
            }
            SortState::AwaitingXorDispenser if Some(promise) == self.xor_patron_id => {
                self.xor_beavers = Some(
                    downcast_dispenser::<BeaverTriple<Gf2>>(result)
                        .ok_or(Error::UnexpectedResultType("QuickSort xor patron"))?,
                );
                self.run_comparisons(ctx)
            }
            _ => Err(Error::UnexpectedMessage("QuickSort")),
        }
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let k = self.list.as_ref().expect("owned until completion").num_key_cols;
        match self.state {
            SortState::AwaitingBatchedCompare => {
                self.compare_outputs = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("QuickSort compare batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(compare::downcast)
                            .ok_or(Error::UnexpectedResultType("QuickSort compare batch"))
                    })
                    .collect::<Result<_>>()?;
                if k == 1 {
                    self.reveal_outcomes(ctx);
                    Ok(())
                } else {
                    self.multiplies_remaining = k - 1;
                    self.combine_round(ctx, true)
                }
            }
            SortState::AwaitingBatchedMultiply => {
                self.partial = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("QuickSort multiply batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(multiply::downcast::<Gf2>)
                            .ok_or(Error::UnexpectedResultType("QuickSort multiply batch"))
                    })
                    .collect::<Result<_>>()?;
                if self.multiplies_remaining > 1 {
                    self.multiplies_remaining -= 1;
                    self.combine_round(ctx, false)
                } else {
                    self.reveal_outcomes(ctx);
                    Ok(())
                }
            }
            SortState::AwaitingBatchedReveal => {
                let opened: Vec<Gf2> = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("QuickSort reveal batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(reveal::downcast::<Gf2>)
                            .ok_or(Error::UnexpectedResultType("QuickSort reveal batch"))
                    })
                    .collect::<Result<_>>()?;
                let rows = self.compare_outputs.len() / k;
                let values: Vec<u8> = if k == 1 {
                    (0..rows)
                        .map(|r| u8::from(opened[r].as_bool()) | (u8::from(opened[rows + r].as_bool()) << 1))
                        .collect()
                } else {
                    opened.iter().map(|b| u8::from(b.as_bool())).collect()
                };

                self.comparisons.iter_mut().for_each(|c| *c = 2);
                let mut at = 0;
                for i in 0..self.pivots.len() {
                    if self.pivots[i] != DO_NOT_COMPARE && self.pivots[i] != i {
                        self.comparisons[i] = values[at];
                        at += 1;
                    }
                }

                if self.partition() {
                    let list = self.list.take().expect("owned until completion");
                    ctx.complete_with_result(Box::new(list));
                    Ok(())
                } else {
                    self.run_comparisons(ctx)
                }
            }
            _ => Err(Error::UnexpectedMessage("QuickSort")),
        }
    }
}

/// Downcasts a completed `QuickSort`'s result: the sorted list.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<ObservationList<P>> {
    result.downcast::<ObservationList<P>>().ok().map(|b| *b)
}
