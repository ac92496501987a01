//! Single-Input-Single-Output sort: pads the list to a power of two,
//! destroys its ordering with a [`WaksmanShuffle`], then runs
//! [`QuickSort`] with batched MPC comparisons. The shuffle is what makes
//! the quicksort's revealed comparison pattern harmless: it only
//! describes a uniformly random permutation of the rows.
//!
//! The shuffle's randomness (three Beaver dispensers and the network's
//! control bits) is pre-drawn here through a chain of dealer promises;
//! the quicksort provisions its own comparison randomness once it
//! starts.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::compare::compare::CompareInfo;
use crate::randomness::dealer::{downcast_dispenser, Patron};
use crate::randomness::kinds::{BeaverInfo, BeaverTriple, WaksmanBits, WaksmanInfo};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::observation::ObservationList;
use super::quicksort::{self, QuickSort};
use super::waksman::{self, WaksmanShuffle};

enum SisoState {
    AwaitingArithmeticBeavers,
    AwaitingKeyBeavers,
    AwaitingXorBeavers,
    AwaitingWaksmanBits,
    AwaitingWaksman,
    AwaitingQuickSort,
}

pub struct SisoSort<I: Identity, P: Field, S: Field> {
    list: Option<ObservationList<P>>,
    revealer: I,
    dealer: I,
    d: usize,
    expanded: usize,
    arithmetic_beavers: Option<crate::randomness::dispenser::Dispenser<BeaverTriple<P>>>,
    key_beavers: Option<crate::randomness::dispenser::Dispenser<BeaverTriple<P>>>,
    xor_beavers: Option<crate::randomness::dispenser::Dispenser<BeaverTriple<Gf2>>>,
    pending_id: Option<FronctocolId>,
    state: SisoState,
    _small: std::marker::PhantomData<S>,
}

impl<I: Identity, P: Field, S: Field> SisoSort<I, P, S> {
    #[must_use]
    pub fn new(list: ObservationList<P>, revealer: I, dealer: I) -> Self {
        let n = list.elements.len();
        let d = n.next_power_of_two().trailing_zeros().max(1) as usize;
        SisoSort {
            list: Some(list),
            revealer,
            dealer,
            d,
            expanded: 1 << d,
            arithmetic_beavers: None,
            key_beavers: None,
            xor_beavers: None,
            pending_id: None,
            state: SisoState::AwaitingArithmeticBeavers,
            _small: std::marker::PhantomData,
        }
    }

    fn switches(&self) -> usize {
        (self.d - 1) * self.expanded + 1
    }

    fn next_patron<Info: crate::randomness::kinds::RandomnessInfo>(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        count: usize,
        info: Info,
    ) {
        let patron = Patron::new(self.dealer.clone(), count as u64, info);
        let peers = ctx.peers().clone();
        let id = ctx.promise(Box::new(patron), peers);
        ctx.await_promise(id);
        self.pending_id = Some(id);
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for SisoSort<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let list = self.list.as_ref().expect("constructed with a list");
        list.schema_check()?;
        if list.elements.len() < 2 {
            let list = self.list.take().expect("just checked");
            ctx.complete_with_result(Box::new(list));
            return Ok(());
        }
        let count = self.switches() * list.num_arithmetic_payload_cols;
        self.next_patron(ctx, count, BeaverInfo::<P>::new());
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("SisoSort"))
    }

    async fn handle_promise(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        promise: FronctocolId,
        result: Box<dyn Any + Send>,
    ) -> Result<()> {
        if Some(promise) != self.pending_id {
            return Err(Error::UnexpectedMessage("SisoSort"));
        }
        let list = self.list.as_ref().expect("owned until completion");
        match self.state {
            SisoState::AwaitingArithmeticBeavers => {
                self.arithmetic_beavers = Some(
                    downcast_dispenser::<BeaverTriple<P>>(result)
                        .ok_or(Error::UnexpectedResultType("SisoSort arithmetic beavers"))?,
                );
                let count = self.switches() * list.num_key_cols;
                self.next_patron(ctx, count, BeaverInfo::<P>::new());
                self.state = SisoState::AwaitingKeyBeavers;
                Ok(())
            }
            SisoState::AwaitingKeyBeavers => {
                self.key_beavers = Some(
                    downcast_dispenser::<BeaverTriple<P>>(result)
                        .ok_or(Error::UnexpectedResultType("SisoSort key beavers"))?,
                );
                let count = self.switches() * (list.num_xor_payload_cols + 1);
                self.next_patron(ctx, count, BeaverInfo::<Gf2>::new());
                self.state = SisoState::AwaitingXorBeavers;
                Ok(())
            }
            SisoState::AwaitingXorBeavers => {
                self.xor_beavers = Some(
                    downcast_dispenser::<BeaverTriple<Gf2>>(result)
                        .ok_or(Error::UnexpectedResultType("SisoSort xor beavers"))?,
                );
                self.next_patron(ctx, 1, WaksmanInfo::<P>::new(self.d));
                self.state = SisoState::AwaitingWaksmanBits;
                Ok(())
            }
            SisoState::AwaitingWaksmanBits => {
                let mut dispenser = downcast_dispenser::<WaksmanBits<P>>(result)
                    .ok_or(Error::UnexpectedResultType("SisoSort waksman bits"))?;
                let bits = dispenser.draw()?;
                let shuffle = WaksmanShuffle::new(
                    self.list.take().expect("owned until the shuffle starts"),
                    self.d,
                    bits,
                    self.arithmetic_beavers.take().expect("drawn earlier in the chain"),
                    self.key_beavers.take().expect("drawn earlier in the chain"),
                    self.xor_beavers.take().expect("drawn earlier in the chain"),
                    self.revealer.clone(),
                );
                let mut peers = ctx.peers().clone();
                peers.remove(&self.dealer);
                ctx.invoke(Box::new(shuffle), peers);
                self.state = SisoState::AwaitingWaksman;
                Ok(())
            }
            _ => Err(Error::UnexpectedMessage("SisoSort")),
        }
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            SisoState::AwaitingWaksman => {
                let shuffled = result
                    .and_then(waksman::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("SisoSort shuffle"))?;
                let info = Arc::new(CompareInfo::<I, P, S>::new(self.revealer.clone()));
                let quicksort = QuickSort::new(shuffled, info, self.dealer.clone());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(quicksort), peers);
                self.state = SisoState::AwaitingQuickSort;
                Ok(())
            }
            SisoState::AwaitingQuickSort => {
                let sorted = result
                    .and_then(quicksort::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("SisoSort quicksort"))?;
                ctx.complete_with_result(Box::new(sorted));
                Ok(())
            }
            _ => Err(Error::UnexpectedMessage("SisoSort")),
        }
    }
}

/// Downcasts a completed `SisoSort`'s result: the sorted list.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<ObservationList<P>> {
    result.downcast::<ObservationList<P>>().ok().map(|b| *b)
}
