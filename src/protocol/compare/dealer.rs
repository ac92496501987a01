//! Composite dealer/patron pairs for the comparison stack.
//!
//! Each patron drives a chain of plain [`Patron`] children back to back
//! — one request per underlying randomness kind — then slices the
//! resulting dispensers into per-comparison bundles via
//! `little_dispenser`. The matching house side invokes the mirrored
//! plain [`House`] children in the same order; child instances match
//! across parties because both sides invoke them with identical peer
//! sets in identical order.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::randomness::dealer::{downcast_dispenser, House, Patron};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{
    BeaverInfo, BeaverTriple, DecomposedBitSet, DecomposedBitSetInfo, ExponentSeries,
    ExponentSeriesInfo, TypeCastInfo, TypeCastTriple,
};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::compare::{CompareInfo, CompareRandomness};
use super::lagrange::unbounded_fanin_or_needs;
use super::pos_int_compare::PosIntCompareRandomness;
use super::prefix_or::{PrefixOrInfo, PrefixOrRandomness};

/// Beaver triples one `PrefixOr` consumes on its own: one per unbounded
/// fan-in OR plus one per bit in each of its two multiply rounds.
fn beavers_per_prefix_or(ell: usize, lambda: usize) -> usize {
    2 * ell + unbounded_fanin_or_needs(ell, lambda).len()
}

// ---- PrefixOr --------------------------------------------------------------

/// Dealer side of a batch of `PrefixOr` bundles.
pub struct PrefixOrRandomnessHouse<I: Identity, S: Field> {
    info: Arc<PrefixOrInfo<I, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, S: Field> PrefixOrRandomnessHouse<I, S> {
    #[must_use]
    pub fn new(info: Arc<PrefixOrInfo<I, S>>) -> Self {
        PrefixOrRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, S: Field> Fronctocol<I> for PrefixOrRandomnessHouse<I, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let needs = unbounded_fanin_or_needs(self.info.ell, self.info.lambda);
        self.dealers_remaining = needs.len() + 1;
        for _ in &needs {
            let peers = ctx.peers().clone();
            ctx.invoke(Box::new(House::<I, ExponentSeriesInfo<S>>::new()), peers);
        }
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<S>>::new()), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PrefixOrRandomnessHouse"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        _result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        self.dealers_remaining -= 1;
        if self.dealers_remaining == 0 {
            ctx.complete();
        }
        Ok(())
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PrefixOrRandomnessHouse"))
    }
}

enum PrefixOrPatronState {
    AwaitingExponentSeries,
    AwaitingMultiply,
}

/// Dataowner side: requests `dispenser_size` full `PrefixOr` bundles
/// and completes with a `Dispenser<PrefixOrRandomness<S>>`.
pub struct PrefixOrRandomnessPatron<I: Identity, S: Field> {
    info: Arc<PrefixOrInfo<I, S>>,
    dealer: I,
    dispenser_size: usize,
    needs: Vec<usize>,
    exponent_dispensers: Vec<Dispenser<ExponentSeries<S>>>,
    state: PrefixOrPatronState,
}

impl<I: Identity, S: Field> PrefixOrRandomnessPatron<I, S> {
    #[must_use]
    pub fn new(info: Arc<PrefixOrInfo<I, S>>, dealer: I, dispenser_size: usize) -> Self {
        let needs = unbounded_fanin_or_needs(info.ell, info.lambda);
        PrefixOrRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            needs,
            exponent_dispensers: Vec::new(),
            state: PrefixOrPatronState::AwaitingExponentSeries,
        }
    }

    fn next_series_patron(&self, ctx: &mut FronctocolContext<I>) {
        let ell = self.needs[self.exponent_dispensers.len()];
        let patron = Patron::new(
            self.dealer.clone(),
            self.dispenser_size as u64,
            ExponentSeriesInfo::<S>::new(ell),
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(patron), peers);
    }
}

#[async_trait]
impl<I: Identity, S: Field> Fronctocol<I> for PrefixOrRandomnessPatron<I, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.next_series_patron(ctx);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PrefixOrRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            PrefixOrPatronState::AwaitingExponentSeries => {
                let dispenser = result
                    .and_then(downcast_dispenser::<ExponentSeries<S>>)
                    .ok_or(Error::UnexpectedResultType("PrefixOr patron exponent series"))?;
                self.exponent_dispensers.push(dispenser);
                if self.exponent_dispensers.len() == self.needs.len() {
                    let count = self.dispenser_size
                        * beavers_per_prefix_or(self.info.ell, self.info.lambda);
                    let patron =
                        Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<S>::new());
                    let peers = ctx.peers().clone();
                    ctx.invoke(Box::new(patron), peers);
                    self.state = PrefixOrPatronState::AwaitingMultiply;
                } else {
                    self.next_series_patron(ctx);
                }
                Ok(())
            }
            PrefixOrPatronState::AwaitingMultiply => {
                let mut beavers = result
                    .and_then(downcast_dispenser::<BeaverTriple<S>>)
                    .ok_or(Error::UnexpectedResultType("PrefixOr patron beavers"))?;
                let per = beavers_per_prefix_or(self.info.ell, self.info.lambda);
                let mut out = Dispenser::new("PrefixOrRandomness");
                for _ in 0..self.dispenser_size {
                    let exponent_series = self
                        .exponent_dispensers
                        .iter_mut()
                        .map(Dispenser::draw)
                        .collect::<Result<Vec<_>>>()?;
                    out.insert(PrefixOrRandomness {
                        exponent_series,
                        multiply: beavers.little_dispenser(per)?,
                    });
                }
                ctx.complete_with_result(Box::new(out));
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
        Err(Error::UnexpectedMessage("PrefixOrRandomnessPatron"))
    }
}

// ---- Compare ---------------------------------------------------------------

/// Dealer side of a batch of [`CompareRandomness`] bundles.
pub struct CompareRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> CompareRandomnessHouse<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>) -> Self {
        CompareRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for CompareRandomnessHouse<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let needs = unbounded_fanin_or_needs(self.info.ell, self.info.lambda);
        self.dealers_remaining = needs.len() + 3;
        for _ in &needs {
            let peers = ctx.peers().clone();
            ctx.invoke(Box::new(House::<I, ExponentSeriesInfo<S>>::new()), peers);
        }
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<S>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, TypeCastInfo<S>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, DecomposedBitSetInfo<P, S>>::new()), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("CompareRandomnessHouse"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        _result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        self.dealers_remaining -= 1;
        if self.dealers_remaining == 0 {
            ctx.complete();
        }
        Ok(())
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("CompareRandomnessHouse"))
    }
}

enum ComparePatronState {
    AwaitingExponentSeries,
    AwaitingMultiply,
    AwaitingTypeCast,
    AwaitingDecomposedBits,
}

/// Dataowner side: requests everything `dispenser_size` comparisons
/// consume and completes with a `Dispenser<CompareRandomness<P, S>>`.
pub struct CompareRandomnessPatron<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealer: I,
    dispenser_size: usize,
    needs: Vec<usize>,
    exponent_dispensers: Vec<Dispenser<ExponentSeries<S>>>,
    multiply_dispenser: Option<Dispenser<BeaverTriple<S>>>,
    tct_dispenser: Option<Dispenser<TypeCastTriple<S>>>,
    state: ComparePatronState,
}

impl<I: Identity, P: Field, S: Field> CompareRandomnessPatron<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>, dealer: I, dispenser_size: usize) -> Self {
        let needs = unbounded_fanin_or_needs(info.ell, info.lambda);
        CompareRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            needs,
            exponent_dispensers: Vec::new(),
            multiply_dispenser: None,
            tct_dispenser: None,
            state: ComparePatronState::AwaitingExponentSeries,
        }
    }

    fn next_series_patron(&self, ctx: &mut FronctocolContext<I>) {
        let ell = self.needs[self.exponent_dispensers.len()];
        let patron = Patron::new(
            self.dealer.clone(),
            self.dispenser_size as u64,
            ExponentSeriesInfo::<S>::new(ell),
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(patron), peers);
    }

    fn generate_output_dispenser(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        mut dbs: Dispenser<DecomposedBitSet<P, S>>,
    ) -> Result<()> {
        let per_compare = self.info.beaver_triples_per_compare();
        let mut beavers = self.multiply_dispenser.take().expect("filled earlier in the chain");
        let mut tcts = self.tct_dispenser.take().expect("filled earlier in the chain");
        let mut out = Dispenser::new("CompareRandomness");
        for _ in 0..self.dispenser_size {
            let exponent_series = self
                .exponent_dispensers
                .iter_mut()
                .map(Dispenser::draw)
                .collect::<Result<Vec<_>>>()?;
            out.insert(CompareRandomness {
                exponent_series,
                multiply: beavers.little_dispenser(per_compare)?,
                tct_lt: tcts.draw()?,
                tct_eq: tcts.draw()?,
                dbs: dbs.draw()?,
            });
        }
        ctx.complete_with_result(Box::new(out));
        Ok(())
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for CompareRandomnessPatron<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.next_series_patron(ctx);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("CompareRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            ComparePatronState::AwaitingExponentSeries => {
                let dispenser = result
                    .and_then(downcast_dispenser::<ExponentSeries<S>>)
                    .ok_or(Error::UnexpectedResultType("Compare patron exponent series"))?;
                self.exponent_dispensers.push(dispenser);
                if self.exponent_dispensers.len() == self.needs.len() {
                    let count = self.dispenser_size * self.info.beaver_triples_per_compare();
                    let patron =
                        Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<S>::new());
                    let peers = ctx.peers().clone();
                    ctx.invoke(Box::new(patron), peers);
                    self.state = ComparePatronState::AwaitingMultiply;
                } else {
                    self.next_series_patron(ctx);
                }
                Ok(())
            }
            ComparePatronState::AwaitingMultiply => {
                self.multiply_dispenser = Some(
                    result
                        .and_then(downcast_dispenser::<BeaverTriple<S>>)
                        .ok_or(Error::UnexpectedResultType("Compare patron beavers"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    (2 * self.dispenser_size) as u64,
                    TypeCastInfo::<S>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = ComparePatronState::AwaitingTypeCast;
                Ok(())
            }
            ComparePatronState::AwaitingTypeCast => {
                self.tct_dispenser = Some(
                    result
                        .and_then(downcast_dispenser::<TypeCastTriple<S>>)
                        .ok_or(Error::UnexpectedResultType("Compare patron type casts"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    self.dispenser_size as u64,
                    DecomposedBitSetInfo::<P, S>::new(self.info.ell),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = ComparePatronState::AwaitingDecomposedBits;
                Ok(())
            }
            ComparePatronState::AwaitingDecomposedBits => {
                let dbs = result
                    .and_then(downcast_dispenser::<DecomposedBitSet<P, S>>)
                    .ok_or(Error::UnexpectedResultType("Compare patron decomposed bits"))?;
                self.generate_output_dispenser(ctx, dbs)
            }
        }
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("CompareRandomnessPatron"))
    }
}

// ---- PosIntCompare ---------------------------------------------------------

/// Dealer side: a full compare house plus a boolean Beaver house.
pub struct PosIntCompareRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> PosIntCompareRandomnessHouse<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>) -> Self {
        PosIntCompareRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for PosIntCompareRandomnessHouse<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.dealers_remaining = 2;
        let peers = ctx.peers().clone();
        ctx.invoke(
            Box::new(CompareRandomnessHouse::new(Arc::clone(&self.info))),
            peers,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<Gf2>>::new()), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PosIntCompareRandomnessHouse"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        _result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        self.dealers_remaining -= 1;
        if self.dealers_remaining == 0 {
            ctx.complete();
        }
        Ok(())
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PosIntCompareRandomnessHouse"))
    }
}

enum PosIntPatronState {
    AwaitingCompare,
    AwaitingBooleanBeaver,
}

/// Dataowner side: a full compare patron chain plus one boolean triple
/// per comparison; completes with a
/// `Dispenser<PosIntCompareRandomness<P, S>>`.
pub struct PosIntCompareRandomnessPatron<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealer: I,
    dispenser_size: usize,
    compare_dispenser: Option<Dispenser<CompareRandomness<P, S>>>,
    state: PosIntPatronState,
}

impl<I: Identity, P: Field, S: Field> PosIntCompareRandomnessPatron<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>, dealer: I, dispenser_size: usize) -> Self {
        PosIntCompareRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            compare_dispenser: None,
            state: PosIntPatronState::AwaitingCompare,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for PosIntCompareRandomnessPatron<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let patron = CompareRandomnessPatron::new(
            Arc::clone(&self.info),
            self.dealer.clone(),
            self.dispenser_size,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(patron), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PosIntCompareRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            PosIntPatronState::AwaitingCompare => {
                self.compare_dispenser = Some(
                    result
                        .and_then(downcast_dispenser::<CompareRandomness<P, S>>)
                        .ok_or(Error::UnexpectedResultType("PosIntCompare patron compare"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    self.dispenser_size as u64,
                    BeaverInfo::<Gf2>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = PosIntPatronState::AwaitingBooleanBeaver;
                Ok(())
            }
            PosIntPatronState::AwaitingBooleanBeaver => {
                let mut booleans = result
                    .and_then(downcast_dispenser::<BeaverTriple<Gf2>>)
                    .ok_or(Error::UnexpectedResultType("PosIntCompare patron booleans"))?;
                let mut compares = self
                    .compare_dispenser
                    .take()
                    .expect("filled by the compare patron");
                let mut out = Dispenser::new("PosIntCompareRandomness");
                for _ in 0..self.dispenser_size {
                    out.insert(PosIntCompareRandomness {
                        compare: compares.draw()?,
                        boolean_beaver: booleans.draw()?,
                    });
                }
                ctx.complete_with_result(Box::new(out));
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
        Err(Error::UnexpectedMessage("PosIntCompareRandomnessPatron"))
    }
}
