//! Neighbour operations over a sorted list: [`ZipAdjacent`] compares
//! every adjacent pair's first key column for equality and masks both
//! rows' payloads by the (secret) equality bit, and [`zip_reduce`]
//! folds each masked pair into a single combined row locally.
//!
//! Running the pair over a list sorted by that key column yields, per
//! neighbouring pair, the combined payloads where the keys matched and
//! zeroes where they did not, without revealing which was which.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::batch::{self, Batch};
use crate::protocol::compare::compare::{
    self, Compare, CompareInfo, CompareRandomness,
};
use crate::protocol::compare::dealer::{CompareRandomnessHouse, CompareRandomnessPatron};
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::type_cast::{self, TypeCastFromBit};
use crate::randomness::dealer::{downcast_dispenser, House, Patron};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{
    BeaverInfo, BeaverTriple, TypeCastFromBitInfo, TypeCastTriple,
};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::observation::{Observation, ObservationList};

/// Shape parameters of one zip over `batch_size` rows.
#[derive(Debug)]
pub struct ZipAdjacentInfo<I: Identity, P: Field, S: Field> {
    pub batch_size: usize,
    pub num_arithmetic_payload_cols: usize,
    pub num_xor_payload_cols: usize,
    pub compare: Arc<CompareInfo<I, P, S>>,
}

impl<I: Identity, P: Field, S: Field> ZipAdjacentInfo<I, P, S> {
    #[must_use]
    pub fn new(
        batch_size: usize,
        num_arithmetic_payload_cols: usize,
        num_xor_payload_cols: usize,
        revealer: I,
    ) -> Self {
        ZipAdjacentInfo {
            batch_size,
            num_arithmetic_payload_cols,
            num_xor_payload_cols,
            compare: Arc::new(CompareInfo::new(revealer)),
        }
    }

    fn pairs(&self) -> usize {
        self.batch_size - 1
    }
}

/// Everything one zip consumes.
pub struct ZipAdjacentRandomness<P: Field, S: Field> {
    pub compares: Dispenser<CompareRandomness<P, S>>,
    pub lift_tcts: Dispenser<TypeCastTriple<P>>,
    pub arithmetic_beavers: Dispenser<BeaverTriple<P>>,
    pub xor_beavers: Dispenser<BeaverTriple<Gf2>>,
}

enum ZipState {
    AwaitingCompare,
    AwaitingTypeCast,
    AwaitingMultiplies,
}

pub struct ZipAdjacent<I: Identity, P: Field, S: Field> {
    list: ObservationList<P>,
    info: Arc<ZipAdjacentInfo<I, P, S>>,
    randomness: ZipAdjacentRandomness<P, S>,
    equality_bits: Vec<Gf2>,
    lifted_bits: Vec<P>,
    arithmetic_batch_id: Option<FronctocolId>,
    xor_batch_id: Option<FronctocolId>,
    arithmetic_products: Vec<P>,
    xor_products: Vec<Gf2>,
    multiplies_remaining: usize,
    state: ZipState,
}

impl<I: Identity, P: Field, S: Field> ZipAdjacent<I, P, S> {
    #[must_use]
    pub fn new(
        list: ObservationList<P>,
        info: Arc<ZipAdjacentInfo<I, P, S>>,
        randomness: ZipAdjacentRandomness<P, S>,
    ) -> Self {
        ZipAdjacent {
            list,
            info,
            randomness,
            equality_bits: Vec::new(),
            lifted_bits: Vec::new(),
            arithmetic_batch_id: None,
            xor_batch_id: None,
            arithmetic_products: Vec::new(),
            xor_products: Vec::new(),
            multiplies_remaining: 0,
            state: ZipState::AwaitingCompare,
        }
    }

    fn finish(&mut self, ctx: &mut FronctocolContext<I>) {
        let pairs = self.info.pairs();
        let arith_cols = self.info.num_arithmetic_payload_cols;
        let xor_cols = self.info.num_xor_payload_cols;
        let mut elements = Vec::with_capacity(2 * pairs);
        for i in 0..2 * pairs {
            elements.push(Observation {
                key_cols: Vec::new(),
                arithmetic_payload_cols: self.arithmetic_products
                    [i * arith_cols..(i + 1) * arith_cols]
                    .to_vec(),
                xor_payload_cols: self.xor_products[i * xor_cols..(i + 1) * xor_cols].to_vec(),
            });
        }
        let zipped = ObservationList {
            num_key_cols: 0,
            num_arithmetic_payload_cols: arith_cols,
            num_xor_payload_cols: xor_cols,
            elements,
        };
        ctx.complete_with_result(Box::new(zipped));
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for ZipAdjacent<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        crate::invariant!(
            self.list.elements.len() == self.info.batch_size && self.info.batch_size >= 2,
            Error::InconsistentRandomnessInfo {
                kind: "ZipAdjacent list size disagrees with its info"
            }
        );
        let mut compares = Vec::with_capacity(self.info.pairs());
        for i in 0..self.info.pairs() {
            compares.push(Compare::new(
                self.list.elements[i].key_cols[0],
                self.list.elements[i + 1].key_cols[0],
                Arc::clone(&self.info.compare),
                self.randomness.compares.draw()?,
            ));
        }
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(Batch::of(compares)), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("ZipAdjacent"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            ZipState::AwaitingCompare => {
                self.equality_bits = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("ZipAdjacent compare batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(compare::downcast)
                            .map(|o| o.eq)
                            .ok_or(Error::UnexpectedResultType("ZipAdjacent compare batch"))
                    })
                    .collect::<Result<_>>()?;

                let revealer = self.info.compare.revealer().clone();
                let mut casts = Vec::with_capacity(self.equality_bits.len());
                for &bit in &self.equality_bits {
                    casts.push(TypeCastFromBit::<I, P>::new(
                        bit,
                        revealer.clone(),
                        self.randomness.lift_tcts.draw()?,
                    ));
                }
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(Batch::of(casts)), peers);
                self.state = ZipState::AwaitingTypeCast;
                Ok(())
            }
            ZipState::AwaitingTypeCast => {
                self.lifted_bits = result
                    .and_then(batch::downcast_results)
                    .ok_or(Error::UnexpectedResultType("ZipAdjacent type cast batch"))?
                    .into_iter()
                    .map(|r| {
                        r.and_then(type_cast::downcast::<P>)
                            .ok_or(Error::UnexpectedResultType("ZipAdjacent type cast batch"))
                    })
                    .collect::<Result<_>>()?;

                let revealer = self.info.compare.revealer().clone();
                self.multiplies_remaining = 0;

                let mut arithmetic = Vec::new();
                for (i, &lifted) in self.lifted_bits.iter().enumerate() {
                    for row in [i, i + 1] {
                        for col in 0..self.info.num_arithmetic_payload_cols {
                            arithmetic.push(Multiply::new(
                                lifted,
                                self.list.elements[row].arithmetic_payload_cols[col],
                                self.randomness.arithmetic_beavers.draw()?,
                                revealer.clone(),
                            ));
                        }
                    }
                }
                if arithmetic.is_empty() {
                    self.arithmetic_products = Vec::new();
                } else {
                    self.multiplies_remaining += 1;
                    let peers = ctx.peers().clone();
                    self.arithmetic_batch_id =
                        Some(ctx.invoke(Box::new(Batch::of(arithmetic)), peers));
                }

                let mut xors = Vec::new();
                for (i, &eq) in self.equality_bits.iter().enumerate() {
                    for row in [i, i + 1] {
                        for col in 0..self.info.num_xor_payload_cols {
                            xors.push(Multiply::new(
                                eq,
                                self.list.elements[row].xor_payload_cols[col],
                                self.randomness.xor_beavers.draw()?,
                                revealer.clone(),
                            ));
                        }
                    }
                }
                if xors.is_empty() {
                    self.xor_products = Vec::new();
                } else {
                    self.multiplies_remaining += 1;
                    let peers = ctx.peers().clone();
                    self.xor_batch_id = Some(ctx.invoke(Box::new(Batch::of(xors)), peers));
                }

                if self.multiplies_remaining == 0 {
                    self.finish(ctx);
                } else {
                    self.state = ZipState::AwaitingMultiplies;
                }
                Ok(())
            }
            ZipState::AwaitingMultiplies => {
                if Some(child) == self.arithmetic_batch_id {
                    self.arithmetic_products = result
                        .and_then(batch::downcast_results)
                        .ok_or(Error::UnexpectedResultType("ZipAdjacent arithmetic batch"))?
                        .into_iter()
                        .map(|r| {
                            r.and_then(multiply::downcast::<P>)
                                .ok_or(Error::UnexpectedResultType("ZipAdjacent arithmetic batch"))
                        })
                        .collect::<Result<_>>()?;
                } else if Some(child) == self.xor_batch_id {
                    self.xor_products = result
                        .and_then(batch::downcast_results)
                        .ok_or(Error::UnexpectedResultType("ZipAdjacent xor batch"))?
                        .into_iter()
                        .map(|r| {
                            r.and_then(multiply::downcast::<Gf2>)
                                .ok_or(Error::UnexpectedResultType("ZipAdjacent xor batch"))
                        })
                        .collect::<Result<_>>()?;
                } else {
                    return Err(Error::UnexpectedMessage("ZipAdjacent"));
                }
                self.multiplies_remaining -= 1;
                if self.multiplies_remaining == 0 {
                    self.finish(ctx);
                }
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
        Err(Error::UnexpectedMessage("ZipAdjacent"))
    }
}

/// Downcasts a completed `ZipAdjacent`'s result: the masked pair list.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<ObservationList<P>> {
    result.downcast::<ObservationList<P>>().ok().map(|b| *b)
}

/// Folds each zipped pair into one row by combining the two rows'
/// columns. Shares combine locally: the sum of two rows' arithmetic
/// shares is a share of the summed payload, and likewise for XOR.
#[must_use]
pub fn zip_reduce<P: Field>(zipped: &ObservationList<P>) -> ObservationList<P> {
    let mut elements = Vec::with_capacity(zipped.elements.len() / 2);
    for pair in zipped.elements.chunks_exact(2) {
        let (first, second) = (&pair[0], &pair[1]);
        elements.push(Observation {
            key_cols: Vec::new(),
            arithmetic_payload_cols: first
                .arithmetic_payload_cols
                .iter()
                .zip(&second.arithmetic_payload_cols)
                .map(|(&a, &b)| a + b)
                .collect(),
            xor_payload_cols: first
                .xor_payload_cols
                .iter()
                .zip(&second.xor_payload_cols)
                .map(|(&a, &b)| a + b)
                .collect(),
        });
    }
    ObservationList {
        num_key_cols: 0,
        num_arithmetic_payload_cols: zipped.num_arithmetic_payload_cols,
        num_xor_payload_cols: zipped.num_xor_payload_cols,
        elements,
    }
}

// ---- dealer / patron -------------------------------------------------------

/// Dealer side of a batch of [`ZipAdjacentRandomness`] bundles.
pub struct ZipAdjacentRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<ZipAdjacentInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> ZipAdjacentRandomnessHouse<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<ZipAdjacentInfo<I, P, S>>) -> Self {
        ZipAdjacentRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for ZipAdjacentRandomnessHouse<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.dealers_remaining = 4;
        let peers = ctx.peers().clone();
        ctx.invoke(
            Box::new(CompareRandomnessHouse::new(Arc::clone(&self.info.compare))),
            peers,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, TypeCastFromBitInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<P>>::new()), peers);
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
        Err(Error::UnexpectedMessage("ZipAdjacentRandomnessHouse"))
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
        Err(Error::UnexpectedMessage("ZipAdjacentRandomnessHouse"))
    }
}

enum ZipPatronState {
    AwaitingCompare,
    AwaitingLiftTcts,
    AwaitingArithmeticBeavers,
    AwaitingXorBeavers,
}

/// Dataowner side: provisions `dispenser_size` zips and completes with
/// a `Dispenser<ZipAdjacentRandomness<P, S>>`.
pub struct ZipAdjacentRandomnessPatron<I: Identity, P: Field, S: Field> {
    info: Arc<ZipAdjacentInfo<I, P, S>>,
    dealer: I,
    dispenser_size: usize,
    compares: Option<Dispenser<CompareRandomness<P, S>>>,
    lift_tcts: Option<Dispenser<TypeCastTriple<P>>>,
    arithmetic_beavers: Option<Dispenser<BeaverTriple<P>>>,
    state: ZipPatronState,
}

impl<I: Identity, P: Field, S: Field> ZipAdjacentRandomnessPatron<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<ZipAdjacentInfo<I, P, S>>, dealer: I, dispenser_size: usize) -> Self {
        ZipAdjacentRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            compares: None,
            lift_tcts: None,
            arithmetic_beavers: None,
            state: ZipPatronState::AwaitingCompare,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for ZipAdjacentRandomnessPatron<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let patron = CompareRandomnessPatron::new(
            Arc::clone(&self.info.compare),
            self.dealer.clone(),
            self.info.pairs() * self.dispenser_size,
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
        Err(Error::UnexpectedMessage("ZipAdjacentRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            ZipPatronState::AwaitingCompare => {
                self.compares = Some(
                    result
                        .and_then(downcast_dispenser::<CompareRandomness<P, S>>)
                        .ok_or(Error::UnexpectedResultType("ZipAdjacent patron compares"))?,
                );
                let count = self.info.pairs() * self.dispenser_size;
                let patron = Patron::new(
                    self.dealer.clone(),
                    count as u64,
                    TypeCastFromBitInfo::<P>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = ZipPatronState::AwaitingLiftTcts;
                Ok(())
            }
            ZipPatronState::AwaitingLiftTcts => {
                self.lift_tcts = Some(
                    result
                        .and_then(downcast_dispenser::<TypeCastTriple<P>>)
                        .ok_or(Error::UnexpectedResultType("ZipAdjacent patron lift tcts"))?,
                );
                let count = 2
                    * self.info.pairs()
                    * self.info.num_arithmetic_payload_cols
                    * self.dispenser_size;
                let patron = Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<P>::new());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = ZipPatronState::AwaitingArithmeticBeavers;
                Ok(())
            }
            ZipPatronState::AwaitingArithmeticBeavers => {
                self.arithmetic_beavers = Some(
                    result
                        .and_then(downcast_dispenser::<BeaverTriple<P>>)
                        .ok_or(Error::UnexpectedResultType("ZipAdjacent patron beavers"))?,
                );
                let count =
                    2 * self.info.pairs() * self.info.num_xor_payload_cols * self.dispenser_size;
                let patron =
                    Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<Gf2>::new());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = ZipPatronState::AwaitingXorBeavers;
                Ok(())
            }
            ZipPatronState::AwaitingXorBeavers => {
                let mut xor_beavers = result
                    .and_then(downcast_dispenser::<BeaverTriple<Gf2>>)
                    .ok_or(Error::UnexpectedResultType("ZipAdjacent patron xor beavers"))?;
                let mut compares = self.compares.take().expect("filled earlier in the chain");
                let mut lift_tcts = self.lift_tcts.take().expect("filled earlier in the chain");
                let mut arithmetic = self
                    .arithmetic_beavers
                    .take()
                    .expect("filled earlier in the chain");
                let pairs = self.info.pairs();
                let mut out = Dispenser::new("ZipAdjacentRandomness");
                for _ in 0..self.dispenser_size {
                    out.insert(ZipAdjacentRandomness {
                        compares: compares.little_dispenser(pairs)?,
                        lift_tcts: lift_tcts.little_dispenser(pairs)?,
                        arithmetic_beavers: arithmetic.little_dispenser(
                            2 * pairs * self.info.num_arithmetic_payload_cols,
                        )?,
                        xor_beavers: xor_beavers
                            .little_dispenser(2 * pairs * self.info.num_xor_payload_cols)?,
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
        Err(Error::UnexpectedMessage("ZipAdjacentRandomnessPatron"))
    }
}
