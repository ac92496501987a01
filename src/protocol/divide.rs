//! Secret-shared restoring binary division: `floor(dividend / divisor)`
//! for a publicly-known bit width, one quotient bit per round from the
//! most significant bit down.
//!
//! Each round trial-subtracts `divisor * 2^k` from the running
//! remainder: one [`PosIntCompare`] decides (secretly) whether the
//! remainder covers the trial value, a [`TypeCastFromBit`] lifts the
//! decision into the working field, and one [`Multiply`] applies the
//! subtraction exactly when the decision bit was set. The quotient bit
//! itself is accumulated locally, since multiplying a share by the
//! public constant `2^k` needs no interaction.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::compare::compare::CompareInfo;
use crate::protocol::compare::dealer::PosIntCompareRandomnessPatron;
use crate::protocol::compare::pos_int_compare::{
    self, PosIntCompare, PosIntCompareRandomness,
};
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

/// One round's randomness: the comparison that decides whether this
/// round's trial subtraction applies, the cast that lifts the decision,
/// and the triple that carries the subtraction out.
pub struct DivideRandomness<P: Field, S: Field> {
    pub pos_int: PosIntCompareRandomness<P, S>,
    pub lift_tct: TypeCastTriple<P>,
    pub beaver: BeaverTriple<P>,
}

enum DivideState {
    AwaitingCompare,
    AwaitingLift,
    AwaitingMultiply,
}

pub struct Divide<I: Identity, P: Field, S: Field> {
    divisor: P,
    info: Arc<CompareInfo<I, P, S>>,
    rounds: Vec<Option<DivideRandomness<P, S>>>,
    powers_of_two: Vec<P>,
    remainder: P,
    quotient: P,
    round: usize,
    pending_trial: P,
    pending_lift: Option<TypeCastTriple<P>>,
    pending_beaver: Option<BeaverTriple<P>>,
    state: DivideState,
}

impl<I: Identity, P: Field, S: Field> Divide<I, P, S> {
    /// `rounds.len()` is the bit width `ell`: the caller must guarantee
    /// `dividend < divisor * 2^ell` and that every intermediate value
    /// stays inside `[0, p/2)`, the precondition of the comparisons.
    #[must_use]
    pub fn new(
        dividend: P,
        divisor: P,
        info: Arc<CompareInfo<I, P, S>>,
        rounds: Vec<DivideRandomness<P, S>>,
    ) -> Self {
        let ell = rounds.len();
        let mut powers_of_two = Vec::with_capacity(ell);
        let mut power = P::ONE;
        for _ in 0..ell {
            powers_of_two.push(power);
            power *= P::ONE + P::ONE;
        }
        Divide {
            divisor,
            info,
            rounds: rounds.into_iter().map(Some).collect(),
            powers_of_two,
            remainder: dividend,
            quotient: P::ZERO,
            round: 0,
            pending_trial: P::ZERO,
            pending_lift: None,
            pending_beaver: None,
            state: DivideState::AwaitingCompare,
        }
    }

    fn start_round(&mut self, ctx: &mut FronctocolContext<I>) {
        let ell = self.rounds.len();
        self.pending_trial = self.divisor * self.powers_of_two[ell - 1 - self.round];
        let randomness = self.rounds[self.round].take().expect("each round consumed once");
        self.pending_lift = Some(randomness.lift_tct);
        self.pending_beaver = Some(randomness.beaver);
        let compare = PosIntCompare::new(
            self.remainder,
            self.pending_trial,
            Arc::clone(&self.info),
            randomness.pos_int,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(compare), peers);
        self.state = DivideState::AwaitingCompare;
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for Divide<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        if self.rounds.is_empty() {
            ctx.complete_with_result(Box::new(self.quotient));
            return Ok(());
        }
        self.start_round(ctx);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("Divide"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            DivideState::AwaitingCompare => {
                // remainder < trial means this quotient bit is 0; the
                // bit itself is the complement.
                let remainder_below = result
                    .and_then(pos_int_compare::downcast)
                    .ok_or(Error::UnexpectedResultType("Divide compare"))?;
                let bit = if ctx.me() == self.info.revealer() {
                    remainder_below + Gf2::ONE
                } else {
                    remainder_below
                };
                let cast = TypeCastFromBit::<I, P>::new(
                    bit,
                    self.info.revealer().clone(),
                    self.pending_lift.take().expect("stashed at round start"),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = DivideState::AwaitingLift;
                Ok(())
            }
            DivideState::AwaitingLift => {
                let bit_arith = result
                    .and_then(type_cast::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("Divide lift"))?;
                self.quotient +=
                    bit_arith * self.powers_of_two[self.rounds.len() - 1 - self.round];
                let multiply = Multiply::new(
                    bit_arith,
                    self.pending_trial,
                    self.pending_beaver.take().expect("stashed at round start"),
                    self.info.revealer().clone(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(multiply), peers);
                self.state = DivideState::AwaitingMultiply;
                Ok(())
            }
            DivideState::AwaitingMultiply => {
                let subtrahend = result
                    .and_then(multiply::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("Divide multiply"))?;
                self.remainder -= subtrahend;
                self.round += 1;
                if self.round == self.rounds.len() {
                    ctx.complete_with_result(Box::new(self.quotient));
                } else {
                    self.start_round(ctx);
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
        Err(Error::UnexpectedMessage("Divide"))
    }
}

/// Downcasts a completed `Divide`'s result: the quotient share.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<P> {
    result.downcast::<P>().ok().map(|b| *b)
}

// ---- dealer / patron -------------------------------------------------------

/// Dealer side of a batch of per-round [`DivideRandomness`] bundles.
pub struct DivideRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> DivideRandomnessHouse<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>) -> Self {
        DivideRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for DivideRandomnessHouse<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        use crate::protocol::compare::dealer::PosIntCompareRandomnessHouse;
        self.dealers_remaining = 3;
        let peers = ctx.peers().clone();
        ctx.invoke(
            Box::new(PosIntCompareRandomnessHouse::new(Arc::clone(&self.info))),
            peers,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, TypeCastFromBitInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<P>>::new()), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("DivideRandomnessHouse"))
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
        Err(Error::UnexpectedMessage("DivideRandomnessHouse"))
    }
}

enum DividePatronState {
    AwaitingCompares,
    AwaitingLiftTcts,
    AwaitingBeavers,
}

/// Dataowner side: provisions `dispenser_size` division *rounds* (a
/// full division over `ell` bits consumes `ell` of them) and completes
/// with a `Dispenser<DivideRandomness<P, S>>`.
pub struct DivideRandomnessPatron<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealer: I,
    dispenser_size: usize,
    compares: Option<Dispenser<PosIntCompareRandomness<P, S>>>,
    lift_tcts: Option<Dispenser<TypeCastTriple<P>>>,
    state: DividePatronState,
}

impl<I: Identity, P: Field, S: Field> DivideRandomnessPatron<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>, dealer: I, dispenser_size: usize) -> Self {
        DivideRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            compares: None,
            lift_tcts: None,
            state: DividePatronState::AwaitingCompares,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for DivideRandomnessPatron<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let patron = PosIntCompareRandomnessPatron::new(
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
        Err(Error::UnexpectedMessage("DivideRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            DividePatronState::AwaitingCompares => {
                self.compares = Some(
                    result
                        .and_then(downcast_dispenser::<PosIntCompareRandomness<P, S>>)
                        .ok_or(Error::UnexpectedResultType("Divide patron compares"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    self.dispenser_size as u64,
                    TypeCastFromBitInfo::<P>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = DividePatronState::AwaitingLiftTcts;
                Ok(())
            }
            DividePatronState::AwaitingLiftTcts => {
                self.lift_tcts = Some(
                    result
                        .and_then(downcast_dispenser::<TypeCastTriple<P>>)
                        .ok_or(Error::UnexpectedResultType("Divide patron lift tcts"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    self.dispenser_size as u64,
                    BeaverInfo::<P>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = DividePatronState::AwaitingBeavers;
                Ok(())
            }
            DividePatronState::AwaitingBeavers => {
                let mut beavers = result
                    .and_then(downcast_dispenser::<BeaverTriple<P>>)
                    .ok_or(Error::UnexpectedResultType("Divide patron beavers"))?;
                let mut compares = self.compares.take().expect("filled earlier in the chain");
                let mut lift_tcts = self.lift_tcts.take().expect("filled earlier in the chain");
                let mut out = Dispenser::new("DivideRandomness");
                for _ in 0..self.dispenser_size {
                    out.insert(DivideRandomness {
                        pos_int: compares.draw()?,
                        lift_tct: lift_tcts.draw()?,
                        beaver: beavers.draw()?,
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
        Err(Error::UnexpectedMessage("DivideRandomnessPatron"))
    }
}
