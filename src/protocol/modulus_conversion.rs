//! `ModConvUp`: converts a share mod a medium prime `M` into a share
//! mod a large prime `P > n * M` without changing the shared value.
//!
//! The share is masked with the aux randomness's `r` and revealed mod
//! `P`. Writing `t` for the revealed value reduced mod `M`, the output
//! is reassembled from `t`, the masked value `x = r mod M`, and three
//! carry bits: whether the medium-modulus addition wrapped (`x > t`),
//! whether it wrapped after also absorbing `P mod M`, and the AND of
//! the large-modulus carry with the second. The carries come from two
//! [`BitwiseCompare`]s of `x`'s pre-shared bits against public values
//! derived from `t`, each lifted into `P` via [`TypeCastFromBit`].
//!
//! Both public comparands get `+ 1` added before bit decomposition so
//! the comparison is strict in the right direction at the `t = x`
//! boundary; dropping that off-by-one silently mis-converts exactly
//! those inputs.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::compare::bitwise_compare::{
    self, BitwiseCompare, BitwiseCompareRandomness,
};
use crate::protocol::compare::prefix_or::{PrefixOrInfo, PrefixOrRandomness};
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::reveal::{self, Reveal};
use crate::protocol::type_cast::{self, TypeCastFromBit};
use crate::randomness::dealer::{downcast_dispenser, House, Patron};
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::{
    BeaverInfo, BeaverTriple, ModConvUpAux, ModConvUpAuxInfo, TypeCastFromBitInfo, TypeCastInfo,
    TypeCastTriple,
};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Shape parameters shared by every conversion from `M` into `P`.
#[derive(Debug)]
pub struct ModConvUpInfo<I: Identity, S: Field, M: Field, P: Field> {
    pub aux: ModConvUpAuxInfo<S, M, P>,
    pub prefix: Arc<PrefixOrInfo<I, S>>,
}

impl<I: Identity, S: Field, M: Field, P: Field> ModConvUpInfo<I, S, M, P> {
    #[must_use]
    pub fn new(revealer: I) -> Self {
        let aux = ModConvUpAuxInfo::<S, M, P>::new();
        let prefix = Arc::new(PrefixOrInfo::<I, S>::new(aux.x_bit_length, revealer));
        ModConvUpInfo { aux, prefix }
    }

    #[must_use]
    pub fn revealer(&self) -> &I {
        &self.prefix.revealer
    }
}

/// Everything one conversion consumes.
pub struct ModConvUpRandomness<S: Field, M: Field, P: Field> {
    pub bitwise_first: BitwiseCompareRandomness<S>,
    pub bitwise_second: BitwiseCompareRandomness<S>,
    pub tct_medium_carry: TypeCastTriple<P>,
    pub tct_large_carry: TypeCastTriple<P>,
    pub tct_and: TypeCastTriple<P>,
    pub xor_beaver_first: BeaverTriple<Gf2>,
    pub xor_beaver_second: BeaverTriple<Gf2>,
    pub aux: ModConvUpAux<S, M, P>,
}

enum McuState {
    AwaitingReveal,
    AwaitingFirstBitwiseCompare,
    AwaitingSecondBitwiseCompare,
    AwaitingFirstXorMultiply { fake_follows: bool },
    AwaitingLastXorMultiply { fake: bool },
    AwaitingFirstTypeCast,
    AwaitingSecondTypeCast,
    AwaitingThirdTypeCast,
}

pub struct ModConvUp<I: Identity, S: Field, M: Field, P: Field> {
    input_share: M,
    info: Arc<ModConvUpInfo<I, S, M, P>>,
    randomness: Option<ModConvUpRandomness<S, M, P>>,
    t: u128,
    q_tilde: u128,
    lsb_of_c: bool,
    medium_carry: Gf2,
    end_carry: Gf2,
    and_result: Gf2,
    medium_carry_arith: P,
    end_carry_arith: P,
    state: McuState,
}

impl<I: Identity, S: Field, M: Field, P: Field> ModConvUp<I, S, M, P> {
    #[must_use]
    pub fn new(
        input_share: M,
        info: Arc<ModConvUpInfo<I, S, M, P>>,
        randomness: ModConvUpRandomness<S, M, P>,
    ) -> Self {
        ModConvUp {
            input_share,
            info,
            randomness: Some(randomness),
            t: 0,
            q_tilde: 0,
            lsb_of_c: false,
            medium_carry: Gf2::ZERO,
            end_carry: Gf2::ZERO,
            and_result: Gf2::ZERO,
            medium_carry_arith: P::ZERO,
            end_carry_arith: P::ZERO,
            state: McuState::AwaitingReveal,
        }
    }

    fn public_bits(&self, value: u128) -> Vec<bool> {
        let ell = self.info.aux.x_bit_length;
        (0..ell).map(|i| (value >> (ell - 1 - i)) & 1 == 1).collect()
    }
}

#[async_trait]
impl<I: Identity, S: Field, M: Field, P: Field> Fronctocol<I> for ModConvUp<I, S, M, P> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let aux_r = self.randomness.as_ref().expect("constructed with randomness").aux.r;
        let masked = P::from_u128(self.input_share.as_u128()) + aux_r;
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
        Err(Error::UnexpectedMessage("ModConvUp"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            McuState::AwaitingReveal => {
                let c = result
                    .and_then(reveal::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp reveal"))?;
                self.t = c.as_u128() % M::MODULUS;
                self.lsb_of_c = c.as_u128() & 1 == 1;
                self.q_tilde = P::MODULUS % M::MODULUS;

                let randomness = self.randomness.as_mut().expect("present until the reveal");
                let bits_of_x = randomness.aux.bits_of_x.clone();
                let bitwise = std::mem::replace(
                    &mut randomness.bitwise_first,
                    empty_bitwise_randomness(),
                );
                let compare_bits = self.public_bits(self.t + 1);
                let bwc = BitwiseCompare::new(
                    bits_of_x,
                    compare_bits,
                    Arc::clone(&self.info.prefix),
                    bitwise,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(bwc), peers);
                self.state = McuState::AwaitingFirstBitwiseCompare;
                Ok(())
            }
            McuState::AwaitingFirstBitwiseCompare => {
                let output = result
                    .and_then(bitwise_compare::downcast)
                    .ok_or(Error::UnexpectedResultType("ModConvUp first bitwise compare"))?;
                // [x < t + 1] complemented gives [x > t]: the carry of
                // the medium-modulus addition.
                self.medium_carry = if ctx.me() == self.info.revealer() {
                    output.lt + Gf2::ONE
                } else {
                    output.lt
                };

                let randomness = self.randomness.as_mut().expect("present until consumed");
                let bits_of_x = randomness.aux.bits_of_x.clone();
                let bitwise = std::mem::replace(
                    &mut randomness.bitwise_second,
                    empty_bitwise_randomness(),
                );
                // t + q_tilde >= x, i.e. t + q_tilde + 1 > x; the +1 is
                // applied after reducing mod M for the boundary case
                // t + q_tilde = x = M - 1.
                let compare_value = ((self.t + self.q_tilde) % M::MODULUS) + 1;
                let bwc = BitwiseCompare::new(
                    bits_of_x,
                    self.public_bits(compare_value),
                    Arc::clone(&self.info.prefix),
                    bitwise,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(bwc), peers);
                self.state = McuState::AwaitingSecondBitwiseCompare;
                Ok(())
            }
            McuState::AwaitingSecondBitwiseCompare => {
                let output = result
                    .and_then(bitwise_compare::downcast)
                    .ok_or(Error::UnexpectedResultType("ModConvUp second bitwise compare"))?;
                // [x < t + q_tilde + 1] is exactly the "no wrap after
                // absorbing P mod M" condition.
                let mut second_carry = output.lt;
                let randomness = self.randomness.as_mut().expect("present until consumed");
                self.end_carry = Gf2::from_bool(self.input_share.as_u128() & 1 == 1)
                    + randomness.aux.lsb_of_r;
                if ctx.me() == self.info.revealer() && self.lsb_of_c {
                    self.end_carry += Gf2::ONE;
                }

                // When t + q_tilde itself wraps the medium modulus the
                // two carries interact; the public fold below keeps the
                // later AND correct while the dummy multiply keeps the
                // message pattern identical across batched conversions
                // that took the other branch.
                let fake_follows = self.t + self.q_tilde >= M::MODULUS;
                if fake_follows {
                    second_carry += self.medium_carry;
                }
                let multiply = Multiply::new(
                    self.end_carry,
                    second_carry,
                    randomness.xor_beaver_first,
                    self.info.revealer().clone(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(multiply), peers);
                self.state = McuState::AwaitingFirstXorMultiply { fake_follows };
                Ok(())
            }
            McuState::AwaitingFirstXorMultiply { fake_follows } => {
                let product = result
                    .and_then(multiply::downcast::<Gf2>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp first xor multiply"))?;
                let randomness = self.randomness.as_mut().expect("present until consumed");
                let beaver = randomness.xor_beaver_second;
                let multiply = if fake_follows {
                    self.and_result = product;
                    Multiply::new(Gf2::ZERO, Gf2::ZERO, beaver, self.info.revealer().clone())
                } else {
                    Multiply::new(product, self.medium_carry, beaver, self.info.revealer().clone())
                };
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(multiply), peers);
                self.state = McuState::AwaitingLastXorMultiply { fake: fake_follows };
                Ok(())
            }
            McuState::AwaitingLastXorMultiply { fake } => {
                let product = result
                    .and_then(multiply::downcast::<Gf2>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp last xor multiply"))?;
                if !fake {
                    self.and_result = product;
                }
                let randomness = self.randomness.as_mut().expect("present until consumed");
                let cast = TypeCastFromBit::<I, P>::new(
                    self.medium_carry,
                    self.info.revealer().clone(),
                    randomness.tct_medium_carry,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = McuState::AwaitingFirstTypeCast;
                Ok(())
            }
            McuState::AwaitingFirstTypeCast => {
                self.medium_carry_arith = result
                    .and_then(type_cast::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp first type cast"))?;
                let randomness = self.randomness.as_mut().expect("present until consumed");
                let cast = TypeCastFromBit::<I, P>::new(
                    self.end_carry,
                    self.info.revealer().clone(),
                    randomness.tct_large_carry,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = McuState::AwaitingSecondTypeCast;
                Ok(())
            }
            McuState::AwaitingSecondTypeCast => {
                self.end_carry_arith = result
                    .and_then(type_cast::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp second type cast"))?;
                let randomness = self.randomness.as_mut().expect("present until consumed");
                let cast = TypeCastFromBit::<I, P>::new(
                    self.and_result,
                    self.info.revealer().clone(),
                    randomness.tct_and,
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(cast), peers);
                self.state = McuState::AwaitingThirdTypeCast;
                Ok(())
            }
            McuState::AwaitingThirdTypeCast => {
                let and_arith = result
                    .and_then(type_cast::downcast::<P>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp third type cast"))?;
                let randomness = self.randomness.take().expect("present until consumed");
                let medium = P::from_u128(M::MODULUS);
                let q_tilde = P::from_u128(self.q_tilde);
                let mut output = medium * self.medium_carry_arith
                    + q_tilde * self.end_carry_arith
                    - medium * and_arith
                    - randomness.aux.x;
                if ctx.me() == self.info.revealer() {
                    output += P::from_u128(self.t);
                }
                ctx.complete_with_result(Box::new(output));
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
        Err(Error::UnexpectedMessage("ModConvUp"))
    }
}

fn empty_bitwise_randomness<S: Field>() -> BitwiseCompareRandomness<S> {
    let zero_beaver = BeaverTriple {
        a: S::ZERO,
        b: S::ZERO,
        c: S::ZERO,
    };
    let zero_tct = TypeCastTriple {
        r_0: S::ZERO,
        r_1: S::ZERO,
        r_2: Gf2::ZERO,
    };
    BitwiseCompareRandomness {
        prefix: PrefixOrRandomness {
            exponent_series: Vec::new(),
            multiply: Dispenser::new("consumed"),
        },
        beaver_lt: zero_beaver,
        tct_lt: zero_tct,
        beaver_eq: zero_beaver,
        tct_eq: zero_tct,
    }
}

/// Downcasts a completed `ModConvUp`'s result: the share over `P`.
#[must_use]
pub fn downcast<P: Field>(result: Box<dyn Any + Send>) -> Option<P> {
    result.downcast::<P>().ok().map(|b| *b)
}

// ---- dealer / patron -------------------------------------------------------

const BITWISE_COMPARES_PER_CONVERSION: usize = 2;
const SMALL_BEAVERS_PER_CONVERSION: usize = 2 * BITWISE_COMPARES_PER_CONVERSION;
const SMALL_TCTS_PER_CONVERSION: usize = 2 * BITWISE_COMPARES_PER_CONVERSION;
const LARGE_TCTS_PER_CONVERSION: usize = 3;
const XOR_BEAVERS_PER_CONVERSION: usize = 2;

/// Dealer side of a batch of [`ModConvUpRandomness`] bundles.
pub struct ModConvUpRandomnessHouse<I: Identity, S: Field, M: Field, P: Field> {
    info: Arc<ModConvUpInfo<I, S, M, P>>,
    dealers_remaining: usize,
}

impl<I: Identity, S: Field, M: Field, P: Field> ModConvUpRandomnessHouse<I, S, M, P> {
    #[must_use]
    pub fn new(info: Arc<ModConvUpInfo<I, S, M, P>>) -> Self {
        ModConvUpRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, S: Field, M: Field, P: Field> Fronctocol<I>
    for ModConvUpRandomnessHouse<I, S, M, P>
{
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        use crate::protocol::compare::dealer::PrefixOrRandomnessHouse;
        self.dealers_remaining = 6;
        let peers = ctx.peers().clone();
        ctx.invoke(
            Box::new(PrefixOrRandomnessHouse::new(Arc::clone(&self.info.prefix))),
            peers,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<S>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, TypeCastInfo<S>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, TypeCastFromBitInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<Gf2>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, ModConvUpAuxInfo<S, M, P>>::new()), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("ModConvUpRandomnessHouse"))
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
        Err(Error::UnexpectedMessage("ModConvUpRandomnessHouse"))
    }
}

enum McuPatronState {
    AwaitingPrefixOr,
    AwaitingSmallBeavers,
    AwaitingSmallTcts,
    AwaitingLargeTcts,
    AwaitingXorBeavers,
    AwaitingAux,
}

/// Dataowner side: requests everything `dispenser_size` conversions
/// consume and completes with a
/// `Dispenser<ModConvUpRandomness<S, M, P>>`.
pub struct ModConvUpRandomnessPatron<I: Identity, S: Field, M: Field, P: Field> {
    info: Arc<ModConvUpInfo<I, S, M, P>>,
    dealer: I,
    dispenser_size: usize,
    prefix_dispenser: Option<Dispenser<PrefixOrRandomness<S>>>,
    small_beavers: Option<Dispenser<BeaverTriple<S>>>,
    small_tcts: Option<Dispenser<TypeCastTriple<S>>>,
    large_tcts: Option<Dispenser<TypeCastTriple<P>>>,
    xor_beavers: Option<Dispenser<BeaverTriple<Gf2>>>,
    state: McuPatronState,
}

impl<I: Identity, S: Field, M: Field, P: Field> ModConvUpRandomnessPatron<I, S, M, P> {
    #[must_use]
    pub fn new(info: Arc<ModConvUpInfo<I, S, M, P>>, dealer: I, dispenser_size: usize) -> Self {
        ModConvUpRandomnessPatron {
            info,
            dealer,
            dispenser_size,
            prefix_dispenser: None,
            small_beavers: None,
            small_tcts: None,
            large_tcts: None,
            xor_beavers: None,
            state: McuPatronState::AwaitingPrefixOr,
        }
    }

    fn next_bitwise(&mut self) -> Result<BitwiseCompareRandomness<S>> {
        let prefix = self
            .prefix_dispenser
            .as_mut()
            .expect("filled earlier in the chain")
            .draw()?;
        let beavers = self.small_beavers.as_mut().expect("filled earlier in the chain");
        let tcts = self.small_tcts.as_mut().expect("filled earlier in the chain");
        Ok(BitwiseCompareRandomness {
            prefix,
            beaver_lt: beavers.draw()?,
            tct_lt: tcts.draw()?,
            beaver_eq: beavers.draw()?,
            tct_eq: tcts.draw()?,
        })
    }

    fn generate_output_dispenser(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        mut aux: Dispenser<ModConvUpAux<S, M, P>>,
    ) -> Result<()> {
        let mut out = Dispenser::new("ModConvUpRandomness");
        for _ in 0..self.dispenser_size {
            let bitwise_first = self.next_bitwise()?;
            let bitwise_second = self.next_bitwise()?;
            let large = self.large_tcts.as_mut().expect("filled earlier in the chain");
            let tct_medium_carry = large.draw()?;
            let tct_large_carry = large.draw()?;
            let tct_and = large.draw()?;
            let xors = self.xor_beavers.as_mut().expect("filled earlier in the chain");
            out.insert(ModConvUpRandomness {
                bitwise_first,
                bitwise_second,
                tct_medium_carry,
                tct_large_carry,
                tct_and,
                xor_beaver_first: xors.draw()?,
                xor_beaver_second: xors.draw()?,
                aux: aux.draw()?,
            });
        }
        ctx.complete_with_result(Box::new(out));
        Ok(())
    }
}

#[async_trait]
impl<I: Identity, S: Field, M: Field, P: Field> Fronctocol<I>
    for ModConvUpRandomnessPatron<I, S, M, P>
{
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        use crate::protocol::compare::dealer::PrefixOrRandomnessPatron;
        let patron = PrefixOrRandomnessPatron::new(
            Arc::clone(&self.info.prefix),
            self.dealer.clone(),
            BITWISE_COMPARES_PER_CONVERSION * self.dispenser_size,
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
        Err(Error::UnexpectedMessage("ModConvUpRandomnessPatron"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            McuPatronState::AwaitingPrefixOr => {
                self.prefix_dispenser = Some(
                    result
                        .and_then(downcast_dispenser::<PrefixOrRandomness<S>>)
                        .ok_or(Error::UnexpectedResultType("ModConvUp patron prefix-or"))?,
                );
                let count = SMALL_BEAVERS_PER_CONVERSION * self.dispenser_size;
                let patron = Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<S>::new());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = McuPatronState::AwaitingSmallBeavers;
                Ok(())
            }
            McuPatronState::AwaitingSmallBeavers => {
                self.small_beavers = Some(
                    result
                        .and_then(downcast_dispenser::<BeaverTriple<S>>)
                        .ok_or(Error::UnexpectedResultType("ModConvUp patron small beavers"))?,
                );
                let count = SMALL_TCTS_PER_CONVERSION * self.dispenser_size;
                let patron =
                    Patron::new(self.dealer.clone(), count as u64, TypeCastInfo::<S>::new());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = McuPatronState::AwaitingSmallTcts;
                Ok(())
            }
            McuPatronState::AwaitingSmallTcts => {
                self.small_tcts = Some(
                    result
                        .and_then(downcast_dispenser::<TypeCastTriple<S>>)
                        .ok_or(Error::UnexpectedResultType("ModConvUp patron small tcts"))?,
                );
                let count = LARGE_TCTS_PER_CONVERSION * self.dispenser_size;
                let patron = Patron::new(
                    self.dealer.clone(),
                    count as u64,
                    TypeCastFromBitInfo::<P>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = McuPatronState::AwaitingLargeTcts;
                Ok(())
            }
            McuPatronState::AwaitingLargeTcts => {
                self.large_tcts = Some(
                    result
                        .and_then(downcast_dispenser::<TypeCastTriple<P>>)
                        .ok_or(Error::UnexpectedResultType("ModConvUp patron large tcts"))?,
                );
                let count = XOR_BEAVERS_PER_CONVERSION * self.dispenser_size;
                let patron =
                    Patron::new(self.dealer.clone(), count as u64, BeaverInfo::<Gf2>::new());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = McuPatronState::AwaitingXorBeavers;
                Ok(())
            }
            McuPatronState::AwaitingXorBeavers => {
                self.xor_beavers = Some(
                    result
                        .and_then(downcast_dispenser::<BeaverTriple<Gf2>>)
                        .ok_or(Error::UnexpectedResultType("ModConvUp patron xor beavers"))?,
                );
                let patron = Patron::new(
                    self.dealer.clone(),
                    self.dispenser_size as u64,
                    ModConvUpAuxInfo::<S, M, P>::new(),
                );
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(patron), peers);
                self.state = McuPatronState::AwaitingAux;
                Ok(())
            }
            McuPatronState::AwaitingAux => {
                let aux = result
                    .and_then(downcast_dispenser::<ModConvUpAux<S, M, P>>)
                    .ok_or(Error::UnexpectedResultType("ModConvUp patron aux"))?;
                self.generate_output_dispenser(ctx, aux)
            }
        }
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("ModConvUpRandomnessPatron"))
    }
}
