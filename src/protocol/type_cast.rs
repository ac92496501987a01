//! Casting a shared bit between its arithmetic and XOR representations.
//!
//! Both directions mask the bit with the type-cast triple's `r_2`,
//! reveal the masked (uniformly distributed) bit, and then select the
//! unmasked output from the triple's other two components locally.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::multiply::{self, Multiply};
use crate::protocol::reveal::{self, Reveal};
use crate::randomness::kinds::{BeaverTriple, TypeCastTriple};
use async_trait::async_trait;
use std::any::Any;

enum TypeCastState {
    AwaitingMultiply,
    AwaitingReveal,
}

/// Converts an arithmetic share of a bit into an XOR share, consuming
/// one [`BeaverTriple<F>`] and one [`TypeCastTriple<F>`] dealt under
/// [`crate::randomness::kinds::TypeCastInfo`].
pub struct TypeCast<I: Identity, F: Field> {
    arithmetic_share_of_bit: F,
    revealer: I,
    beaver: Option<BeaverTriple<F>>,
    tct: TypeCastTriple<F>,
    state: TypeCastState,
}

impl<I: Identity, F: Field> TypeCast<I, F> {
    #[must_use]
    pub fn new(
        arithmetic_share_of_bit: F,
        revealer: I,
        beaver: BeaverTriple<F>,
        tct: TypeCastTriple<F>,
    ) -> Self {
        TypeCast {
            arithmetic_share_of_bit,
            revealer,
            beaver: Some(beaver),
            tct,
            state: TypeCastState::AwaitingMultiply,
        }
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for TypeCast<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let beaver = self.beaver.take().expect("constructed with a triple");
        let multiply = Multiply::new(
            self.arithmetic_share_of_bit,
            self.tct.r_0,
            beaver,
            self.revealer.clone(),
        );
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
        Err(Error::UnexpectedMessage("TypeCast"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            TypeCastState::AwaitingMultiply => {
                let product = result
                    .and_then(multiply::downcast::<F>)
                    .ok_or(Error::UnexpectedResultType("TypeCast multiply"))?;
                let reveal = Reveal::new(product + self.tct.r_1, self.revealer.clone());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(reveal), peers);
                self.state = TypeCastState::AwaitingReveal;
                Ok(())
            }
            TypeCastState::AwaitingReveal => {
                let opened = result
                    .and_then(reveal::downcast::<F>)
                    .ok_or(Error::UnexpectedResultType("TypeCast reveal"))?;
                crate::invariant!(
                    opened.as_u128() <= 1,
                    Error::UnexpectedResultType("TypeCast opened a non-bit")
                );
                let output = if *ctx.me() == self.revealer {
                    Gf2::from_u128(opened.as_u128()) + self.tct.r_2
                } else {
                    self.tct.r_2
                };
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
        Err(Error::UnexpectedMessage("TypeCast"))
    }
}

/// Converts an XOR share of a bit into an arithmetic share over `F`,
/// consuming one [`TypeCastTriple<F>`] dealt under
/// [`crate::randomness::kinds::TypeCastFromBitInfo`].
pub struct TypeCastFromBit<I: Identity, F: Field> {
    xor_share_of_bit: Gf2,
    revealer: I,
    tct: TypeCastTriple<F>,
}

impl<I: Identity, F: Field> TypeCastFromBit<I, F> {
    #[must_use]
    pub fn new(xor_share_of_bit: Gf2, revealer: I, tct: TypeCastTriple<F>) -> Self {
        TypeCastFromBit {
            xor_share_of_bit,
            revealer,
            tct,
        }
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for TypeCastFromBit<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let reveal = Reveal::new(self.xor_share_of_bit + self.tct.r_2, self.revealer.clone());
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
        Err(Error::UnexpectedMessage("TypeCastFromBit"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let opened = result
            .and_then(reveal::downcast::<Gf2>)
            .ok_or(Error::UnexpectedResultType("TypeCastFromBit reveal"))?;
        let output = if opened.as_bool() { self.tct.r_1 } else { self.tct.r_0 };
        ctx.complete_with_result(Box::new(output));
        Ok(())
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("TypeCastFromBit"))
    }
}

/// Downcasts a completed cast's result: `Gf2` out of [`TypeCast`], `F`
/// out of [`TypeCastFromBit`].
#[must_use]
pub fn downcast<T: Send + 'static>(result: Box<dyn Any + Send>) -> Option<T> {
    result.downcast::<T>().ok().map(|b| *b)
}
