//! Beaver multiplication: one pre-dealt triple turns a multiplication of
//! two secret-shared values into a single exchange of masked differences
//! and local arithmetic. Instantiated over [`crate::ff::Gf2`] this is
//! the boolean variant: XOR in place of addition, AND in place of
//! multiplication.

use crate::codec::{Buffer, Cursor};
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::Result;
use crate::ff::Field;
use crate::peers::Identity;
use crate::randomness::kinds::BeaverTriple;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;

/// Multiplies two `F`-shares using one [`BeaverTriple<F>`]. The
/// completed result is this party's share of the product.
pub struct Multiply<I: Identity, F: Field> {
    triple: BeaverTriple<F>,
    d_share: F,
    e_share: F,
    revealer: I,
    received: HashMap<I, (F, F)>,
}

impl<I: Identity, F: Field> Multiply<I, F> {
    #[must_use]
    pub fn new(x_share: F, y_share: F, triple: BeaverTriple<F>, revealer: I) -> Self {
        Multiply {
            d_share: x_share - triple.a,
            e_share: y_share - triple.b,
            triple,
            revealer,
            received: HashMap::new(),
        }
    }

    fn maybe_complete(&mut self, ctx: &mut FronctocolContext<I>) {
        if self.received.len() != ctx.peers().len() - 1 {
            return;
        }
        let (mut d, mut e) = (self.d_share, self.e_share);
        for &(dd, ee) in self.received.values() {
            d += dd;
            e += ee;
        }
        // z = x*y = (a+d)(b+e) = c + b*d + a*e + d*e with d, e public;
        // only the revealer's share absorbs the d*e term.
        let mut product_share = self.triple.c + d * self.triple.b + e * self.triple.a;
        if *ctx.me() == self.revealer {
            product_share += d * e;
        }
        ctx.complete_with_result(Box::new(product_share));
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for Multiply<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let peers: Vec<I> = ctx.other_peers().cloned().collect();
        for peer in peers {
            let mut body = Buffer::new();
            self.d_share.write_share(&mut body);
            self.e_share.write_share(&mut body);
            ctx.send(peer, body);
        }
        self.maybe_complete(ctx);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()> {
        let d = F::read_share(body)?;
        let e = F::read_share(body)?;
        self.received.insert(from.clone(), (d, e));
        self.maybe_complete(ctx);
        Ok(())
    }

    async fn handle_complete(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        _result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        Ok(())
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Downcasts a completed `Multiply<I, F>`'s result back to `F`.
#[must_use]
pub fn downcast<F: Field>(result: Box<dyn Any + Send>) -> Option<F> {
    result.downcast::<F>().ok().map(|b| *b)
}
