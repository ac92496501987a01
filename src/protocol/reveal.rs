//! Reveal: every party sends its share to the revealer, who
//! reconstructs the secret and sends the opened value back to everyone.
//! Works for boolean shares too, since `Gf2` addition is XOR.

use crate::codec::{Buffer, Cursor};
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::Result;
use crate::ff::Field;
use crate::peers::Identity;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use tracing::warn;

/// Opens one additively-shared `F` to every party in the peer set. The
/// completed result is the reconstructed `F`.
pub struct Reveal<I: Identity, F: Field> {
    my_share: F,
    revealer: I,
    received: HashMap<I, F>,
}

impl<I: Identity, F: Field> Reveal<I, F> {
    #[must_use]
    pub fn new(my_share: F, revealer: I) -> Self {
        Reveal {
            my_share,
            revealer,
            received: HashMap::new(),
        }
    }
}

#[async_trait]
impl<I: Identity, F: Field> Fronctocol<I> for Reveal<I, F> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        if *ctx.me() == self.revealer {
            if ctx.peers().len() == 1 {
                ctx.complete_with_result(Box::new(self.my_share));
            }
        } else {
            let mut body = Buffer::new();
            self.my_share.write_share(&mut body);
            ctx.send(self.revealer.clone(), body);
        }
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()> {
        let value = F::read_share(body)?;
        if *ctx.me() == self.revealer {
            self.received.insert(from.clone(), value);
            if self.received.len() == ctx.peers().len() - 1 {
                let opened = self.received.values().fold(self.my_share, |acc, &s| acc + s);
                let peers: Vec<I> = ctx.other_peers().cloned().collect();
                for peer in peers {
                    let mut body = Buffer::new();
                    opened.write_share(&mut body);
                    ctx.send(peer, body);
                }
                ctx.complete_with_result(Box::new(opened));
            }
        } else if *from == self.revealer {
            ctx.complete_with_result(Box::new(value));
        } else {
            warn!("Reveal ignoring a share sent to a non-revealer");
        }
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

/// Downcasts a completed `Reveal<I, F>`'s result back to `F`.
#[must_use]
pub fn downcast<F: Field>(result: Box<dyn Any + Send>) -> Option<F> {
    result.downcast::<F>().ok().map(|b| *b)
}
