//! `PosIntCompare`: [`Compare`] specialised to operands already known to
//! be in `[0, p/2)`, collapsing the three-way outcome into a single
//! XOR-shared "strictly less than" bit with one boolean multiply.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::multiply::{self, Multiply};
use crate::randomness::kinds::BeaverTriple;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::compare::{self, Compare, CompareInfo, CompareOutput, CompareRandomness};

/// One `PosIntCompare`'s randomness: a full comparison bundle plus the
/// boolean triple that ANDs the two outcome bits together.
pub struct PosIntCompareRandomness<P: Field, S: Field> {
    pub compare: CompareRandomness<P, S>,
    pub boolean_beaver: BeaverTriple<Gf2>,
}

enum PicState {
    AwaitingCompare,
    AwaitingMultiply,
}

/// Completes with an XOR share of `x < y`.
pub struct PosIntCompare<I: Identity, P: Field, S: Field> {
    share_of_x: P,
    share_of_y: P,
    info: Arc<CompareInfo<I, P, S>>,
    randomness: Option<PosIntCompareRandomness<P, S>>,
    boolean_beaver: Option<BeaverTriple<Gf2>>,
    state: PicState,
}

impl<I: Identity, P: Field, S: Field> PosIntCompare<I, P, S> {
    #[must_use]
    pub fn new(
        share_of_x: P,
        share_of_y: P,
        info: Arc<CompareInfo<I, P, S>>,
        randomness: PosIntCompareRandomness<P, S>,
    ) -> Self {
        PosIntCompare {
            share_of_x,
            share_of_y,
            info,
            randomness: Some(randomness),
            boolean_beaver: None,
            state: PicState::AwaitingCompare,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for PosIntCompare<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let randomness = self.randomness.take().expect("constructed with randomness");
        self.boolean_beaver = Some(randomness.boolean_beaver);
        let compare = Compare::new(
            self.share_of_x,
            self.share_of_y,
            Arc::clone(&self.info),
            randomness.compare,
        );
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(compare), peers);
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("PosIntCompare"))
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        match self.state {
            PicState::AwaitingCompare => {
                let CompareOutput { gt, eq } = result
                    .and_then(compare::downcast)
                    .ok_or(Error::UnexpectedResultType("PosIntCompare compare"))?;
                // x < y iff neither "greater" nor "equal": AND of the
                // two complemented bits, complementing on the revealer.
                let i_am_revealer = ctx.me() == self.info.revealer();
                let not_gt = if i_am_revealer { gt + Gf2::ONE } else { gt };
                let not_eq = if i_am_revealer { eq + Gf2::ONE } else { eq };
                let beaver = self.boolean_beaver.take().expect("stashed in init");
                let multiply =
                    Multiply::new(not_gt, not_eq, beaver, self.info.revealer().clone());
                let peers = ctx.peers().clone();
                ctx.invoke(Box::new(multiply), peers);
                self.state = PicState::AwaitingMultiply;
                Ok(())
            }
            PicState::AwaitingMultiply => {
                let lt = result
                    .and_then(multiply::downcast::<Gf2>)
                    .ok_or(Error::UnexpectedResultType("PosIntCompare multiply"))?;
                ctx.complete_with_result(Box::new(lt));
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
        Err(Error::UnexpectedMessage("PosIntCompare"))
    }
}

/// Downcasts a completed `PosIntCompare`'s result: the XOR share of
/// `x < y`.
#[must_use]
pub fn downcast(result: Box<dyn Any + Send>) -> Option<Gf2> {
    result.downcast::<Gf2>().ok().map(|b| *b)
}
