//! Dealer-side mirrors of the sort's randomness consumers.
//!
//! The dataowners' [`super::siso_sort::SisoSort`] and its inner
//! [`super::quicksort::QuickSort`] each drive a chain of patron
//! requests; the dealer party runs these composite houses instead,
//! which invoke one plain [`House`] per requested kind in the same
//! order so the instances pair up across parties.

use crate::codec::Cursor;
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::ff::{Field, Gf2};
use crate::peers::Identity;
use crate::protocol::compare::compare::CompareInfo;
use crate::protocol::compare::dealer::CompareRandomnessHouse;
use crate::randomness::dealer::House;
use crate::randomness::kinds::{BeaverInfo, WaksmanInfo};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Serves one [`super::quicksort::QuickSort`]'s randomness: a full
/// compare house plus the boolean triples of the lexicographic
/// combination rounds.
pub struct QuickSortRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> QuickSortRandomnessHouse<I, P, S> {
    #[must_use]
    pub fn new(info: Arc<CompareInfo<I, P, S>>) -> Self {
        QuickSortRandomnessHouse {
            info,
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for QuickSortRandomnessHouse<I, P, S> {
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
        Err(Error::UnexpectedMessage("QuickSortRandomnessHouse"))
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
        Err(Error::UnexpectedMessage("QuickSortRandomnessHouse"))
    }
}

/// Serves one [`super::siso_sort::SisoSort`]'s randomness: the three
/// Beaver kinds and the Waksman control bits the shuffle draws, then
/// the quicksort's own house.
pub struct SisoSortRandomnessHouse<I: Identity, P: Field, S: Field> {
    info: Arc<CompareInfo<I, P, S>>,
    dealers_remaining: usize,
}

impl<I: Identity, P: Field, S: Field> SisoSortRandomnessHouse<I, P, S> {
    /// `revealer` must name the same party the dataowners hand their
    /// `SisoSort`.
    #[must_use]
    pub fn new(revealer: I) -> Self {
        SisoSortRandomnessHouse {
            info: Arc::new(CompareInfo::new(revealer)),
            dealers_remaining: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, P: Field, S: Field> Fronctocol<I> for SisoSortRandomnessHouse<I, P, S> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.dealers_remaining = 5;
        // Same order as SisoSort's patron chain: arithmetic beavers,
        // key beavers, boolean beavers, Waksman bits.
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, BeaverInfo<Gf2>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(Box::new(House::<I, WaksmanInfo<P>>::new()), peers);
        let peers = ctx.peers().clone();
        ctx.invoke(
            Box::new(QuickSortRandomnessHouse::new(Arc::clone(&self.info))),
            peers,
        );
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _from: &I,
        _body: &mut Cursor<'_>,
    ) -> Result<()> {
        Err(Error::UnexpectedMessage("SisoSortRandomnessHouse"))
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
        Err(Error::UnexpectedMessage("SisoSortRandomnessHouse"))
    }
}
