//! The trusted dealer (`House`) and the per-party randomness consumer
//! (`Patron`) fronctocols.
//!
//! Both sides are invoked with the same peer set: the dealer identity
//! plus every patron. Each patron opens with a `(num_desired, info)`
//! request; the dealer waits until every patron has asked, escalates a
//! `num_desired` disagreement to the maximum, aborts on an `info`
//! disagreement, then streams freshly-dealt shares back in fixed-size
//! batches. The first batch message additionally carries
//! `(num_batches, per_batch)` so the patron knows when it has
//! everything. A finished patron completes with a ready
//! [`Dispenser<Info::Rand>`] as its promised result.

use crate::codec::{Buffer, Cursor};
use crate::engine::{Fronctocol, FronctocolContext, FronctocolId};
use crate::error::Result;
use crate::peers::Identity;
use crate::randomness::dispenser::Dispenser;
use crate::randomness::kinds::RandomnessInfo;
use async_trait::async_trait;
use std::any::Any;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Maximum size in bytes of one batch of dealt instances.
const DEFAULT_BATCH_SIZE: usize = 250_000;

/// Dealer-side fronctocol: collects every patron's request, checks the
/// requests agree, deals, ships, completes.
pub struct House<I: Identity, Info: RandomnessInfo> {
    num_patrons: usize,
    num_received: usize,
    num_desired: u64,
    info: Option<Info>,
    _marker: PhantomData<I>,
}

impl<I: Identity, Info: RandomnessInfo> House<I, Info> {
    #[must_use]
    pub fn new() -> Self {
        House {
            num_patrons: 0,
            num_received: 0,
            num_desired: 0,
            info: None,
            _marker: PhantomData,
        }
    }

    fn deal_and_ship(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let info = self.info.take().expect("first request stored an info");
        let patrons: Vec<I> = ctx.other_peers().cloned().collect();
        let num_desired = self.num_desired as usize;

        let instance_size = info.instance_size().max(1);
        let batch_bytes = instance_size.max(DEFAULT_BATCH_SIZE);
        let per_batch = batch_bytes / instance_size;
        let num_batches = num_desired.div_ceil(per_batch);
        debug!(
            kind = Info::LABEL,
            num_desired, per_batch, num_batches, "dealer shipping randomness"
        );

        let mut rng = rand::thread_rng();
        let mut total_sent = 0_usize;
        for batch in 0..num_batches {
            let mut bufs: Vec<Buffer> = patrons.iter().map(|_| Buffer::new()).collect();
            if batch == 0 {
                for buf in &mut bufs {
                    buf.add_u64(num_batches as u64);
                    buf.add_u64(per_batch as u64);
                }
            }
            let mut in_batch = 0;
            while in_batch < per_batch && total_sent < num_desired {
                let shares = info.generate(&mut rng, patrons.len());
                debug_assert_eq!(shares.len(), patrons.len());
                for (buf, share) in bufs.iter_mut().zip(&shares) {
                    Info::write_rand(share, buf);
                }
                in_batch += 1;
                total_sent += 1;
            }
            for (patron, buf) in patrons.iter().zip(bufs) {
                ctx.send(patron.clone(), buf);
            }
        }
        ctx.complete();
        Ok(())
    }
}

impl<I: Identity, Info: RandomnessInfo> Default for House<I, Info> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<I: Identity, Info: RandomnessInfo> Fronctocol<I> for House<I, Info> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        self.num_patrons = ctx.other_peers().count();
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        _from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()> {
        let num_desired = body.read_u64()?;
        let info = Info::read(body)?;
        match &self.info {
            None => {
                self.num_desired = num_desired;
                self.info = Some(info);
            }
            Some(existing) => {
                if num_desired > self.num_desired {
                    warn!(
                        kind = Info::LABEL,
                        "patrons disagree on instance count, escalating to the maximum"
                    );
                    self.num_desired = num_desired;
                }
                if *existing != info {
                    warn!(kind = Info::LABEL, "patrons disagree on randomness info, aborting");
                    ctx.abort();
                    return Ok(());
                }
            }
        }
        self.num_received += 1;
        if self.num_received == self.num_patrons {
            self.deal_and_ship(ctx)?;
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

/// Dataowner-side fronctocol: asks the dealer for `num_desired`
/// instances and completes with the filled [`Dispenser`] once every
/// batch has arrived.
pub struct Patron<I: Identity, Info: RandomnessInfo> {
    dealer: I,
    num_desired: u64,
    info: Info,
    dispenser: Option<Dispenser<Info::Rand>>,
    batches_total: usize,
    batch_size: usize,
    batches_received: usize,
}

impl<I: Identity, Info: RandomnessInfo> Patron<I, Info> {
    #[must_use]
    pub fn new(dealer: I, num_desired: u64, info: Info) -> Self {
        Patron {
            dealer,
            num_desired,
            info,
            dispenser: Some(Dispenser::new(Info::LABEL)),
            batches_total: 0,
            batch_size: 0,
            batches_received: 0,
        }
    }
}

#[async_trait]
impl<I: Identity, Info: RandomnessInfo> Fronctocol<I> for Patron<I, Info> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        let mut body = Buffer::new();
        body.add_u64(self.num_desired);
        self.info.write(&mut body);
        ctx.send(self.dealer.clone(), body);
        if self.num_desired == 0 {
            warn!(kind = Info::LABEL, "requesting zero randomness instances");
            let dispenser = self.dispenser.take().expect("constructed with a dispenser");
            ctx.complete_with_result(Box::new(dispenser));
        }
        Ok(())
    }

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()> {
        if *from != self.dealer {
            warn!(kind = Info::LABEL, "patron ignoring a message not from its dealer");
            return Ok(());
        }
        if self.batches_received == 0 {
            self.batches_total = body.read_u64()? as usize;
            self.batch_size = body.read_u64()? as usize;
        }
        let dispenser = self.dispenser.as_mut().expect("present until completion");
        let mut read = 0;
        while read < self.batch_size && body.remaining() > 0 {
            dispenser.insert(self.info.read_rand(body)?);
            read += 1;
        }
        self.batches_received += 1;
        if self.batches_received == self.batches_total {
            debug!(kind = Info::LABEL, units = dispenser.len(), "patron finished");
            let dispenser = self.dispenser.take().expect("present until completion");
            ctx.complete_with_result(Box::new(dispenser));
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

/// Downcasts the boxed result a completed `Patron<I, Info>` hands back
/// into its `Dispenser`.
#[must_use]
pub fn downcast_dispenser<R: Send + 'static>(result: Box<dyn Any + Send>) -> Option<Dispenser<R>> {
    result.downcast::<Dispenser<R>>().ok().map(|b| *b)
}
