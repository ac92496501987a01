//! Runs a uniform vector of sibling fronctocols in lockstep as a single
//! engine instance.
//!
//! At every round each sibling's handler runs and its emitted actions
//! are collected; the first and last siblings' action vectors are
//! compared as a sanity check that every party batched the same way
//! (same kinds, same recipients, same peer sets), then the actions are
//! merged column-wise:
//!
//! - a column of `Send`s to one recipient becomes a single message,
//!   prefixed with the batch length, carrying every sibling's bytes;
//! - a column of `Invoke`s becomes one invoke of a recursive `Batch` of
//!   the invoked children;
//! - a column of `Complete`s completes the batch itself, with every
//!   sibling's result collected into one vector;
//! - promises and awaits are not supported inside a batch.

use crate::codec::{Buffer, Cursor};
use crate::engine::{Action, Fronctocol, FronctocolContext, FronctocolId};
use crate::error::{Error, Result};
use crate::peers::Identity;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::collections::VecDeque;

pub struct Batch<I: Identity> {
    children: Vec<Box<dyn Fronctocol<I>>>,
    results: Vec<Option<Box<dyn Any + Send>>>,
    /// For every outstanding recursive sub-batch: the ids each sibling
    /// allocated for its own invoked child, in sibling order, so the
    /// sub-batch's results can be routed back to the right siblings.
    sub_invokes: HashMap<FronctocolId, Vec<FronctocolId>>,
}

impl<I: Identity> Batch<I> {
    #[must_use]
    pub fn new(children: Vec<Box<dyn Fronctocol<I>>>) -> Self {
        let n = children.len();
        Batch {
            children,
            results: (0..n).map(|_| None).collect(),
            sub_invokes: HashMap::new(),
        }
    }

    /// Boxes a homogeneous sibling list.
    #[must_use]
    pub fn of<T: Fronctocol<I> + 'static>(siblings: Vec<T>) -> Self {
        Batch::new(
            siblings
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn Fronctocol<I>>)
                .collect(),
        )
    }

    fn check_first_last(first: &[Action<I>], last: &[Action<I>]) -> bool {
        if first.len() != last.len() {
            return false;
        }
        first.iter().zip(last).all(|(a, b)| match (a, b) {
            (Action::Send { to: ta, .. }, Action::Send { to: tb, .. }) => ta == tb,
            (Action::Invoke { peers: pa, .. }, Action::Invoke { peers: pb, .. }) => pa == pb,
            (Action::Promise { .. }, Action::Promise { .. })
            | (Action::Await { .. }, Action::Await { .. })
            | (Action::Complete { .. }, Action::Complete { .. })
            | (Action::Abort, Action::Abort) => true,
            _ => false,
        })
    }

    /// Merges one round's per-sibling action vectors column by column.
    fn handle_actions(
        &mut self,
        per_child: Vec<Vec<Action<I>>>,
        ctx: &mut FronctocolContext<I>,
    ) -> Result<()> {
        if per_child.len() > 1
            && !Self::check_first_last(&per_child[0], &per_child[per_child.len() - 1])
        {
            return Err(Error::BatchActionMismatch);
        }
        let columns = per_child.first().map_or(0, Vec::len);
        let mut rows: Vec<VecDeque<Action<I>>> =
            per_child.into_iter().map(VecDeque::from).collect();

        for _ in 0..columns {
            let mut column = Vec::with_capacity(rows.len());
            for row in &mut rows {
                column.push(row.pop_front().ok_or(Error::BatchActionMismatch)?);
            }
            match &column[0] {
                Action::Send { .. } => {
                    let mut wire = Buffer::new();
                    wire.add_u64(self.children.len() as u64);
                    let mut recipient = None;
                    for action in column {
                        let Action::Send { to, body } = action else {
                            return Err(Error::BatchActionMismatch);
                        };
                        recipient = Some(to);
                        wire.add_bytes(body.as_slice());
                    }
                    ctx.send(recipient.expect("columns are never empty"), wire);
                }
                Action::Invoke { .. } => {
                    let mut ids = Vec::with_capacity(column.len());
                    let mut invoked = Vec::with_capacity(column.len());
                    let mut child_peers = None;
                    for action in column {
                        let Action::Invoke { id, child, peers } = action else {
                            return Err(Error::BatchActionMismatch);
                        };
                        ids.push(id);
                        invoked.push(child);
                        child_peers = Some(peers);
                    }
                    let peers = child_peers.expect("columns are never empty");
                    let sub_id = ctx.invoke(Box::new(Batch::new(invoked)), peers);
                    self.sub_invokes.insert(sub_id, ids);
                }
                Action::Complete { .. } => {
                    for (i, action) in column.into_iter().enumerate() {
                        let Action::Complete { result } = action else {
                            return Err(Error::BatchActionMismatch);
                        };
                        self.results[i] = result;
                    }
                    let results = std::mem::take(&mut self.results);
                    ctx.complete_with_result(Box::new(results));
                }
                Action::Abort => {
                    ctx.abort();
                    return Ok(());
                }
                Action::Promise { .. } | Action::Await { .. } => {
                    return Err(Error::BatchAwaitUnsupported);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<I: Identity> Fronctocol<I> for Batch<I> {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()> {
        if self.children.is_empty() {
            ctx.complete_with_result(Box::new(Vec::<Option<Box<dyn Any + Send>>>::new()));
            return Ok(());
        }
        let mut per_child = Vec::with_capacity(self.children.len());
        for child in &mut self.children {
            let mut sub = ctx.sub_context();
            child.init(&mut sub).await?;
            per_child.push(sub.take_actions());
        }
        self.handle_actions(per_child, ctx)
    }

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()> {
        let peer_len = body.read_u64()? as usize;
        if peer_len != self.children.len() {
            return Err(Error::BatchLengthMismatch {
                ours: self.children.len(),
                theirs: peer_len,
            });
        }
        let mut per_child = Vec::with_capacity(self.children.len());
        for child in &mut self.children {
            let mut sub = ctx.sub_context();
            child.handle_receive(&mut sub, from, body).await?;
            per_child.push(sub.take_actions());
        }
        self.handle_actions(per_child, ctx)
    }

    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()> {
        let ids = self
            .sub_invokes
            .remove(&child)
            .ok_or(Error::UnknownFronctocol(child))?;
        let sub_results = result
            .and_then(|r| downcast_results(r))
            .ok_or(Error::BatchActionMismatch)?;
        if sub_results.len() != self.children.len() {
            return Err(Error::BatchLengthMismatch {
                ours: self.children.len(),
                theirs: sub_results.len(),
            });
        }
        let mut per_child = Vec::with_capacity(self.children.len());
        for ((sibling, sub_id), sub_result) in
            self.children.iter_mut().zip(ids).zip(sub_results)
        {
            let mut sub = ctx.sub_context();
            sibling.handle_complete(&mut sub, sub_id, sub_result).await?;
            per_child.push(sub.take_actions());
        }
        self.handle_actions(per_child, ctx)
    }

    async fn handle_promise(
        &mut self,
        _ctx: &mut FronctocolContext<I>,
        _promise: FronctocolId,
        _result: Box<dyn Any + Send>,
    ) -> Result<()> {
        Err(Error::BatchAwaitUnsupported)
    }
}

/// Downcasts a completed `Batch`'s result back into the per-sibling
/// result vector.
#[must_use]
pub fn downcast_results(result: Box<dyn Any + Send>) -> Option<Vec<Option<Box<dyn Any + Send>>>> {
    result.downcast::<Vec<Option<Box<dyn Any + Send>>>>().ok().map(|b| *b)
}
