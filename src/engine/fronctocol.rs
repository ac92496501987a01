//! The `Fronctocol` trait and the actions a fronctocol emits while it
//! runs.

use crate::codec::{Buffer, Cursor};
use crate::error::Result;
use crate::peers::{Identity, PeerSet};
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A 64-bit id, unique within one party. `0` is reserved for `main`;
/// [`FronctocolId::INVALID`] is carried by ABORT messages, which the
/// engine dispatches without any instance lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FronctocolId(pub u64);

impl FronctocolId {
    pub const MAIN: FronctocolId = FronctocolId(0);
    pub const INVALID: FronctocolId = FronctocolId(u64::MAX);
}

impl std::fmt::Display for FronctocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One party's local embodiment of a distributed sub-protocol. Handlers
/// never block on I/O: they record their intent by calling methods on
/// [`FronctocolContext`] and the engine turns the accumulated
/// [`Action`]s into outgoing messages and child instances.
#[async_trait]
pub trait Fronctocol<I: Identity>: Send {
    async fn init(&mut self, ctx: &mut FronctocolContext<I>) -> Result<()>;

    async fn handle_receive(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        from: &I,
        body: &mut Cursor<'_>,
    ) -> Result<()>;

    /// `result` is whatever the completed child passed to
    /// [`FronctocolContext::complete_with_result`], or `None` if it
    /// completed bare; concrete implementations downcast it to the type
    /// they know the child produces.
    async fn handle_complete(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        child: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
    ) -> Result<()>;

    /// `result` is the boxed output of a completed promise; concrete
    /// implementations downcast it to the type they know they promised.
    async fn handle_promise(
        &mut self,
        ctx: &mut FronctocolContext<I>,
        promise: FronctocolId,
        result: Box<dyn Any + Send>,
    ) -> Result<()>;
}

/// What a fronctocol asked the engine to do, in emission order.
pub enum Action<I: Identity> {
    Send {
        to: I,
        body: Buffer,
    },
    Invoke {
        id: FronctocolId,
        child: Box<dyn Fronctocol<I>>,
        peers: PeerSet<I>,
    },
    Promise {
        id: FronctocolId,
        child: Box<dyn Fronctocol<I>>,
        peers: PeerSet<I>,
    },
    Await {
        promise: FronctocolId,
    },
    /// Marks this instance done. `result` is carried to the eventual
    /// `handle_promise` call if this instance was invoked via `promise`;
    /// it is ignored for plain `invoke`d children.
    Complete {
        result: Option<Box<dyn Any + Send>>,
    },
    Abort,
}

impl<I: Identity> Debug for Action<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Send { to, body } => f
                .debug_struct("Send")
                .field("to", to)
                .field("len", &body.length())
                .finish(),
            Action::Invoke { id, peers, .. } => f
                .debug_struct("Invoke")
                .field("id", id)
                .field("peers", &peers.len())
                .finish(),
            Action::Promise { id, peers, .. } => f
                .debug_struct("Promise")
                .field("id", id)
                .field("peers", &peers.len())
                .finish(),
            Action::Await { promise } => f.debug_struct("Await").field("promise", promise).finish(),
            Action::Complete { result } => f
                .debug_struct("Complete")
                .field("has_result", &result.is_some())
                .finish(),
            Action::Abort => write!(f, "Abort"),
        }
    }
}

/// Accumulates the actions one handler invocation emits, and allocates
/// child ids eagerly so a handler can `Await` a `Promise` it just
/// created in the same call.
pub struct FronctocolContext<I: Identity> {
    self_id: FronctocolId,
    peers: PeerSet<I>,
    me: I,
    next_id: Arc<AtomicU64>,
    actions: Vec<Action<I>>,
}

impl<I: Identity> FronctocolContext<I> {
    pub(crate) fn new(self_id: FronctocolId, peers: PeerSet<I>, me: I, next_id: Arc<AtomicU64>) -> Self {
        FronctocolContext {
            self_id,
            peers,
            me,
            next_id,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> FronctocolId {
        self.self_id
    }

    /// This instance's own identity.
    #[must_use]
    pub fn me(&self) -> &I {
        &self.me
    }

    /// The identities sharing this fronctocol instance, including `me()`.
    #[must_use]
    pub fn peers(&self) -> &PeerSet<I> {
        &self.peers
    }

    /// Every peer other than `me()`.
    pub fn other_peers(&self) -> impl Iterator<Item = &I> {
        self.peers.iter_except(&self.me).map(|(id, _)| id)
    }

    fn alloc_id(&self) -> FronctocolId {
        FronctocolId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn send(&mut self, to: I, body: Buffer) {
        self.actions.push(Action::Send { to, body });
    }

    /// Invokes a child fronctocol tied to this instance as its parent.
    /// Returns the child's (locally allocated) id.
    pub fn invoke(&mut self, child: Box<dyn Fronctocol<I>>, peers: PeerSet<I>) -> FronctocolId {
        let id = self.alloc_id();
        self.actions.push(Action::Invoke { id, child, peers });
        id
    }

    /// Invokes a child whose completion is decoupled from this instance;
    /// some later fronctocol must `await_promise` it.
    pub fn promise(&mut self, child: Box<dyn Fronctocol<I>>, peers: PeerSet<I>) -> FronctocolId {
        let id = self.alloc_id();
        self.actions.push(Action::Promise { id, child, peers });
        id
    }

    pub fn await_promise(&mut self, promise: FronctocolId) {
        self.actions.push(Action::Await { promise });
    }

    /// Completes this instance with no result, for plain `invoke`d children.
    pub fn complete(&mut self) {
        self.actions.push(Action::Complete { result: None });
    }

    /// Completes this instance carrying the value a `promise`-invoking
    /// parent will receive through `handle_promise`.
    pub fn complete_with_result(&mut self, result: Box<dyn Any + Send>) {
        self.actions.push(Action::Complete {
            result: Some(result),
        });
    }

    pub fn abort(&mut self) {
        self.actions.push(Action::Abort);
    }

    pub(crate) fn take_actions(self) -> Vec<Action<I>> {
        self.actions
    }

    /// A fresh context sharing this one's id allocator, identity, and
    /// peer set, used by combinators (`Batch`) that drive a sibling
    /// fronctocol's handlers directly instead of through the engine.
    pub(crate) fn sub_context(&self) -> Self {
        FronctocolContext::new(self.self_id, self.peers.clone(), self.me.clone(), self.next_id.clone())
    }
}
