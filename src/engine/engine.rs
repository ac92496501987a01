//! The fronctocol engine — the heart of the runtime.
//!
//! One `Engine<I>` runs per party. It owns every live fronctocol
//! instance, allocates ids, matches children across parties via SYNC,
//! routes PAYLOAD bytes into the right instance, and tears instances
//! down once both this party and every peer have reported completion.

use super::fronctocol::{Action, Fronctocol, FronctocolContext, FronctocolId};
use crate::codec::{Buffer, Cursor};
use crate::error::{Error, Result};
use crate::peers::{Identity, PeerSet};
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, warn};

const CTRLBLK_SYNC: u8 = 0x00;
const CTRLBLK_PAYLOAD: u8 = 0x01;
const CTRLBLK_COMPLETE: u8 = 0x02;
const CTRLBLK_ABORT: u8 = 0x04;

/// A message waiting for its instance to become ready
/// (`incoming_message_caches`): the control block it arrived under, who
/// sent it, and its raw body bytes.
struct CachedMessage<I> {
    control_block: u8,
    from: I,
    body: Vec<u8>,
}

/// A peer's SYNC for a child we have not yet locally invoked: all we
/// know is which peers it names and which of them have announced an id.
struct WombEntry<I: Identity> {
    peers: PeerSet<I>,
}

struct InstanceRecord<I: Identity> {
    id: FronctocolId,
    peers: PeerSet<I>,
    parent: Option<FronctocolId>,
    implementation: Box<dyn Fronctocol<I>>,
    cradle: Vec<FronctocolId>,
    womb: Vec<WombEntry<I>>,
    cache: Vec<CachedMessage<I>>,
    completed: bool,
    collected: bool,
    promised: bool,
    /// Result handed to `handle_promise` once a promise this party
    /// awaited resolves; populated when `Complete` fires on a promised
    /// instance, consumed by `Await`.
    promise_result: Option<Box<dyn Any + Send>>,
}

impl<I: Identity> InstanceRecord<I> {
    fn ready(&self) -> bool {
        self.peers.has_all_peer_ids()
    }
}

/// Per-party scheduler owning the tree of active fronctocol instances.
pub struct Engine<I: Identity> {
    me: I,
    next_id: Arc<AtomicU64>,
    instances: HashMap<FronctocolId, InstanceRecord<I>>,
    finished: bool,
    aborted: bool,
    /// The root instance's promise result, migrated out of its
    /// `InstanceRecord` the moment that record would otherwise be torn
    /// down, so a caller can still retrieve it after `is_closed()`.
    main_result: Option<Box<dyn Any + Send>>,
}

impl<I: Identity> Engine<I> {
    #[must_use]
    pub fn new(me: I) -> Self {
        Engine {
            me,
            next_id: Arc::new(AtomicU64::new(1)),
            instances: HashMap::new(),
            finished: false,
            aborted: false,
            main_result: None,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.finished && self.instances.is_empty()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Takes the root fronctocol's promised result, if it completed with
    /// one. Meaningful once `is_finished()` is true; returns `None` before
    /// that, and `None` again on a second call since the result is moved
    /// out.
    pub fn take_main_result(&mut self) -> Option<Box<dyn Any + Send>> {
        if let Some(record) = self.instances.get_mut(&FronctocolId::MAIN) {
            if let Some(result) = record.promise_result.take() {
                return Some(result);
            }
        }
        self.main_result.take()
    }

    /// Starts the root fronctocol (id 0) with the given peer set
    /// (which must include `self.me`). The root needs no SYNC exchange:
    /// id 0 is reserved for it on every party, so every peer's id is
    /// known from the start.
    pub async fn init(
        &mut self,
        main: Box<dyn Fronctocol<I>>,
        peers: PeerSet<I>,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let mut peers = peers;
        let members: Vec<I> = peers.iter().map(|(id, _)| id.clone()).collect();
        for member in members {
            peers.check_and_set_id(&member, FronctocolId::MAIN.0);
        }
        let record = InstanceRecord {
            id: FronctocolId::MAIN,
            peers,
            parent: None,
            implementation: main,
            cradle: Vec::new(),
            womb: Vec::new(),
            cache: Vec::new(),
            completed: false,
            collected: false,
            promised: false,
            promise_result: None,
        };
        self.instances.insert(FronctocolId::MAIN, record);
        self.run_init(FronctocolId::MAIN, outgoing).await
    }

    /// Feeds one fully-received incoming wire message to the engine.
    pub async fn handle_receive(
        &mut self,
        from: &I,
        body: &[u8],
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        if self.aborted {
            debug!("dropping message after abort");
            return Ok(());
        }
        let mut cursor = Cursor::new(body);
        let control_block = cursor.read_u8()?;
        let recipient_id = FronctocolId(cursor.read_u64()?);

        match control_block {
            CTRLBLK_ABORT => {
                self.on_abort(outgoing).await?;
                Ok(())
            }
            CTRLBLK_SYNC => self.on_sync(recipient_id, from, &mut cursor, outgoing).await,
            CTRLBLK_PAYLOAD => {
                self.on_payload(recipient_id, from, cursor.remaining_bytes(), outgoing)
                    .await
            }
            CTRLBLK_COMPLETE => self.on_complete_message(recipient_id, from, outgoing).await,
            other => {
                warn!(control_block = other, "unknown control block, dropping message");
                Err(Error::UnknownControlBlock(other))
            }
        }
    }

    // ---- SYNC ----------------------------------------------------------

    async fn on_sync(
        &mut self,
        parent_id: FronctocolId,
        from: &I,
        body: &mut Cursor<'_>,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let _sender_local_parent_id = body.read_u64()?;
        let child_peer_ids: Vec<I> = {
            let count = body.read_u32()?;
            let mut ids = Vec::with_capacity(count as usize);
            for _ in 0..count {
                ids.push(I::read(body)?);
            }
            ids
        };
        let child_peers = PeerSet::from_identities(child_peer_ids);
        let sender_child_id = body.read_u64()?;

        let Some(parent) = self.instances.get(&parent_id) else {
            warn!(?parent_id, "SYNC for unknown parent, dropping");
            return Ok(());
        };

        // 1. Look for a cradle child with a matching peer set that doesn't
        // yet know the sender's id.
        for &cradle_id in &parent.cradle.clone() {
            let matches = self
                .instances
                .get(&cradle_id)
                .is_some_and(|c| c.peers == child_peers && c.peers.find_peer_id(from).is_none());
            if matches {
                let child = self.instances.get_mut(&cradle_id).unwrap();
                child.peers.check_and_set_id(from, sender_child_id);
                if child.ready() {
                    let parent_mut = self.instances.get_mut(&parent_id).unwrap();
                    parent_mut.cradle.retain(|id| *id != cradle_id);
                    self.run_init(cradle_id, outgoing).await?;
                }
                return Ok(());
            }
        }

        // 2. Otherwise look in the womb: the first pre-announced match
        // that has not yet heard from this sender. Same-peerset siblings
        // pair up by announcement order, which every party shares.
        let parent = self.instances.get_mut(&parent_id).unwrap();
        for entry in &mut parent.womb {
            if entry.peers == child_peers && entry.peers.find_peer_id(from).is_none() {
                entry.peers.check_and_set_id(from, sender_child_id);
                return Ok(());
            }
        }

        // 3. Otherwise start a new womb entry with just this peer's id.
        let mut peers = child_peers;
        peers.check_and_set_id(from, sender_child_id);
        parent.womb.push(WombEntry { peers });
        Ok(())
    }

    // ---- PAYLOAD ---------------------------------------------------------

    async fn on_payload(
        &mut self,
        id: FronctocolId,
        from: &I,
        body: &[u8],
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let Some(record) = self.instances.get_mut(&id) else {
            warn!(?id, "PAYLOAD for unknown fronctocol, dropping");
            return Ok(());
        };
        if record.completed {
            warn!(?id, "PAYLOAD for already-completed fronctocol, dropping");
            return Ok(());
        }
        if !record.ready() || !record.cache.is_empty() {
            record.cache.push(CachedMessage {
                control_block: CTRLBLK_PAYLOAD,
                from: from.clone(),
                body: body.to_vec(),
            });
            return Ok(());
        }
        self.dispatch_receive(id, from, body, outgoing).await
    }

    async fn dispatch_receive(
        &mut self,
        id: FronctocolId,
        from: &I,
        body: &[u8],
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let mut record = self
            .instances
            .remove(&id)
            .ok_or(Error::UnknownFronctocol(id))?;
        let mut ctx = FronctocolContext::new(id, record.peers.clone(), self.me.clone(), self.next_id.clone());
        let mut cursor = Cursor::new(body);
        let result = record
            .implementation
            .handle_receive(&mut ctx, from, &mut cursor)
            .await;
        self.instances.insert(id, record);
        if let Err(e) = result {
            self.broadcast_abort(outgoing).await?;
            return Err(e);
        }
        let actions = ctx.take_actions();
        self.apply_actions(id, actions, outgoing).await
    }

    /// Drains an instance's message cache in arrival order, once it
    /// becomes ready (via `init` or the final SYNC).
    async fn drain_cache(&mut self, id: FronctocolId, outgoing: &mut Vec<(I, Buffer)>) -> Result<()> {
        loop {
            let Some(record) = self.instances.get_mut(&id) else {
                return Ok(());
            };
            if record.cache.is_empty() {
                return Ok(());
            }
            let msg = record.cache.remove(0);
            match msg.control_block {
                CTRLBLK_PAYLOAD => {
                    self.dispatch_receive(id, &msg.from, &msg.body, outgoing).await?;
                }
                CTRLBLK_COMPLETE => {
                    self.apply_complete_from_peer(id, &msg.from, outgoing).await?;
                }
                _ => unreachable!("only PAYLOAD and COMPLETE are ever cached"),
            }
        }
    }

    // ---- COMPLETE ----------------------------------------------------------

    async fn on_complete_message(
        &mut self,
        id: FronctocolId,
        from: &I,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let Some(record) = self.instances.get_mut(&id) else {
            warn!(?id, "COMPLETE for unknown fronctocol, dropping");
            return Ok(());
        };
        if !record.ready() {
            record.cache.push(CachedMessage {
                control_block: CTRLBLK_COMPLETE,
                from: from.clone(),
                body: Vec::new(),
            });
            return Ok(());
        }
        self.apply_complete_from_peer(id, from, outgoing).await
    }

    async fn apply_complete_from_peer(
        &mut self,
        id: FronctocolId,
        from: &I,
        _outgoing: &mut [(I, Buffer)],
    ) -> Result<()> {
        let Some(record) = self.instances.get_mut(&id) else {
            return Ok(());
        };
        record.peers.set_completed(from);
        if record.collected && record.peers.check_all_completed() {
            let is_main = id == FronctocolId::MAIN;
            if let Some(record) = self.instances.remove(&id) {
                if is_main {
                    self.main_result = record.promise_result;
                }
            }
            if is_main {
                self.finished = true;
            }
        }
        Ok(())
    }

    // ---- init / invoke ----------------------------------------------------------

    async fn run_init(&mut self, id: FronctocolId, outgoing: &mut Vec<(I, Buffer)>) -> Result<()> {
        let mut record = self
            .instances
            .remove(&id)
            .ok_or(Error::UnknownFronctocol(id))?;
        let mut ctx = FronctocolContext::new(id, record.peers.clone(), self.me.clone(), self.next_id.clone());
        let result = record.implementation.init(&mut ctx).await;
        self.instances.insert(id, record);
        if let Err(e) = result {
            self.broadcast_abort(outgoing).await?;
            return Err(e);
        }
        let actions = ctx.take_actions();
        self.apply_actions(id, actions, outgoing).await?;
        self.drain_cache(id, outgoing).await
    }

    /// Boxed rather than a plain `async fn`: every handler re-entry
    /// cycle in the engine (invoke running a child's `init`, a
    /// completion re-entering the parent) loops back through here, and
    /// the indirection is what makes the recursion well-founded for the
    /// compiler.
    fn apply_actions<'a>(
        &'a mut self,
        id: FronctocolId,
        actions: Vec<Action<I>>,
        outgoing: &'a mut Vec<(I, Buffer)>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for action in actions {
                match action {
                    Action::Send { to, body } => {
                        let recipient_id = self
                            .instances
                            .get(&id)
                            .and_then(|r| r.peers.find_peer_id(&to));
                        let Some(recipient_id) = recipient_id else {
                            warn!(?id, ?to, "Send to a peer with no known id, dropping");
                            continue;
                        };
                        let mut wire = body;
                        wire.prepend_u64(recipient_id);
                        wire.prepend_u8(CTRLBLK_PAYLOAD);
                        outgoing.push((to, wire));
                    }
                    Action::Invoke { id: child_id, child, peers } => {
                        self.invoke(id, child_id, child, peers, false, outgoing).await?;
                    }
                    Action::Promise { id: child_id, child, peers } => {
                        self.invoke(id, child_id, child, peers, true, outgoing).await?;
                    }
                    Action::Await { promise } => {
                        self.handle_await(id, promise, outgoing).await?;
                    }
                    Action::Complete { result } => {
                        self.handle_complete_self(id, result, outgoing).await?;
                    }
                    Action::Abort => {
                        self.broadcast_abort(outgoing).await?;
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }

    async fn invoke(
        &mut self,
        parent_id: FronctocolId,
        child_id: FronctocolId,
        child_impl: Box<dyn Fronctocol<I>>,
        child_peer_identities: PeerSet<I>,
        is_promise: bool,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let parent_peers = self
            .instances
            .get(&parent_id)
            .map(|p| p.peers.clone())
            .ok_or(Error::UnknownFronctocol(parent_id))?;

        // Step 2: look for a pre-announced match in the womb.
        let mut child_peers = {
            let parent = self.instances.get_mut(&parent_id).unwrap();
            let slot = parent
                .womb
                .iter()
                .position(|entry| entry.peers == child_peer_identities);
            match slot {
                Some(i) => parent.womb.remove(i).peers,
                None => PeerSet::from_identities(
                    child_peer_identities.iter().map(|(id, _)| id.clone()),
                ),
            }
        };
        child_peers.check_and_set_id(&self.me, child_id.0);

        let record = InstanceRecord {
            id: child_id,
            peers: child_peers.clone(),
            parent: if is_promise { None } else { Some(parent_id) },
            implementation: child_impl,
            cradle: Vec::new(),
            womb: Vec::new(),
            cache: Vec::new(),
            completed: false,
            collected: false,
            promised: is_promise,
            promise_result: None,
        };
        self.instances.insert(child_id, record);

        // Step 4: SYNC every peer other than self.
        for (peer, _) in child_peers.iter_except(&self.me) {
            let Some(parent_id_for_peer) = parent_peers.find_peer_id(peer) else {
                warn!(?peer, "cannot SYNC: peer's id for parent is unknown");
                continue;
            };
            let mut body = Buffer::new();
            body.add_u64(parent_id.0);
            body.add_u32(u32::try_from(child_peers.len()).unwrap());
            for (id, _) in child_peers.iter() {
                id.write(&mut body);
            }
            body.add_u64(child_id.0);
            body.prepend_u64(parent_id_for_peer);
            body.prepend_u8(CTRLBLK_SYNC);
            outgoing.push((peer.clone(), body));
        }

        // Step 5/6: init now, or wait in the cradle.
        if child_peers.has_all_peer_ids() {
            self.run_init(child_id, outgoing).await?;
        } else if let Some(parent) = self.instances.get_mut(&parent_id) {
            parent.cradle.push(child_id);
        }
        Ok(())
    }

    // ---- Await / promise resolution ----------------------------------------------------------

    async fn handle_await(
        &mut self,
        parent_id: FronctocolId,
        promise_id: FronctocolId,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        {
            let promise = self
                .instances
                .get_mut(&promise_id)
                .ok_or(Error::UnknownFronctocol(promise_id))?;
            if promise.parent.is_some() {
                return Err(Error::PromiseAlreadyAwaited(promise_id));
            }
            promise.parent = Some(parent_id);
            promise.promised = true;
        }
        let already_completed = self.instances.get(&promise_id).unwrap().completed;
        if already_completed {
            self.deliver_promise(parent_id, promise_id, outgoing).await?;
        }
        Ok(())
    }

    async fn deliver_promise(
        &mut self,
        parent_id: FronctocolId,
        promise_id: FronctocolId,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let promise_result = self
            .instances
            .get_mut(&promise_id)
            .and_then(|p| p.promise_result.take())
            .ok_or(Error::PromiseNotReady(promise_id))?;

        let mut parent_record = self
            .instances
            .remove(&parent_id)
            .ok_or(Error::UnknownFronctocol(parent_id))?;
        let mut ctx = FronctocolContext::new(
            parent_id,
            parent_record.peers.clone(),
            self.me.clone(),
            self.next_id.clone(),
        );
        let result = parent_record
            .implementation
            .handle_promise(&mut ctx, promise_id, promise_result)
            .await;
        self.instances.insert(parent_id, parent_record);
        if let Err(e) = result {
            self.broadcast_abort(outgoing).await?;
            return Err(e);
        }

        if let Some(promise) = self.instances.get_mut(&promise_id) {
            promise.collected = true;
            if promise.peers.check_all_completed() {
                self.instances.remove(&promise_id);
            }
        }

        let actions = ctx.take_actions();
        self.apply_actions(parent_id, actions, outgoing).await
    }

    // ---- Complete ----------------------------------------------------------

    async fn handle_complete_self(
        &mut self,
        id: FronctocolId,
        result: Option<Box<dyn Any + Send>>,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let (peers, parent, promised) = {
            let record = self.instances.get_mut(&id).ok_or(Error::UnknownFronctocol(id))?;
            record.completed = true;
            record.peers.set_completed(&self.me);
            record.promise_result = result;
            (record.peers.clone(), record.parent, record.promised)
        };

        for (peer, state) in peers.iter_except(&self.me) {
            if let Some(my_id_for_peer) = state.peer_id {
                let mut body = Buffer::new();
                body.prepend_u64(my_id_for_peer);
                body.prepend_u8(CTRLBLK_COMPLETE);
                outgoing.push((peer.clone(), body));
            }
        }

        if id == FronctocolId::MAIN {
            self.finished = true;
            if let Some(record) = self.instances.get_mut(&id) {
                record.collected = true;
                if record.peers.check_all_completed() {
                    if let Some(record) = self.instances.remove(&id) {
                        self.main_result = record.promise_result;
                    }
                }
            }
            return Ok(());
        }

        match parent {
            // Already awaited before this instance finished: hand the
            // result straight to the parent.
            Some(parent_id) if promised => self.deliver_promise(parent_id, id, outgoing).await,
            Some(parent_id) => self.deliver_complete(parent_id, id, outgoing).await,
            // Promised but not yet awaited: the result waits on the
            // record until `handle_await` observes `completed`.
            None => Ok(()),
        }
    }

    async fn deliver_complete(
        &mut self,
        parent_id: FronctocolId,
        child_id: FronctocolId,
        outgoing: &mut Vec<(I, Buffer)>,
    ) -> Result<()> {
        let child_result = self
            .instances
            .get_mut(&child_id)
            .and_then(|c| c.promise_result.take());
        let mut parent_record = self
            .instances
            .remove(&parent_id)
            .ok_or(Error::UnknownFronctocol(parent_id))?;
        let mut ctx = FronctocolContext::new(
            parent_id,
            parent_record.peers.clone(),
            self.me.clone(),
            self.next_id.clone(),
        );
        let result = parent_record
            .implementation
            .handle_complete(&mut ctx, child_id, child_result)
            .await;
        self.instances.insert(parent_id, parent_record);
        if let Err(e) = result {
            self.broadcast_abort(outgoing).await?;
            return Err(e);
        }

        if let Some(child) = self.instances.get_mut(&child_id) {
            child.collected = true;
            if child.peers.check_all_completed() {
                self.instances.remove(&child_id);
            }
        }

        let actions = ctx.take_actions();
        self.apply_actions(parent_id, actions, outgoing).await
    }

    // ---- Abort ----------------------------------------------------------

    async fn broadcast_abort(&mut self, outgoing: &mut Vec<(I, Buffer)>) -> Result<()> {
        if self.aborted {
            return Ok(());
        }
        self.aborted = true;
        if let Some(main) = self.instances.get(&FronctocolId::MAIN) {
            for (peer, _) in main.peers.iter_except(&self.me) {
                let mut body = Buffer::new();
                body.prepend_u64(FronctocolId::INVALID.0);
                body.prepend_u8(CTRLBLK_ABORT);
                outgoing.push((peer.clone(), body));
            }
        }
        warn!("engine aborted");
        Ok(())
    }

    async fn on_abort(&mut self, outgoing: &mut Vec<(I, Buffer)>) -> Result<()> {
        self.broadcast_abort(outgoing).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Sends one byte to the peer, completes once the peer's byte
    /// arrives.
    struct Echo;

    #[async_trait]
    impl Fronctocol<String> for Echo {
        async fn init(&mut self, ctx: &mut FronctocolContext<String>) -> Result<()> {
            let peers: Vec<String> = ctx.other_peers().cloned().collect();
            for peer in peers {
                let mut body = Buffer::new();
                body.add_u8(0x2a);
                ctx.send(peer, body);
            }
            Ok(())
        }

        async fn handle_receive(
            &mut self,
            ctx: &mut FronctocolContext<String>,
            _from: &String,
            body: &mut Cursor<'_>,
        ) -> Result<()> {
            assert_eq!(body.read_u8()?, 0x2a);
            ctx.complete_with_result(Box::new(0x2a_u8));
            Ok(())
        }

        async fn handle_complete(
            &mut self,
            _ctx: &mut FronctocolContext<String>,
            _child: FronctocolId,
            _result: Option<Box<dyn Any + Send>>,
        ) -> Result<()> {
            Ok(())
        }

        async fn handle_promise(
            &mut self,
            _ctx: &mut FronctocolContext<String>,
            _promise: FronctocolId,
            _result: Box<dyn Any + Send>,
        ) -> Result<()> {
            Ok(())
        }
    }

    /// Invokes one `Echo` child and completes once it does, carrying the
    /// child's result up.
    struct Root;

    #[async_trait]
    impl Fronctocol<String> for Root {
        async fn init(&mut self, ctx: &mut FronctocolContext<String>) -> Result<()> {
            let peers = ctx.peers().clone();
            ctx.invoke(Box::new(Echo), peers);
            Ok(())
        }

        async fn handle_receive(
            &mut self,
            _ctx: &mut FronctocolContext<String>,
            _from: &String,
            _body: &mut Cursor<'_>,
        ) -> Result<()> {
            panic!("root expects no direct payloads");
        }

        async fn handle_complete(
            &mut self,
            ctx: &mut FronctocolContext<String>,
            _child: FronctocolId,
            result: Option<Box<dyn Any + Send>>,
        ) -> Result<()> {
            let byte = result
                .and_then(|r| r.downcast::<u8>().ok())
                .expect("echo completes with its byte");
            ctx.complete_with_result(byte);
            Ok(())
        }

        async fn handle_promise(
            &mut self,
            _ctx: &mut FronctocolContext<String>,
            _promise: FronctocolId,
            _result: Box<dyn Any + Send>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn two_party_peers() -> PeerSet<String> {
        PeerSet::from_identities(["a".to_string(), "b".to_string()])
    }

    /// Shuttles queued messages between the two engines, in send order,
    /// until neither produces more.
    async fn pump(engines: &mut [(String, Engine<String>)], pending: Vec<(String, Vec<u8>, String)>) {
        let mut pending: std::collections::VecDeque<_> = pending.into();
        while let Some((from, body, to)) = pending.pop_front() {
            let mut outgoing = Vec::new();
            let engine = &mut engines.iter_mut().find(|(id, _)| *id == to).unwrap().1;
            engine.handle_receive(&from, &body, &mut outgoing).await.unwrap();
            for (next_to, buffer) in outgoing {
                pending.push_back((to.clone(), buffer.into_vec(), next_to));
            }
        }
    }

    #[tokio::test]
    async fn invoked_children_match_across_parties_and_tear_down() {
        let mut engines = vec![
            ("a".to_string(), Engine::new("a".to_string())),
            ("b".to_string(), Engine::new("b".to_string())),
        ];
        let mut pending = Vec::new();
        for (me, engine) in &mut engines {
            let mut outgoing = Vec::new();
            engine
                .init(Box::new(Root), two_party_peers(), &mut outgoing)
                .await
                .unwrap();
            for (to, buffer) in outgoing {
                pending.push((me.clone(), buffer.into_vec(), to));
            }
        }
        pump(&mut engines, pending).await;

        for (me, engine) in &mut engines {
            assert!(engine.is_finished(), "{me} finished");
            assert!(engine.is_closed(), "{me} erased every instance");
            assert!(!engine.is_aborted(), "{me} never aborted");
            let result = engine
                .take_main_result()
                .and_then(|r| r.downcast::<u8>().ok());
            assert_eq!(result.as_deref(), Some(&0x2a), "{me} kept the root result");
        }
    }

    #[tokio::test]
    async fn abort_is_monotonic_and_silences_the_engine() {
        let mut engine = Engine::new("a".to_string());
        let mut outgoing = Vec::new();
        engine
            .init(Box::new(Root), two_party_peers(), &mut outgoing)
            .await
            .unwrap();

        let mut abort = Buffer::new();
        abort.prepend_u64(FronctocolId::INVALID.0);
        abort.prepend_u8(CTRLBLK_ABORT);
        let mut replies = Vec::new();
        engine
            .handle_receive(&"b".to_string(), abort.as_slice(), &mut replies)
            .await
            .unwrap();
        assert!(engine.is_aborted());

        // Anything after the abort is dropped without effect.
        let mut late = Buffer::new();
        late.add_u8(0x2a);
        late.prepend_u64(1);
        late.prepend_u8(CTRLBLK_PAYLOAD);
        engine
            .handle_receive(&"b".to_string(), late.as_slice(), &mut Vec::new())
            .await
            .unwrap();
        assert!(engine.is_aborted(), "abort never resets");
        assert!(!engine.is_finished());
    }

    #[tokio::test]
    async fn unknown_control_blocks_are_rejected() {
        let mut engine = Engine::new("a".to_string());
        let mut outgoing = Vec::new();
        engine
            .init(Box::new(Root), two_party_peers(), &mut outgoing)
            .await
            .unwrap();
        let mut bogus = Buffer::new();
        bogus.prepend_u64(0);
        bogus.prepend_u8(0x7f);
        let result = engine
            .handle_receive(&"b".to_string(), bogus.as_slice(), &mut Vec::new())
            .await;
        assert!(matches!(result, Err(Error::UnknownControlBlock(0x7f))));
    }
}
