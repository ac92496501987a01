//! Spins up one [`Engine`] per party over an [`InMemoryNetwork`] and
//! pumps each party's message loop to completion, so whole multi-party
//! protocols can run inside a single test process.

use crate::codec::Buffer;
use crate::engine::{Engine, Fronctocol};
use crate::error::Result;
use crate::helpers::in_memory::InMemoryNetwork;
use crate::helpers::mesh::Mesh;
use crate::peers::{Identity, PeerSet};
use std::any::Any;
use std::sync::Arc;

pub struct TestWorld;

impl TestWorld {
    /// Runs `roots` (one root fronctocol per party) to completion and
    /// returns each party's root result in the same order: `Ok(Some(_))`
    /// if the root fronctocol promised a result before the engine closed,
    /// `Ok(None)` if it completed without one, `Err` if the engine itself
    /// errored. Every party sees every other party named in `roots` as a
    /// peer.
    ///
    /// # Panics
    /// Panics if a party's task itself panics (propagated so a broken
    /// protocol fails the calling test loudly).
    pub async fn run<I: Identity>(
        roots: Vec<(I, Box<dyn Fronctocol<I>>)>,
    ) -> Vec<Result<Option<Box<dyn Any + Send>>>> {
        let parties: Vec<I> = roots.iter().map(|(id, _)| id.clone()).collect();
        let nets = InMemoryNetwork::build(parties.clone());
        let peers = PeerSet::from_identities(parties);

        let mut handles = Vec::new();
        for ((me, root), net) in roots.into_iter().zip(nets) {
            let peers = peers.clone();
            handles.push(tokio::spawn(run_party(me, net, peers, root)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.expect("party task panicked"));
        }
        results
    }
}

async fn run_party<I: Identity>(
    me: I,
    net: Arc<InMemoryNetwork<I>>,
    peers: PeerSet<I>,
    root: Box<dyn Fronctocol<I>>,
) -> Result<Option<Box<dyn Any + Send>>> {
    let mut engine = Engine::new(me);
    let mut outgoing = Vec::new();
    engine.init(root, peers, &mut outgoing).await?;
    flush(&net, &mut outgoing).await?;

    while !engine.is_closed() {
        let (from, body) = net.recv().await?;
        let mut outgoing = Vec::new();
        engine.handle_receive(&from, &body, &mut outgoing).await?;
        flush(&net, &mut outgoing).await?;
    }
    Ok(engine.take_main_result())
}

async fn flush<I: Identity>(net: &InMemoryNetwork<I>, outgoing: &mut Vec<(I, Buffer)>) -> Result<()> {
    for (to, body) in outgoing.drain(..) {
        net.send(&to, body).await?;
    }
    Ok(())
}
