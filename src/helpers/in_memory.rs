//! In-process transport used by tests and benches: every party's inbox
//! is a channel inside one shared process, so a whole run can be driven
//! from a single `tokio` task without touching the network.

use crate::codec::Buffer;
use crate::error::{Error, Result};
use crate::helpers::mesh::Mesh;
use crate::peers::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// A fully-connected mesh of in-memory channels, one per party, created
/// together so every sender already knows every peer's inbox.
pub struct InMemoryNetwork<I: Identity> {
    me: I,
    outboxes: HashMap<I, mpsc::UnboundedSender<(I, Vec<u8>)>>,
    inbox: Mutex<mpsc::UnboundedReceiver<(I, Vec<u8>)>>,
}

impl<I: Identity> InMemoryNetwork<I> {
    /// Builds one connected `InMemoryNetwork` per identity in `parties`.
    #[must_use]
    pub fn build(parties: Vec<I>) -> Vec<Arc<Self>> {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for party in &parties {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(party.clone(), tx);
            receivers.insert(party.clone(), rx);
        }
        parties
            .into_iter()
            .map(|me| {
                let inbox = receivers.remove(&me).expect("built one receiver per party");
                Arc::new(InMemoryNetwork {
                    me,
                    outboxes: senders.clone(),
                    inbox: Mutex::new(inbox),
                })
            })
            .collect()
    }
}

#[async_trait]
impl<I: Identity> Mesh<I> for InMemoryNetwork<I> {
    async fn send(&self, to: &I, body: Buffer) -> Result<()> {
        let outbox = self
            .outboxes
            .get(to)
            .ok_or_else(|| Error::UnknownIdentity(format!("{to:?}")))?;
        outbox
            .send((self.me.clone(), body.into_vec()))
            .map_err(|_| Error::Transport(format!("peer {to:?} dropped its inbox")))
    }

    async fn recv(&self) -> Result<(I, Vec<u8>)> {
        let mut inbox = self.inbox.lock().await;
        inbox
            .recv()
            .await
            .ok_or_else(|| Error::Transport("inbox closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_the_right_inbox() {
        let nets = InMemoryNetwork::build(vec!["alice".to_string(), "bob".to_string()]);
        let (alice, bob) = (nets[0].clone(), nets[1].clone());

        let mut body = Buffer::new();
        body.add_string("hi");
        alice.send(&"bob".to_string(), body).await.unwrap();

        let (from, bytes) = bob.recv().await.unwrap();
        assert_eq!(from, "alice");
        let mut cursor = crate::codec::Cursor::new(&bytes);
        assert_eq!(cursor.read_string().unwrap(), "hi");
    }
}
