//! The transport contract the engine's run loop is generic over: send
//! one framed message to a named peer, and receive the next one
//! addressed to us.

use crate::codec::Buffer;
use crate::error::Result;
use crate::peers::Identity;
use async_trait::async_trait;

/// A point-to-point channel mesh connecting every party in a run. Both
/// the in-memory test transport and the real TCP transport implement
/// this the same way: `send` is fire-and-forget from the caller's point
/// of view (the engine does not wait for delivery), `recv` blocks until
/// the next message addressed to this party arrives.
#[async_trait]
pub trait Mesh<I: Identity>: Send + Sync {
    async fn send(&self, to: &I, body: Buffer) -> Result<()>;
    async fn recv(&self) -> Result<(I, Vec<u8>)>;
}
