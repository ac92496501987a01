//! TCP transport for real multi-process runs, behind `real-world-infra`.
//! Framing is a `u64` big-endian length prefix around the same bytes
//! the engine already hands to a `Mesh::send`; the first framed message
//! on a fresh connection is the dialing side's identity.

use crate::codec::Buffer;
use crate::error::{Error, Result};
use crate::helpers::mesh::Mesh;
use crate::peers::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

async fn write_framed(half: &mut OwnedWriteHalf, bytes: &[u8]) -> Result<()> {
    let len = bytes.len() as u64;
    half.write_all(&len.to_be_bytes()).await?;
    half.write_all(bytes).await?;
    Ok(())
}

async fn read_framed(half: &mut OwnedReadHalf) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 8];
    half.read_exact(&mut len_buf).await?;
    let len = usize::try_from(u64::from_be_bytes(len_buf))
        .map_err(|_| Error::Transport("frame too large".into()))?;
    let mut body = vec![0u8; len];
    half.read_exact(&mut body).await?;
    Ok(body)
}

/// One TCP connection per peer. Each connection's read half is driven by
/// a background task that forwards framed messages into a shared inbox;
/// the write half is kept directly so `send` can write without a task
/// hop.
pub struct TcpNetwork<I: Identity> {
    outboxes: HashMap<I, Mutex<OwnedWriteHalf>>,
    inbox: Mutex<mpsc::UnboundedReceiver<(I, Vec<u8>)>>,
}

impl<I: Identity> TcpNetwork<I> {
    /// Dials every peer in `addresses` except `me`. Parties with a
    /// lexicographically smaller identity dial; the rest accept on
    /// `listener`, so every pair connects exactly once regardless of
    /// which side happens to be ready first.
    pub async fn connect(
        me: I,
        listener: TcpListener,
        addresses: HashMap<I, std::net::SocketAddr>,
    ) -> Result<Self> {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let mut outboxes = HashMap::new();

        let mut dial_first: Vec<&I> = addresses.keys().filter(|p| **p != me).collect();
        dial_first.sort();
        let expect_incoming = dial_first.iter().filter(|p| me < ***p).count();

        let mut hello = Buffer::new();
        me.write(&mut hello);

        for peer in dial_first {
            if me < *peer {
                let addr = addresses[peer];
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|e| Error::Transport(format!("connecting to {peer:?} at {addr}: {e}")))?;
                let (read_half, mut write_half) = stream.into_split();
                write_framed(&mut write_half, hello.as_slice()).await?;
                spawn_reader(peer.clone(), read_half, inbox_tx.clone());
                outboxes.insert(peer.clone(), Mutex::new(write_half));
            }
        }

        for _ in 0..expect_incoming {
            let (stream, _addr) = listener.accept().await?;
            let (mut read_half, mut write_half) = stream.into_split();
            // The peer's identity arrives as the first framed message.
            let hello_from_peer = read_framed(&mut read_half).await?;
            let peer = I::read(&mut crate::codec::Cursor::new(&hello_from_peer))?;
            write_framed(&mut write_half, hello.as_slice()).await?;
            spawn_reader(peer.clone(), read_half, inbox_tx.clone());
            outboxes.insert(peer, Mutex::new(write_half));
        }

        Ok(TcpNetwork {
            outboxes,
            inbox: Mutex::new(inbox_rx),
        })
    }
}

fn spawn_reader<I: Identity>(
    peer: I,
    mut read_half: OwnedReadHalf,
    inbox_tx: mpsc::UnboundedSender<(I, Vec<u8>)>,
) {
    tokio::spawn(async move {
        loop {
            match read_framed(&mut read_half).await {
                Ok(bytes) => {
                    if inbox_tx.send((peer.clone(), bytes)).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    tracing::warn!(?peer, "peer connection closed");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl<I: Identity> Mesh<I> for TcpNetwork<I> {
    async fn send(&self, to: &I, body: Buffer) -> Result<()> {
        let outbox = self
            .outboxes
            .get(to)
            .ok_or_else(|| Error::UnknownIdentity(format!("{to:?}")))?;
        let mut half = outbox.lock().await;
        write_framed(&mut half, body.as_slice()).await
    }

    async fn recv(&self) -> Result<(I, Vec<u8>)> {
        let mut inbox = self.inbox.lock().await;
        inbox
            .recv()
            .await
            .ok_or_else(|| Error::Transport("all peer connections closed".into()))
    }
}
