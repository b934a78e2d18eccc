//! A full mesh of TCP connections between all ranks of a run.
//!
//! Rank `r` listens on `addr:(base_port + r)`. Every rank connects to all lower ranks and accepts
//! connections from all higher ranks. Messages are framed by a [`LengthDelimitedCodec`] (4-byte
//! big-endian length prefix), and the first frame on every connection carries the rank of the
//! party that opened it.

use std::{net::IpAddr, time::Duration};

use anyhow::{Context, bail};
use beaver_cmp::channel::Channel;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
    time::{sleep, timeout},
};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, trace, warn};

/// How often a rank tries to reach a lower rank that is not listening yet.
const CONNECT_ATTEMPTS: u32 = 60;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);
const RECV_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Frames longer than this are rejected instead of allocated.
const MAX_FRAME_LEN: usize = 64 << 20;

type ReadChannel = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;
type WriteChannel = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

#[derive(Debug)]
struct Peer {
    reader: Mutex<ReadChannel>,
    writer: Mutex<WriteChannel>,
}

impl Peer {
    fn new(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_LEN)
            .new_codec();
        Ok(Self {
            reader: Mutex::new(FramedRead::new(reader, codec.clone())),
            writer: Mutex::new(FramedWrite::new(writer, codec)),
        })
    }

    async fn send(&self, msg: Bytes) -> anyhow::Result<()> {
        self.writer.lock().await.send(msg).await?;
        Ok(())
    }

    /// Waits for the next frame. Cancelling the wait keeps partially read frames buffered.
    async fn recv(&self) -> anyhow::Result<Vec<u8>> {
        match self.reader.lock().await.next().await {
            Some(frame) => Ok(frame?.to_vec()),
            None => bail!("connection closed"),
        }
    }
}

/// A [`Channel`] backed by one TCP connection per pair of ranks.
#[derive(Debug)]
pub struct TcpChannel {
    rank: usize,
    peers: Vec<Option<Peer>>,
}

impl TcpChannel {
    /// Connects `rank` to all other ranks of a run with `world_size` ranks.
    ///
    /// Returns once a connection to every other rank is established.
    pub async fn connect(
        rank: usize,
        world_size: usize,
        addr: IpAddr,
        base_port: u16,
    ) -> anyhow::Result<Self> {
        if rank >= world_size {
            bail!("rank {rank} is outside of a world of size {world_size}");
        }
        let port = |r: usize| {
            u16::try_from(r)
                .ok()
                .and_then(|r| base_port.checked_add(r))
                .with_context(|| format!("no port for rank {r} above base port {base_port}"))
        };
        let own_port = port(rank)?;
        let listener = TcpListener::bind((addr, own_port))
            .await
            .with_context(|| format!("could not listen on {addr}:{own_port}"))?;
        let mut peers: Vec<Option<Peer>> = (0..world_size).map(|_| None).collect();

        for other in 0..rank {
            let peer = Peer::new(connect_with_retry(addr, port(other)?).await?)?;
            let handshake = u32::try_from(rank)?.to_be_bytes();
            peer.send(Bytes::copy_from_slice(&handshake)).await?;
            peers[other] = Some(peer);
            debug!("Connected to rank {other}");
        }
        for _ in (rank + 1)..world_size {
            let (stream, remote) = listener.accept().await?;
            let peer = Peer::new(stream)?;
            let handshake = peer.recv().await?;
            let other = match <[u8; 4]>::try_from(handshake.as_slice()) {
                Ok(bytes) => u32::from_be_bytes(bytes) as usize,
                Err(_) => bail!("malformed handshake of {} bytes from {remote}", handshake.len()),
            };
            if other <= rank || other >= world_size || peers[other].is_some() {
                bail!("unexpected handshake from {remote}, claiming to be rank {other}");
            }
            peers[other] = Some(peer);
            debug!("Accepted rank {other} from {remote}");
        }
        Ok(Self { rank, peers })
    }

    fn peer(&self, p: usize) -> anyhow::Result<&Peer> {
        self.peers
            .get(p)
            .and_then(Option::as_ref)
            .with_context(|| format!("rank {} has no connection to rank {p}", self.rank))
    }
}

async fn connect_with_retry(addr: IpAddr, port: u16) -> anyhow::Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect((addr, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                if attempt % 10 == 0 {
                    warn!("Still waiting for {addr}:{port} after {attempt} attempts: {e}");
                }
                attempt += 1;
                sleep(CONNECT_BACKOFF).await;
            }
            Err(e) => return Err(e).with_context(|| format!("could not connect to {addr}:{port}")),
        }
    }
}

impl Channel for TcpChannel {
    type SendError = anyhow::Error;
    type RecvError = anyhow::Error;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>, phase: &str) -> anyhow::Result<()> {
        let peer = self.peer(p)?;
        trace!("{} -> {p}: {phase} ({} bytes)", self.rank, msg.len());
        peer.send(Bytes::from(msg)).await
    }

    async fn recv_bytes_from(&self, p: usize, phase: &str) -> anyhow::Result<Vec<u8>> {
        let peer = self.peer(p)?;
        let msg = timeout(RECV_TIMEOUT, peer.recv())
            .await
            .with_context(|| format!("no message from rank {p} during {phase}"))??;
        trace!("{} <- {p}: {phase} ({} bytes)", self.rank, msg.len());
        Ok(msg)
    }
}
