//! TCP envelope transport: length-prefixed frames over one outbound
//! connection per peer.
//!
//! Frame: u32 big-endian length, then that many bytes. The first frame on
//! every connection is the dialer's 32-byte peer id; every later frame is
//! one encoded envelope.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};

use meter_core::wire::MAX_ENVELOPE_SIZE;
use meter_core::{Envelope, PeerId};
use meter_services::{NetworkError, PaymentNetwork, Transport};

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one frame. `Ok(None)` on a clean close between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_ENVELOPE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds {MAX_ENVELOPE_SIZE}"),
        ));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

pub struct TcpTransport {
    local: PeerId,
    addrs: DashMap<PeerId, String>,
    conns: DashMap<PeerId, Arc<Mutex<OwnedWriteHalf>>>,
}

impl TcpTransport {
    pub fn new(local: PeerId, peers: impl IntoIterator<Item = (PeerId, String)>) -> Self {
        Self {
            local,
            addrs: peers.into_iter().collect(),
            conns: DashMap::new(),
        }
    }

    async fn connection(&self, peer: PeerId) -> io::Result<Arc<Mutex<OwnedWriteHalf>>> {
        if let Some(conn) = self.conns.get(&peer) {
            return Ok(conn.clone());
        }

        let addr = self
            .addrs
            .get(&peer)
            .map(|a| a.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address for peer {}", peer.short()),
                )
            })?;

        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        let (_, mut writer) = stream.into_split();
        write_frame(&mut writer, self.local.as_bytes()).await?;
        tracing::info!(peer = %peer.short(), %addr, "connected");

        let conn = Arc::new(Mutex::new(writer));
        self.conns.insert(peer, conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_envelope(&self, peer: PeerId, envelope: &Envelope) -> io::Result<()> {
        let conn = self.connection(peer).await?;
        let frame = envelope.encode_to_vec();
        let result = write_frame(&mut *conn.lock().await, &frame).await;
        if result.is_err() {
            // Redial on the next send.
            self.conns.remove(&peer);
        }
        result
    }
}

/// Accept inbound connections until shutdown, one reader task each.
pub async fn accept_loop(
    listener: TcpListener,
    network: Arc<PaymentNetwork<TcpTransport>>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("transport listener shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let network = network.clone();
                tokio::spawn(async move {
                    if let Err(e) = read_connection(stream, addr, network).await {
                        tracing::warn!(%addr, error = %e, "inbound connection closed");
                    }
                });
            }
        }
    }
}

async fn read_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    network: Arc<PaymentNetwork<TcpTransport>>,
) -> anyhow::Result<()> {
    let hello = read_frame(&mut stream)
        .await?
        .ok_or_else(|| anyhow::anyhow!("closed before peer id"))?;
    let peer = PeerId::from_slice(&hello)?;
    tracing::info!(peer = %peer.short(), %addr, "inbound connection");

    while let Some(frame) = read_frame(&mut stream).await? {
        match network.receive_frame(peer, &frame).await {
            Ok(envelope) => tracing::debug!(
                peer = %peer.short(),
                blocks = envelope.blocks.len() + envelope.payload.len(),
                wants = envelope.wants.len(),
                "envelope received"
            ),
            // A bad envelope is dropped; the connection stays up.
            Err(NetworkError::Wire(e)) => {
                tracing::warn!(peer = %peer.short(), error = %e, "undecodable envelope")
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::debug!(peer = %peer.short(), "inbound connection ended");
    Ok(())
}
