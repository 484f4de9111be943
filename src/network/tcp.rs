//! Connection-oriented TCP transport
//!
//! A listener plus a live set of connected peers. `send` fans out to every
//! open connection; a failed write evicts that peer. Streams carry the same
//! framed packets as datagrams, so the reader re-frames on the packet header
//! (magic + declared lengths) and drops a peer that desyncs.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::error::TransportError;
use crate::network::{
    new_counters, Inbound, Transport, TransportCounters, TransportKind, TransportStats,
    INBOUND_CHANNEL_CAPACITY,
};
use crate::protocol::{self, BASE_HEADER_LEN, ENHANCED_HEADER_LEN, PROTOCOL_MAGIC};

/// Per-peer outbound queue depth; a peer this far behind starts losing frames
const PEER_QUEUE_CAPACITY: usize = 256;

/// TCP transport: listener, peer set, fan-out send
pub struct TcpTransport {
    config: NetworkConfig,
    peers: Arc<DashMap<SocketAddr, mpsc::Sender<Bytes>>>,
    inbound_tx: mpsc::Sender<Inbound>,
    incoming: Option<mpsc::Receiver<Inbound>>,
    accept_task: Option<JoinHandle<()>>,
    conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    local_addr: Option<SocketAddr>,
    counters: Arc<TransportCounters>,
}

impl TcpTransport {
    pub fn new(config: NetworkConfig) -> Self {
        let (inbound_tx, incoming) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            config,
            peers: Arc::new(DashMap::new()),
            inbound_tx,
            incoming: Some(incoming),
            accept_task: None,
            conn_tasks: Arc::new(Mutex::new(Vec::new())),
            local_addr: None,
            counters: new_counters(),
        }
    }

    /// Number of currently connected peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Dial out to a remote listener and adopt it as a peer
    ///
    /// Lets the head-unit side use the same transport type without running
    /// its own listener.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::SendFailed(format!("connect {}: {}", addr, e)))?;
        Self::adopt_stream(
            stream,
            addr,
            self.config.keepalive_secs,
            self.peers.clone(),
            self.inbound_tx.clone(),
            self.conn_tasks.clone(),
            self.counters.clone(),
        );
        Ok(())
    }

    fn adopt_stream(
        stream: TcpStream,
        peer: SocketAddr,
        keepalive_secs: u64,
        peers: Arc<DashMap<SocketAddr, mpsc::Sender<Bytes>>>,
        inbound_tx: mpsc::Sender<Inbound>,
        conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
        counters: Arc<TransportCounters>,
    ) {
        // Small audio frames must not sit in Nagle's queue, and dead peers
        // should be noticed without traffic.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(peer = %peer, error = %e, "failed to set nodelay");
        }
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(keepalive_secs))
            .with_interval(Duration::from_secs(keepalive_secs));
        if let Err(e) = socket2::SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
            tracing::warn!(peer = %peer, error = %e, "failed to set keepalive");
        }

        let (mut read_half, mut write_half) = stream.into_split();
        let (peer_tx, mut peer_rx) = mpsc::channel::<Bytes>(PEER_QUEUE_CAPACITY);
        peers.insert(peer, peer_tx);
        tracing::info!(peer = %peer, "tcp peer connected");

        let writer_peers = peers.clone();
        let writer_counters = counters.clone();
        let writer = tokio::spawn(async move {
            while let Some(packet) = peer_rx.recv().await {
                if let Err(e) = write_half.write_all(&packet).await {
                    tracing::info!(peer = %peer, error = %e, "tcp write failed, evicting peer");
                    writer_counters.record_send_failure();
                    break;
                }
                writer_counters.record_sent(packet.len());
            }
            writer_peers.remove(&peer);
        });

        let reader_peers = peers.clone();
        let reader = tokio::spawn(async move {
            loop {
                match read_framed_packet(&mut read_half).await {
                    Ok(packet) => {
                        counters.record_received(packet.len());
                        let inbound = Inbound { data: packet, from: peer };
                        if inbound_tx.try_send(inbound).is_err() {
                            tracing::debug!(peer = %peer, "inbound channel full, packet dropped");
                        }
                    }
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "tcp read ended");
                        break;
                    }
                }
            }
            // Dropping the peer entry closes the writer queue as well
            reader_peers.remove(&peer);
        });

        let mut tasks = conn_tasks.lock();
        tasks.push(writer);
        tasks.push(reader);
    }
}

/// Read one framed packet off the stream
///
/// The packet header declares everything needed: magic for sanity, flags for
/// header length, `payload_len` for the rest. A bad magic means the stream
/// is desynced beyond repair; the caller drops the connection.
async fn read_framed_packet(
    read_half: &mut (impl AsyncReadExt + Unpin),
) -> std::io::Result<Bytes> {
    let mut header = [0u8; BASE_HEADER_LEN];
    read_half.read_exact(&mut header).await?;

    let magic = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if magic != PROTOCOL_MAGIC {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "stream desynced: bad packet magic",
        ));
    }

    let payload_len = u16::from_be_bytes([header[12], header[13]]) as usize;
    let extension_len = if protocol::packet::flags_extended(header[14]) {
        ENHANCED_HEADER_LEN - BASE_HEADER_LEN
    } else {
        0
    };

    let mut packet = BytesMut::with_capacity(BASE_HEADER_LEN + extension_len + payload_len);
    packet.extend_from_slice(&header);
    packet.resize(BASE_HEADER_LEN + extension_len + payload_len, 0);
    read_half.read_exact(&mut packet[BASE_HEADER_LEN..]).await?;

    Ok(packet.freeze())
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ConnectionOriented
    }

    async fn start(&mut self) -> Result<(), TransportError> {
        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.tcp_port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", bind_addr, e)))?;
        self.local_addr = listener.local_addr().ok();
        tracing::info!(addr = ?self.local_addr, "tcp transport listening");

        let peers = self.peers.clone();
        let inbound_tx = self.inbound_tx.clone();
        let conn_tasks = self.conn_tasks.clone();
        let counters = self.counters.clone();
        let keepalive_secs = self.config.keepalive_secs;
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        Self::adopt_stream(
                            stream,
                            peer,
                            keepalive_secs,
                            peers.clone(),
                            inbound_tx.clone(),
                            conn_tasks.clone(),
                            counters.clone(),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "tcp accept failed");
                    }
                }
            }
        }));

        Ok(())
    }

    async fn send(&self, packet: Bytes) -> Result<(), TransportError> {
        if self.peers.is_empty() {
            return Ok(());
        }

        let mut broken = Vec::new();
        for entry in self.peers.iter() {
            match entry.value().try_send(packet.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow peer: this frame is lost for them, the peer stays
                    self.counters.record_send_failure();
                    tracing::debug!(peer = %entry.key(), "peer queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    broken.push(*entry.key());
                }
            }
        }

        for peer in broken {
            self.peers.remove(&peer);
            self.counters.record_send_failure();
            tracing::info!(peer = %peer, "removed broken peer");
        }

        Ok(())
    }

    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Inbound>> {
        self.incoming.take()
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for task in self.conn_tasks.lock().drain(..) {
            task.abort();
        }
        self.peers.clear();
        self.local_addr = None;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for task in self.conn_tasks.lock().drain(..) {
            task.abort();
        }
    }
}
