//! Transport backends for framed audio packets
//!
//! Two interchangeable backends behind one trait: a connectionless UDP
//! fan-out and a connection-oriented TCP listener with a live peer set.
//! Per-packet errors are absorbed into statistics; only bind/listen failures
//! at startup are fatal.

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One validated-length inbound packet plus sender metadata
#[derive(Debug, Clone)]
pub struct Inbound {
    pub data: Bytes,
    pub from: SocketAddr,
}

/// Transport flavor; drives the session's retransmission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Fire-and-forget datagrams; loss is terminal
    Connectionless,
    /// Per-client multiplexed stream; gaps may be re-requested
    ConnectionOriented,
}

/// A transport moving framed packets in both directions
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Bind/listen. Failure here is fatal for the session.
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Send one framed packet to every configured destination/peer.
    ///
    /// A failure is recoverable: the caller counts it as loss and continues.
    async fn send(&self, packet: Bytes) -> Result<(), TransportError>;

    /// Take the inbound packet stream; yields once, on first call.
    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Inbound>>;

    /// Release sockets and stop all background tasks.
    async fn shutdown(&mut self);

    /// Bound local address once started
    fn local_addr(&self) -> Option<SocketAddr>;

    fn stats(&self) -> TransportStats;
}

/// Shared send/receive counters, updated from transport tasks
#[derive(Debug, Default)]
pub(crate) struct TransportCounters {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub send_failures: AtomicU64,
}

impl TransportCounters {
    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Transport statistics snapshot
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub send_failures: u64,
}

/// Capacity of the inbound packet channel; arrivals beyond it are dropped
/// rather than growing memory, matching the bounded jitter buffer.
pub(crate) const INBOUND_CHANNEL_CAPACITY: usize = 1024;

pub(crate) fn new_counters() -> Arc<TransportCounters> {
    Arc::new(TransportCounters::default())
}
