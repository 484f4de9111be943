//! Connectionless UDP transport
//!
//! Fire-and-forget delivery to a configurable destination list. Peers that
//! send us traffic are added as reply destinations on the conventional reply
//! port. Every send may be lost in flight; callers must not assume delivery.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NetworkConfig;
use crate::error::TransportError;
use crate::network::{
    new_counters, Inbound, Transport, TransportCounters, TransportKind, TransportStats,
    INBOUND_CHANNEL_CAPACITY,
};

/// UDP transport: one socket, many destinations
pub struct UdpTransport {
    config: NetworkConfig,
    destinations: Arc<RwLock<Vec<SocketAddr>>>,
    socket: Option<Arc<UdpSocket>>,
    incoming: Option<mpsc::Receiver<Inbound>>,
    recv_task: Option<JoinHandle<()>>,
    counters: Arc<TransportCounters>,
}

impl UdpTransport {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            destinations: Arc::new(RwLock::new(Vec::new())),
            socket: None,
            incoming: None,
            recv_task: None,
            counters: new_counters(),
        }
    }

    /// Add a delivery destination; duplicates are ignored
    pub fn add_destination(&self, addr: SocketAddr) {
        let mut destinations = self.destinations.write();
        if !destinations.contains(&addr) {
            destinations.push(addr);
        }
    }

    /// Replace the delivery destination list
    pub fn set_destinations(&self, addrs: Vec<SocketAddr>) {
        *self.destinations.write() = addrs;
    }

}

#[async_trait]
impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Connectionless
    }

    async fn start(&mut self) -> Result<(), TransportError> {
        let bind_addr = SocketAddr::new(self.config.bind_address, self.config.udp_port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {}", bind_addr, e)))?;
        let socket = Arc::new(socket);
        tracing::info!(addr = %bind_addr, "udp transport bound");

        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.incoming = Some(rx);

        let recv_socket = socket.clone();
        let counters = self.counters.clone();
        let destinations = self.destinations.clone();
        let max_packet = self.config.max_packet_size;
        let reply_port = self.config.udp_reply_port;
        self.recv_task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; max_packet];
            loop {
                match recv_socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        counters.record_received(len);

                        // Learn where replies go: the sender's host on the
                        // conventional reply port
                        let reply = SocketAddr::new(from.ip(), reply_port);
                        if !destinations.read().contains(&reply) {
                            destinations.write().push(reply);
                            tracing::debug!(addr = %reply, "reply destination learned");
                        }
                        let inbound = Inbound {
                            data: Bytes::copy_from_slice(&buf[..len]),
                            from,
                        };
                        // A full channel means the consumer is behind; drop
                        // the datagram, that is what UDP promised anyway.
                        if tx.try_send(inbound).is_err() {
                            tracing::debug!("inbound channel full, datagram dropped");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "udp receive failed");
                    }
                }
            }
        }));

        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&self, packet: Bytes) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotStarted)?;
        if packet.len() > self.config.max_packet_size {
            return Err(TransportError::PacketTooLarge(packet.len()));
        }

        let destinations = self.destinations.read().clone();
        let mut first_error = None;
        for dest in destinations {
            match socket.send_to(&packet, dest).await {
                Ok(len) => self.counters.record_sent(len),
                Err(e) => {
                    self.counters.record_send_failure();
                    tracing::debug!(dest = %dest, error = %e, "udp send failed");
                    first_error.get_or_insert(TransportError::SendFailed(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Inbound>> {
        self.incoming.take()
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.socket = None;
        self.incoming = None;
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn stats(&self) -> TransportStats {
        self.counters.snapshot()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn localhost_config(port: u16) -> NetworkConfig {
        NetworkConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            udp_port: port,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_and_receive_loopback() {
        // Port 0 lets the OS pick; receiver's real port becomes the target
        let mut receiver = UdpTransport::new(localhost_config(0));
        receiver.start().await.unwrap();
        let recv_addr = receiver.local_addr().unwrap();
        let mut incoming = receiver.take_incoming().unwrap();

        let mut sender = UdpTransport::new(localhost_config(0));
        sender.start().await.unwrap();
        sender.add_destination(recv_addr);

        sender.send(Bytes::from_static(b"datagram")).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), incoming.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(inbound.data.as_ref(), b"datagram");

        assert_eq!(sender.stats().packets_sent, 1);
        assert_eq!(receiver.stats().packets_received, 1);

        sender.shutdown().await;
        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_reply_destination_learned_from_inbound() {
        // The head unit listens for backend replies on its reply port
        let mut reply_listener = UdpTransport::new(localhost_config(0));
        reply_listener.start().await.unwrap();
        let reply_port = reply_listener.local_addr().unwrap().port();
        let mut replies = reply_listener.take_incoming().unwrap();

        let mut backend_config = localhost_config(0);
        backend_config.udp_reply_port = reply_port;
        let mut backend = UdpTransport::new(backend_config);
        backend.start().await.unwrap();
        let backend_addr = backend.local_addr().unwrap();
        let mut backend_incoming = backend.take_incoming().unwrap();

        let mut head_unit = UdpTransport::new(localhost_config(0));
        head_unit.start().await.unwrap();
        head_unit.add_destination(backend_addr);
        head_unit.send(Bytes::from_static(b"uplink")).await.unwrap();

        // Once the uplink arrives, the backend knows where replies go
        tokio::time::timeout(Duration::from_secs(2), backend_incoming.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        backend.send(Bytes::from_static(b"reply")).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(2), replies.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(inbound.data.as_ref(), b"reply");

        head_unit.shutdown().await;
        backend.shutdown().await;
        reply_listener.shutdown().await;
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let transport = UdpTransport::new(localhost_config(0));
        let err = transport.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, TransportError::NotStarted));
    }

    #[tokio::test]
    async fn test_oversized_packet_rejected() {
        let mut transport = UdpTransport::new(localhost_config(0));
        transport.start().await.unwrap();
        let oversized = Bytes::from(vec![0u8; 64 * 1024]);
        let err = transport.send(oversized).await.unwrap_err();
        assert!(matches!(err, TransportError::PacketTooLarge(_)));
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let mut first = UdpTransport::new(localhost_config(0));
        first.start().await.unwrap();
        let taken_port = first.local_addr().unwrap().port();

        let mut second = UdpTransport::new(localhost_config(taken_port));
        let err = second.start().await.unwrap_err();
        assert!(matches!(err, TransportError::BindFailed(_)));
        first.shutdown().await;
    }
}
