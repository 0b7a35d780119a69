use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use hopwire_core::NodeId;
use rand::Rng;
use thiserror::Error;

/// Base port for a node's receive socket; node `i` binds `RX_BASE + i`.
/// Peers are addressed at the destination's receive port, `RX_BASE + peer_id`.
pub const RX_BASE: u16 = 8000;
/// Base port for a node's transmit socket; node `i` binds `TX_BASE + i`.
pub const TX_BASE: u16 = 9000;

const LOOPBACK: &str = "127.0.0.1";

/// Errors returned by the loopback UDP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind socket on {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("send failed: {0}")]
    Send(std::io::Error),
    #[error("recv failed: {0}")]
    Recv(std::io::Error),
}

/// Maximum datagram size accepted on receive; large enough for any packet
/// this protocol produces (max hop count 50 plus a generous payload).
const MAX_DATAGRAM_LEN: usize = 4096;

/// Two-socket loopback UDP transport for one node: a receive socket bound
/// on `RX_BASE + node_id` and a transmit socket bound on `TX_BASE + node_id`.
/// Simulates a lossy link by dropping outbound sends with configurable
/// probability.
pub struct UdpTransport {
    node_id: NodeId,
    rx_socket: UdpSocket,
    tx_socket: UdpSocket,
    loss_percentage: u8,
}

impl UdpTransport {
    pub fn bind(node_id: NodeId, loss_percentage: u8) -> Result<Self, TransportError> {
        let rx_addr: SocketAddr = format!("{LOOPBACK}:{}", RX_BASE + node_id as u16)
            .parse()
            .expect("static loopback address is always valid");
        let tx_addr: SocketAddr = format!("{LOOPBACK}:{}", TX_BASE + node_id as u16)
            .parse()
            .expect("static loopback address is always valid");

        let rx_socket = UdpSocket::bind(rx_addr).map_err(|e| TransportError::Bind(rx_addr, e))?;
        let tx_socket = UdpSocket::bind(tx_addr).map_err(|e| TransportError::Bind(tx_addr, e))?;
        rx_socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .map_err(|e| TransportError::Bind(rx_addr, e))?;

        Ok(Self {
            node_id,
            rx_socket,
            tx_socket,
            loss_percentage: loss_percentage.min(100),
        })
    }

    /// Address a peer's receive socket is bound to.
    fn peer_rx_addr(peer_id: NodeId) -> SocketAddr {
        format!("{LOOPBACK}:{}", RX_BASE + peer_id as u16)
            .parse()
            .expect("static loopback address is always valid")
    }

    /// Sends `bytes` to `peer_id`'s receive socket, dropping the send per
    /// the configured loss probability. A simulated drop is reported as a
    /// successful send: the caller cannot distinguish a dropped link from
    /// a slow one, mirroring a real lossy wireless link.
    pub fn send_to(&self, peer_id: NodeId, bytes: &[u8]) -> Result<(), TransportError> {
        if self.loss_percentage > 0 && rand::thread_rng().gen_range(0..100) < self.loss_percentage {
            return Ok(());
        }
        self.tx_socket
            .send_to(bytes, Self::peer_rx_addr(peer_id))
            .map_err(TransportError::Send)?;
        Ok(())
    }

    /// Blocks (up to the read timeout) for the next inbound datagram.
    /// Returns `Ok(None)` on a read timeout, so callers can poll a stop
    /// flag between attempts.
    pub fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match self.rx_socket.recv(&mut buf) {
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Recv(e)),
        }
    }

    /// Sends an empty sentinel datagram to this node's own receive socket,
    /// unblocking a thread parked in `recv`.
    pub fn wake_self(&self) -> Result<(), TransportError> {
        let self_addr = format!("{LOOPBACK}:{}", RX_BASE + self.node_id as u16)
            .parse()
            .expect("static loopback address is always valid");
        self.tx_socket
            .send_to(&[], self_addr)
            .map_err(TransportError::Send)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_sockets_round_trip_a_datagram() {
        let a = UdpTransport::bind(201, 0).expect("bind node 201");
        let b = UdpTransport::bind(202, 0).expect("bind node 202");

        a.send_to(202, b"hello").expect("send should succeed");
        let received = b.recv().expect("recv should not error");
        assert_eq!(received, Some(b"hello".to_vec()));
    }

    #[test]
    fn recv_times_out_with_no_traffic() {
        let node = UdpTransport::bind(203, 0).expect("bind node 203");
        assert_eq!(node.recv().expect("recv should not error"), None);
    }

    #[test]
    fn full_loss_percentage_drops_every_send() {
        let a = UdpTransport::bind(204, 100).expect("bind node 204");
        let b = UdpTransport::bind(205, 0).expect("bind node 205");

        a.send_to(205, b"dropped").expect("send should report success even when dropped");
        assert_eq!(b.recv().expect("recv should not error"), None);
    }

    #[test]
    fn wake_self_unblocks_a_pending_recv() {
        let node = UdpTransport::bind(206, 0).expect("bind node 206");
        node.wake_self().expect("wake should succeed");
        let received = node.recv().expect("recv should not error");
        assert_eq!(received, Some(Vec::new()));
    }
}
