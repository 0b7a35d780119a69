use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hopwire_core::{NodeId, GENESIS_NODE_ID};
use hopwire_transport::UdpTransport;
use tracing::{error, info, warn};

use crate::admission_ledger::AdmissionLedger;
use crate::config::NodeConfig;
use crate::dsr::{DsrNode, NodeLink, PacketLogger};
use crate::event::{run_pump, EventQueues};
use crate::persistence::{self, FilePacketLogger};
use crate::routing_log_ledger::RoutingLogLedger;

/// Adapts a bound `UdpTransport` to the `NodeLink` contract the DSR layer
/// sends bytes through.
struct UdpLink {
    transport: Arc<UdpTransport>,
}

impl NodeLink for UdpLink {
    fn send(&self, dest: NodeId, bytes: &[u8]) {
        if let Err(err) = self.transport.send_to(dest, bytes) {
            warn!(%dest, %err, "failed to send datagram");
        }
    }
}

/// Placeholder signing/encryption key material: the admission ledger
/// treats these as opaque bytes, so a node only needs stable, unique ones.
fn generate_key_material(node_id: NodeId) -> (Vec<u8>, Vec<u8>) {
    let mut signing = vec![0u8; 32];
    let mut encryption = vec![0u8; 32];
    hopwire_core::csprng::fill_random(&mut signing);
    hopwire_core::csprng::fill_random(&mut encryption);
    signing[0] = node_id;
    encryption[0] = node_id;
    (signing, encryption)
}

/// Owns the admission/routing-log ledgers, the DSR state machine, the
/// transport, and the background receive/scheduler threads for one node.
pub struct NodeRuntime {
    pub dsr: Arc<DsrNode>,
    pub config: NodeConfig,
    pub admission_ledger: Arc<AdmissionLedger>,
    pub routing_log: Arc<RoutingLogLedger>,
    transport: Arc<UdpTransport>,
    stop: Arc<AtomicBool>,
}

impl NodeRuntime {
    /// Builds a node's runtime, binding its sockets, bootstrapping its
    /// local admission ledger, and loading its neighbor list.
    pub fn bootstrap(node_id: NodeId, neighbor_file: impl AsRef<std::path::Path>, config: NodeConfig) -> Self {
        let neighbors = persistence::load_neighbors(neighbor_file)
            .unwrap_or_else(|err| {
                warn!(%err, "failed to load neighbor file, starting with no neighbors");
                Vec::new()
            });

        let transport = Arc::new(
            UdpTransport::bind(node_id, config.loss_percentage).expect("failed to bind node sockets"),
        );

        let admission_ledger = Arc::new(AdmissionLedger::new());
        let (pk_sign, pk_encrypt) = generate_key_material(node_id);
        if node_id == GENESIS_NODE_ID {
            if let Err(err) = admission_ledger.create_genesis(
                node_id,
                &pk_sign,
                &pk_encrypt,
                config.pow_max_workers,
                config.pow_max_attempts,
            ) {
                error!(%err, "genesis admission failed");
            }
        } else {
            match admission_ledger.add_node(node_id, &pk_sign, &pk_encrypt) {
                Ok(challenge) => {
                    match crate::pow::solve(challenge, config.pow_max_workers, config.pow_max_attempts) {
                        Ok(nonce) => {
                            if let Err(err) = admission_ledger.finalize_node(&challenge, nonce) {
                                error!(%err, "admission finalize failed");
                            } else {
                                info!(node_id, digest = %hex::encode(challenge.challenge), "admitted");
                            }
                        }
                        Err(err) => error!(%err, "proof-of-work solve failed during bootstrap"),
                    }
                }
                Err(err) => error!(%err, "admission challenge request failed"),
            }
        }

        let routing_log = Arc::new(RoutingLogLedger::new());
        let node_dir = std::path::Path::new(&config.data_dir).join(format!("node_{node_id}"));
        let logger: Arc<dyn PacketLogger> = Arc::new(FilePacketLogger::new(&node_dir));
        let link: Arc<dyn NodeLink> = Arc::new(UdpLink { transport: transport.clone() });

        let dsr = Arc::new(DsrNode::new(
            node_id,
            neighbors,
            config.max_hop_count,
            routing_log.clone(),
            link,
            logger,
        ));

        Self {
            dsr,
            config,
            admission_ledger,
            routing_log,
            transport,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the receive thread and the scheduler pump thread, and blocks
    /// the caller until `shutdown` is invoked from another thread.
    pub fn run(&self) {
        let queues = Arc::new(EventQueues::new());
        self.dsr.set_queues(queues.clone());
        let stop = self.stop.clone();
        let transport = self.transport.clone();
        let dsr = self.dsr.clone();
        let recv_queues = queues.clone();
        let recv_stop = stop.clone();

        let receive_handle = std::thread::spawn(move || {
            while !recv_stop.load(Ordering::SeqCst) {
                match transport.recv() {
                    Ok(Some(bytes)) if !bytes.is_empty() => {
                        let dsr = dsr.clone();
                        recv_queues.push(
                            crate::event::EventKind::PacketIncoming,
                            Box::new(move || dsr.handle_inbound_bytes(&bytes)),
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "receive error"),
                }
            }
        });

        let ack_timeout = self.config.ack_timeout();
        let max_retries = self.config.max_ack_retries;
        let dsr = self.dsr.clone();
        run_pump(
            &queues,
            &self.stop,
            move || dsr.check_ack_timeouts(ack_timeout, max_retries),
            Duration::from_millis(10),
        );

        let _ = receive_handle.join();
    }

    /// Signals the receive and scheduler loops to stop and unblocks the
    /// receive thread with a sentinel datagram.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(err) = self.transport.wake_self() {
            warn!(%err, "failed to wake receive thread during shutdown");
        }
    }

    /// Flushes ledgers and writes final stats/route-cache snapshots to disk.
    pub fn flush_to_disk(&self) {
        self.routing_log.flush_block();
        let node_dir = std::path::Path::new(&self.config.data_dir).join(format!("node_{}", self.dsr.self_id));
        if let Err(err) = persistence::snapshot_node_state(&node_dir, &self.dsr.stats, self.dsr.route_cache()) {
            warn!(%err, "failed to snapshot node state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_genesis_node_mines_its_own_admission_block() {
        let dir = tempfile::tempdir().unwrap();
        let neighbor_file = dir.path().join("AccessTable.txt");
        std::fs::write(&neighbor_file, "").unwrap();

        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_string_lossy().to_string();
        config.pow_max_attempts = 2_000_000;

        let runtime = NodeRuntime::bootstrap(0, &neighbor_file, config);
        assert_eq!(runtime.admission_ledger.chain_len(), 1);
    }
}
