//! Drives three `DsrNode`s over real loopback UDP sockets, exercising route
//! discovery and forwarding end to end instead of through the in-memory
//! direct-dispatch double used by the unit tests in `src/dsr.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hopwire_node::dsr::{DsrNode, NodeLink, NullLogger};
use hopwire_node::routing_log_ledger::RoutingLogLedger;
use hopwire_transport::UdpTransport;

struct UdpLink {
    transport: Arc<UdpTransport>,
}

impl NodeLink for UdpLink {
    fn send(&self, dest: u8, bytes: &[u8]) {
        let _ = self.transport.send_to(dest, bytes);
    }
}

fn spawn_node(id: u8, neighbors: Vec<u8>) -> (Arc<DsrNode>, Arc<UdpTransport>, Arc<AtomicBool>, std::thread::JoinHandle<()>) {
    let transport = Arc::new(UdpTransport::bind(id, 0).expect("bind should succeed on a free test port"));
    let link: Arc<dyn NodeLink> = Arc::new(UdpLink { transport: transport.clone() });
    let node = Arc::new(DsrNode::new(
        id,
        neighbors,
        50,
        Arc::new(RoutingLogLedger::new()),
        link,
        Arc::new(NullLogger),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let recv_transport = transport.clone();
    let recv_node = node.clone();
    let recv_stop = stop.clone();
    let handle = std::thread::spawn(move || {
        while !recv_stop.load(Ordering::SeqCst) {
            if let Ok(Some(bytes)) = recv_transport.recv() {
                if bytes.is_empty() {
                    continue;
                }
                recv_node.handle_inbound_bytes(&bytes);
            }
        }
    });

    (node, transport, stop, handle)
}

#[test]
fn three_node_chain_discovers_and_delivers_over_real_sockets() {
    // Node ids chosen in a high, test-reserved range so repeated test runs
    // in the same process don't collide with other suites' fixed ports.
    const A: u8 = 220;
    const B: u8 = 221;
    const C: u8 = 222;

    let (node_a, _t_a, stop_a, h_a) = spawn_node(A, vec![B]);
    let (node_b, _t_b, stop_b, h_b) = spawn_node(B, vec![A, C]);
    let (node_c, _t_c, stop_c, h_c) = spawn_node(C, vec![B]);

    node_a.send_data(C, b"hello mesh".to_vec());

    let mut discovered = false;
    for _ in 0..200 {
        if node_a.route_cache().get_route(C as u8).is_some() {
            discovered = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(discovered, "node A should discover a route to node C within the timeout");
    assert_eq!(node_a.route_cache().get_route(C).unwrap(), vec![A, B, C]);

    let mut delivered = false;
    for _ in 0..200 {
        let (_, received, ..) = node_c.stats.snapshot();
        if received >= 1 {
            delivered = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(delivered, "node C should receive the originated payload within the timeout");

    stop_a.store(true, Ordering::SeqCst);
    stop_b.store(true, Ordering::SeqCst);
    stop_c.store(true, Ordering::SeqCst);
    let _ = node_a;
    let _ = node_b;
    // wake each receive thread with a harmless empty datagram to itself is
    // unnecessary here since the read timeout on the socket already bounds
    // how long the loop blocks before observing the stop flag.
    let _ = h_a.join();
    let _ = h_b.join();
    let _ = h_c.join();
}
