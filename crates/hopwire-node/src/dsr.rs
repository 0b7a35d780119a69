use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hopwire_codec::{deserialize_packet, serialize_packet, Packet, ReceiptAction};
use hopwire_core::{next_hop_after, prev_hop_before, NodeId, PacketType, Route};
use thiserror::Error;

use crate::event::{EventKind, EventQueues};
use crate::pending_ack::{PendingAckTable, TimeoutAction};
use crate::route_cache::RouteCache;
use crate::routing_log_ledger::RoutingLogLedger;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DsrError {
    #[error("no next hop found for self along this route")]
    NoNextHop,
    #[error("no cached route to destination")]
    NoRoute,
    #[error("route exhausted before reaching destination")]
    BrokenRoute,
    #[error("hop count exceeds the configured maximum")]
    TtlExceeded,
}

/// Sends raw bytes to a neighboring node's receive endpoint. Implemented by
/// the real UDP transport and by an in-memory double for tests.
pub trait NodeLink: Send + Sync {
    fn send(&self, dest: NodeId, bytes: &[u8]);
}

/// Sink for the plaintext packet-activity log (`PacketLog.txt`).
pub trait PacketLogger: Send + Sync {
    fn log(&self, line: &str);
}

pub struct NullLogger;
impl PacketLogger for NullLogger {
    fn log(&self, _line: &str) {}
}

#[derive(Default)]
pub struct Stats {
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub packets_forwarded: AtomicU64,
    pub packets_dropped: AtomicU64,
}

impl Stats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.packets_sent.load(Ordering::Relaxed),
            self.packets_received.load(Ordering::Relaxed),
            self.packets_forwarded.load(Ordering::Relaxed),
            self.packets_dropped.load(Ordering::Relaxed),
        )
    }
}

fn now_secs_u32() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as u32
}

/// Drives the on-demand source-routing protocol for one node: discovery,
/// forwarding, hop-by-hop acknowledgement, and link-failure handling.
pub struct DsrNode {
    pub self_id: NodeId,
    neighbors: Vec<NodeId>,
    max_hop_count: u8,
    route_cache: Arc<RouteCache>,
    pending_acks: PendingAckTable,
    routing_log: Arc<RoutingLogLedger>,
    link: Arc<dyn NodeLink>,
    logger: Arc<dyn PacketLogger>,
    next_sequence: AtomicU32,
    /// Forwarding and route-cache-update work are scheduled onto these
    /// queues once set, instead of running inline; unset by default so
    /// the in-process test double below can drive a node synchronously.
    queues: RwLock<Option<Arc<EventQueues>>>,
    pub stats: Stats,
}

impl DsrNode {
    pub fn new(
        self_id: NodeId,
        neighbors: Vec<NodeId>,
        max_hop_count: u8,
        routing_log: Arc<RoutingLogLedger>,
        link: Arc<dyn NodeLink>,
        logger: Arc<dyn PacketLogger>,
    ) -> Self {
        Self {
            self_id,
            neighbors,
            max_hop_count,
            route_cache: Arc::new(RouteCache::new()),
            pending_acks: PendingAckTable::new(),
            routing_log,
            link,
            logger,
            next_sequence: AtomicU32::new(1),
            queues: RwLock::new(None),
            stats: Stats::default(),
        }
    }

    /// Wires the node's forwarding (`PacketOutgoing`) and route-cache-update
    /// (`RouteCacheUpdate`) work through the given queues, so a scheduler
    /// pump drains them separately from locally-destined packet handling
    /// instead of running them inline on the calling thread.
    pub fn set_queues(&self, queues: Arc<EventQueues>) {
        *self.queues.write().expect("event queue handle lock poisoned") = Some(queues);
    }

    fn queues(&self) -> Option<Arc<EventQueues>> {
        self.queues.read().expect("event queue handle lock poisoned").clone()
    }

    pub fn route_cache(&self) -> &RouteCache {
        &*self.route_cache
    }

    pub fn pending_acks(&self) -> &PendingAckTable {
        &self.pending_acks
    }

    fn fresh_sequence(&self) -> u32 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn send_raw(&self, dest: NodeId, packet: &Packet) {
        let bytes = serialize_packet(packet);
        self.link.send(dest, &bytes);
    }

    /// Sends a packet that is being forwarded on toward `next_hop` (as
    /// opposed to one this node originates itself). When queues are wired
    /// in, the send runs as a `PacketOutgoing` task instead of inline.
    fn enqueue_outgoing(&self, next_hop: NodeId, packet: Packet) {
        match self.queues() {
            Some(queues) => {
                let link = self.link.clone();
                queues.push(
                    EventKind::PacketOutgoing,
                    Box::new(move || {
                        let bytes = serialize_packet(&packet);
                        link.send(next_hop, &bytes);
                    }),
                );
            }
            None => self.send_raw(next_hop, &packet),
        }
    }

    /// Applies a discovered or reconstructed route to the cache. When
    /// queues are wired in, the mutation runs as a `RouteCacheUpdate` task.
    fn enqueue_route_cache_update(&self, self_id: NodeId, dest: NodeId, route: Route) {
        match self.queues() {
            Some(queues) => {
                let cache = self.route_cache.clone();
                queues.push(
                    EventKind::RouteCacheUpdate,
                    Box::new(move || cache.add_or_update(self_id, dest, route)),
                );
            }
            None => self.route_cache.add_or_update(self_id, dest, route),
        }
    }

    fn broadcast(&self, packet: &Packet) {
        for &neighbor in &self.neighbors {
            self.send_raw(neighbor, packet);
        }
        self.logger.log(&format!("BROADCAST type={:?} src={}", packet.packet_type, packet.source_id));
    }

    fn lookup_route(&self, dest: NodeId) -> Result<Route, DsrError> {
        self.route_cache.get_route(dest).ok_or(DsrError::NoRoute)
    }

    /// Originates a data transmission. Starts route discovery when no
    /// cached route exists; otherwise sends immediately along the cached
    /// source route and registers a pending acknowledgement.
    pub fn send_data(&self, dest: NodeId, payload: Vec<u8>) {
        match self.lookup_route(dest) {
            Ok(route) => self.send_data_along(route, dest, payload),
            Err(DsrError::NoRoute) => self.start_discovery(dest),
            Err(_) => unreachable!("lookup_route only ever returns NoRoute"),
        }
    }

    fn send_data_along(&self, route: Route, dest: NodeId, payload: Vec<u8>) {
        let Some(next_hop) = next_hop_after(&route, self.self_id) else {
            self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            self.logger.log(&format!("DROP no next hop toward {dest}"));
            return;
        };
        let sequence_number = self.fresh_sequence();
        let packet = Packet {
            packet_type: PacketType::Data,
            source_id: self.self_id,
            destination_id: dest,
            sequence_number,
            timestamp: now_secs_u32(),
            hop_addresses: route,
            payload,
        };
        self.send_raw(next_hop, &packet);
        self.pending_acks.insert(sequence_number, next_hop, packet);
        self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.logger.log(&format!("SEND seq={sequence_number} dest={dest} via={next_hop}"));
    }

    fn start_discovery(&self, dest: NodeId) {
        let packet = Packet {
            packet_type: PacketType::RouteRequest,
            source_id: self.self_id,
            destination_id: dest,
            sequence_number: self.fresh_sequence(),
            timestamp: now_secs_u32(),
            hop_addresses: vec![self.self_id],
            payload: Vec::new(),
        };
        self.broadcast(&packet);
    }

    /// Dispatches an inbound packet to its type-specific handler.
    pub fn handle_packet(&self, packet: Packet) {
        if let Err(err) = self.check_hop_budget(&packet) {
            self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            self.logger.log(&format!("ERROR {err}"));
            return;
        }
        let result = match packet.packet_type {
            PacketType::RouteRequest => {
                self.handle_rreq(packet);
                Ok(())
            }
            PacketType::RouteReply => self.handle_rrep(packet),
            PacketType::Data => self.handle_data(packet),
            PacketType::Ack => {
                self.handle_ack(packet);
                Ok(())
            }
            PacketType::RouteError => {
                self.handle_rerr(packet);
                Ok(())
            }
            PacketType::Identity => Ok(()),
        };
        if let Err(err) = result {
            self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            self.logger.log(&format!("ERROR {err}"));
        }
    }

    fn check_hop_budget(&self, packet: &Packet) -> Result<(), DsrError> {
        if packet.hop_count() as u8 > self.max_hop_count {
            Err(DsrError::TtlExceeded)
        } else {
            Ok(())
        }
    }

    fn handle_rreq(&self, mut packet: Packet) {
        if packet.hop_addresses.contains(&self.self_id) {
            // loop suppression: we are already on this request's path
            return;
        }
        packet.hop_addresses.push(self.self_id);

        if self.self_id == packet.destination_id {
            self.enqueue_route_cache_update(self.self_id, packet.source_id, packet.hop_addresses.clone());
            self.send_rrep_back(packet.hop_addresses);
        } else {
            self.broadcast(&packet);
        }
    }

    fn send_rrep_back(&self, discovered_path: Route) {
        let mut reversed = discovered_path;
        reversed.reverse();
        let original_requester = *reversed.last().expect("discovered path is never empty");
        let Some(next_hop) = reversed.get(1).copied() else {
            // the requester is the destination itself; nothing to reply to
            return;
        };
        let packet = Packet {
            packet_type: PacketType::RouteReply,
            source_id: self.self_id,
            destination_id: original_requester,
            sequence_number: self.fresh_sequence(),
            timestamp: now_secs_u32(),
            hop_addresses: reversed,
            payload: Vec::new(),
        };
        self.send_raw(next_hop, &packet);
    }

    fn handle_rrep(&self, packet: Packet) -> Result<(), DsrError> {
        let mut forward_path = packet.hop_addresses.clone();
        forward_path.reverse();
        self.enqueue_route_cache_update(self.self_id, packet.source_id, forward_path);

        if self.self_id == packet.destination_id {
            return Ok(());
        }
        let next_hop = next_hop_after(&packet.hop_addresses, self.self_id).ok_or(DsrError::NoNextHop)?;
        self.enqueue_outgoing(next_hop, packet);
        Ok(())
    }

    fn handle_data(&self, packet: Packet) -> Result<(), DsrError> {
        match prev_hop_before(&packet.hop_addresses, self.self_id) {
            Some(prev) => self.send_ack(prev, packet.sequence_number),
            // this node is the route's origin (index 0): nothing precedes it
            None if packet.hop_addresses.first() == Some(&self.self_id) => {}
            None => return Err(DsrError::NoNextHop),
        }

        if self.self_id == packet.destination_id {
            self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
            let route_id = format!("{}->{}", packet.source_id, packet.destination_id);
            self.routing_log.record(
                self.self_id,
                route_id,
                ReceiptAction::PacketReceived,
                packet.sequence_number,
                prev_hop_before(&packet.hop_addresses, self.self_id),
                None,
            );
            self.logger
                .log(&format!("RECEIVE seq={} from={}", packet.sequence_number, packet.source_id));
            self.logger
                .log(&format!("RECEIPT action=PACKET_RECEIVED seq={}", packet.sequence_number));
            return Ok(());
        }

        let next_hop = next_hop_after(&packet.hop_addresses, self.self_id).ok_or(DsrError::BrokenRoute)?;
        let route_id = format!("{}->{}", packet.source_id, packet.destination_id);
        self.routing_log.record(
            self.self_id,
            route_id,
            ReceiptAction::DataForwarded,
            packet.sequence_number,
            prev_hop_before(&packet.hop_addresses, self.self_id),
            Some(next_hop),
        );
        self.pending_acks.insert(packet.sequence_number, next_hop, packet.clone());
        self.stats.packets_forwarded.fetch_add(1, Ordering::Relaxed);
        self.logger
            .log(&format!("FORWARD seq={} to={}", packet.sequence_number, next_hop));
        self.logger
            .log(&format!("RECEIPT action=DATA_forwarded seq={}", packet.sequence_number));
        self.enqueue_outgoing(next_hop, packet);
        Ok(())
    }

    fn send_ack(&self, prev: NodeId, sequence_number: u32) {
        let packet = Packet {
            packet_type: PacketType::Ack,
            source_id: self.self_id,
            destination_id: prev,
            sequence_number,
            timestamp: now_secs_u32(),
            hop_addresses: Vec::new(),
            payload: Vec::new(),
        };
        self.send_raw(prev, &packet);
        self.logger.log(&format!("ACK seq={sequence_number} to={prev}"));
    }

    fn handle_ack(&self, packet: Packet) {
        self.pending_acks.acknowledge(packet.sequence_number);
    }

    fn handle_rerr(&self, packet: Packet) {
        if let Some(&failed_hop) = packet.payload.first() {
            self.route_cache.remove_routes_with_next_hop(failed_hop);
        }
    }

    /// Invalidates every cached route through `failed_hop` and broadcasts
    /// a route-error notification carrying the failed hop id.
    pub fn route_failed(&self, failed_hop: NodeId) {
        self.route_cache.remove_routes_with_next_hop(failed_hop);
        let packet = Packet {
            packet_type: PacketType::RouteError,
            source_id: self.self_id,
            destination_id: hopwire_core::BROADCAST_NODE_ID,
            sequence_number: self.fresh_sequence(),
            timestamp: now_secs_u32(),
            hop_addresses: Vec::new(),
            payload: vec![failed_hop],
        };
        self.broadcast(&packet);
        self.logger.log(&format!("RERR failed_hop={failed_hop}"));
    }

    /// Runs one ACK-timeout sweep: retransmits retry-eligible entries and
    /// declares the link failed for entries past the retry budget.
    pub fn check_ack_timeouts(&self, timeout: Duration, max_retries: u32) {
        for action in self.pending_acks.sweep_timeouts(timeout, max_retries) {
            match action {
                TimeoutAction::Retry { next_hop_id, packet } => {
                    self.send_raw(next_hop_id, &packet);
                    self.logger
                        .log(&format!("RETRY seq={} to={next_hop_id}", packet.sequence_number));
                }
                TimeoutAction::LinkFailed { next_hop_id } => {
                    self.logger
                        .log(&format!("ERROR ack timeout exhausted, link broken to {next_hop_id}"));
                    self.route_failed(next_hop_id);
                }
            }
        }
    }

    /// Deserializes and dispatches a raw inbound datagram.
    pub fn handle_inbound_bytes(&self, bytes: &[u8]) {
        match deserialize_packet(bytes) {
            Ok(packet) => self.handle_packet(packet),
            Err(_) => {
                self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                self.logger.log("DROP malformed datagram");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Delivers bytes directly into the addressed node's handler, modeling
    /// an instantaneous, lossless mesh for protocol-logic tests.
    struct DirectLink {
        nodes: Mutex<HashMap<NodeId, Arc<DsrNode>>>,
    }

    impl DirectLink {
        fn new() -> Arc<Self> {
            Arc::new(Self { nodes: Mutex::new(HashMap::new()) })
        }

        fn register(self: &Arc<Self>, node: Arc<DsrNode>) {
            self.nodes.lock().unwrap().insert(node.self_id, node);
        }
    }

    impl NodeLink for DirectLink {
        fn send(&self, dest: NodeId, bytes: &[u8]) {
            if let Some(node) = self.nodes.lock().unwrap().get(&dest).cloned() {
                node.handle_inbound_bytes(bytes);
            }
        }
    }

    fn build_chain(n: u8) -> (Arc<DirectLink>, Vec<Arc<DsrNode>>) {
        let link = DirectLink::new();
        let mut nodes = Vec::new();
        for id in 0..n {
            let mut neighbors = Vec::new();
            if id > 0 {
                neighbors.push(id - 1);
            }
            if id + 1 < n {
                neighbors.push(id + 1);
            }
            let node = Arc::new(DsrNode::new(
                id,
                neighbors,
                50,
                Arc::new(RoutingLogLedger::new()),
                link.clone() as Arc<dyn NodeLink>,
                Arc::new(NullLogger),
            ));
            link.register(node.clone());
            nodes.push(node);
        }
        (link, nodes)
    }

    #[test]
    fn linear_discovery_finds_end_to_end_route() {
        let (_link, nodes) = build_chain(5);
        nodes[0].send_data(4, b"Hello".to_vec());

        let route = nodes[0].route_cache().get_route(4).expect("route should be discovered");
        assert_eq!(route, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cached_route_skips_rediscovery_on_second_send() {
        let (_link, nodes) = build_chain(5);
        nodes[0].send_data(4, b"first".to_vec());
        assert!(nodes[0].route_cache().get_route(4).is_some());

        let (sent_before, ..) = nodes[0].stats.snapshot();
        nodes[0].send_data(4, b"second".to_vec());
        let (sent_after, ..) = nodes[0].stats.snapshot();
        assert_eq!(sent_after, sent_before + 1);
    }

    #[test]
    fn forwarding_produces_an_ack_back_to_origin() {
        let (_link, nodes) = build_chain(3);
        nodes[0].send_data(2, b"payload".to_vec());
        assert!(nodes[0].pending_acks().is_empty(), "ACK from node 1 should clear the pending entry");
    }

    #[test]
    fn destination_receives_the_payload() {
        let (_link, nodes) = build_chain(3);
        nodes[0].send_data(2, b"payload".to_vec());
        let (_, received, ..) = nodes[2].stats.snapshot();
        assert_eq!(received, 1);
    }

    #[test]
    fn route_failed_purges_cached_routes_through_the_failed_hop() {
        let (_link, nodes) = build_chain(5);
        nodes[0].send_data(4, b"x".to_vec());
        assert!(nodes[0].route_cache().get_route(4).is_some());

        nodes[0].route_failed(1);
        assert!(nodes[0].route_cache().get_route(4).is_none());
    }

    #[test]
    fn no_handler_ever_sees_itself_already_in_the_hop_list() {
        // a fully connected triangle exercises the re-broadcast-toward-origin path
        let link = DirectLink::new();
        let mut nodes = Vec::new();
        for id in 0..3u8 {
            let neighbors: Vec<NodeId> = (0..3u8).filter(|&n| n != id).collect();
            let node = Arc::new(DsrNode::new(
                id,
                neighbors,
                50,
                Arc::new(RoutingLogLedger::new()),
                link.clone() as Arc<dyn NodeLink>,
                Arc::new(NullLogger),
            ));
            link.register(node.clone());
            nodes.push(node);
        }
        nodes[0].send_data(2, b"hi".to_vec());
        // reaching this point without infinite recursion/stack overflow demonstrates
        // that loop suppression terminated the flood; a discovered route is the
        // observable proof the destination was reached at least once.
        assert!(nodes[0].route_cache().get_route(2).is_some());
    }

    #[test]
    fn with_queues_attached_forwarding_and_cache_updates_defer_until_drained() {
        let (_link, nodes) = build_chain(3);
        let queues = Arc::new(EventQueues::new());
        for node in &nodes {
            node.set_queues(queues.clone());
        }

        nodes[0].send_data(2, b"hi".to_vec());
        // the RREP's hop back to node 0 is a forwarded send from node 1, so it
        // sits in the PacketOutgoing queue rather than reaching node 0 inline;
        // node 0 has no cached route to 2 until the queue is drained.
        assert!(nodes[0].route_cache().get_route(2).is_none());
        assert!(queues.drain_pass() > 0);
        assert!(nodes[0].route_cache().get_route(2).is_some());
    }

    #[test]
    fn handle_data_returns_broken_route_when_forwarding_hits_a_dead_end() {
        let (_link, nodes) = build_chain(2);
        let bogus = Packet {
            packet_type: PacketType::Data,
            source_id: 0,
            destination_id: 9,
            sequence_number: 1,
            timestamp: 0,
            hop_addresses: vec![0, 1],
            payload: Vec::new(),
        };
        nodes[1].handle_packet(bogus);
        let (_, _, _, dropped) = nodes[1].stats.snapshot();
        assert_eq!(dropped, 1);
    }
}
