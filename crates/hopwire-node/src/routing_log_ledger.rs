use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use hopwire_codec::{compute_log_block_hash, compute_receipt_id, LogBlock, Receipt, ReceiptAction};
use hopwire_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingLogError {
    #[error("block prev_hash does not match the current chain tail")]
    ChainMismatch,
}

/// Per-node trust and activity counters derived from appended receipts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeMetrics {
    pub trust: f64,
    pub forward_success: u64,
    pub packets_received: u64,
    pub wormhole_flags: u64,
    pub identity_overlap: u64,
}

pub const DEFAULT_TRUST: f64 = 0.8;
const TRUST_INCREMENT: f64 = 0.01;

impl Default for NodeMetrics {
    fn default() -> Self {
        Self {
            trust: DEFAULT_TRUST,
            forward_success: 0,
            packets_received: 0,
            wormhole_flags: 0,
            identity_overlap: 0,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Hash-chained log of forwarding/reception receipts, batched into blocks,
/// feeding a per-node trust score.
#[derive(Default)]
pub struct RoutingLogLedger {
    blocks: RwLock<Vec<LogBlock>>,
    buffer: Mutex<Vec<Receipt>>,
    metrics: RwLock<HashMap<NodeId, NodeMetrics>>,
}

impl RoutingLogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a receipt into the pending buffer, ready to be batched into
    /// the next block by `flush_block`.
    pub fn record(
        &self,
        node_id: NodeId,
        route_id: impl Into<String>,
        action: ReceiptAction,
        packet_seq: u32,
        prev_node: Option<NodeId>,
        next_node: Option<NodeId>,
    ) {
        let timestamp = now_secs();
        let id = compute_receipt_id(node_id, action, timestamp, packet_seq);
        let receipt = Receipt {
            node_id,
            route_id: route_id.into(),
            action,
            packet_seq,
            prev_node,
            next_node,
            id,
            timestamp,
        };
        self.buffer.lock().expect("receipt buffer lock poisoned").push(receipt);
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().expect("receipt buffer lock poisoned").len()
    }

    /// Drains the receipt buffer into a new hash-chained block and updates
    /// derived trust metrics. A no-op when the buffer is empty.
    pub fn flush_block(&self) -> Option<[u8; 32]> {
        let receipts = {
            let mut buffer = self.buffer.lock().expect("receipt buffer lock poisoned");
            if buffer.is_empty() {
                return None;
            }
            std::mem::take(&mut *buffer)
        };

        let timestamp = now_secs();
        let mut blocks = self.blocks.write().expect("routing log lock poisoned");
        let prev_hash = blocks.last().map(|b| b.hash).unwrap_or([0u8; 32]);
        let hash = compute_log_block_hash(prev_hash, &receipts, timestamp);

        self.apply_metrics(&receipts);

        let block = LogBlock {
            prev_hash,
            hash,
            timestamp,
            receipts,
        };
        blocks.push(block);
        Some(hash)
    }

    /// Accepts an externally-supplied block (e.g. reloaded from disk at
    /// restart) onto the chain, after checking it actually links onto the
    /// current tail. Metrics are derived from its receipts same as a
    /// locally-flushed block.
    pub fn append_block(&self, block: LogBlock) -> Result<(), RoutingLogError> {
        let mut blocks = self.blocks.write().expect("routing log lock poisoned");
        let expected_prev = blocks.last().map(|b| b.hash).unwrap_or([0u8; 32]);
        if block.prev_hash != expected_prev {
            return Err(RoutingLogError::ChainMismatch);
        }
        self.apply_metrics(&block.receipts);
        blocks.push(block);
        Ok(())
    }

    fn apply_metrics(&self, receipts: &[Receipt]) {
        let mut metrics = self.metrics.write().expect("metrics lock poisoned");
        for receipt in receipts {
            let entry = metrics.entry(receipt.node_id).or_default();
            match receipt.action {
                ReceiptAction::DataForwarded => {
                    entry.forward_success += 1;
                    entry.trust = (entry.trust + TRUST_INCREMENT).min(1.0);
                }
                ReceiptAction::PacketReceived => {
                    entry.packets_received += 1;
                }
            }
        }
    }

    pub fn get_trust_score(&self, node_id: NodeId) -> f64 {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .get(&node_id)
            .map(|m| m.trust)
            .unwrap_or(DEFAULT_TRUST)
    }

    pub fn metrics_for(&self, node_id: NodeId) -> NodeMetrics {
        self.metrics
            .read()
            .expect("metrics lock poisoned")
            .get(&node_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn chain_len(&self) -> usize {
        self.blocks.read().expect("routing log lock poisoned").len()
    }

    pub fn verify_chain(&self) -> bool {
        let blocks = self.blocks.read().expect("routing log lock poisoned");
        for (i, block) in blocks.iter().enumerate() {
            let expected = compute_log_block_hash(block.prev_hash, &block.receipts, block.timestamp);
            if expected != block.hash {
                return false;
            }
            if i > 0 && block.prev_hash != blocks[i - 1].hash {
                return false;
            }
        }
        true
    }
}
