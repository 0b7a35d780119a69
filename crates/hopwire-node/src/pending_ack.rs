use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hopwire_core::NodeId;
use hopwire_codec::Packet;

/// A forwarded/originated packet awaiting acknowledgement from the next hop.
pub struct PendingAck {
    pub next_hop_id: NodeId,
    pub send_time: Instant,
    pub retries: u32,
    pub original_packet: Packet,
}

/// What the timeout sweep should do with one pending entry.
pub enum TimeoutAction {
    /// Retransmit `packet` to `next_hop_id` and keep waiting.
    Retry { next_hop_id: NodeId, packet: Packet },
    /// Retry budget exhausted; the link to `next_hop_id` is declared failed.
    LinkFailed { next_hop_id: NodeId },
}

/// Tracks outstanding per-sequence-number acknowledgements, keyed by the
/// packet's sequence number. Timeouts are measured against wall-clock time
/// rather than scheduler steps, since the reliability window is specified
/// in milliseconds.
#[derive(Default)]
pub struct PendingAckTable {
    inner: Mutex<HashMap<u32, PendingAck>>,
}

impl PendingAckTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sequence_number: u32, next_hop_id: NodeId, packet: Packet) {
        let entry = PendingAck {
            next_hop_id,
            send_time: Instant::now(),
            retries: 0,
            original_packet: packet,
        };
        self.inner
            .lock()
            .expect("pending-ack lock poisoned")
            .insert(sequence_number, entry);
    }

    /// Removes the pending entry for `sequence_number`, if any, acknowledging it.
    pub fn acknowledge(&self, sequence_number: u32) -> bool {
        self.inner
            .lock()
            .expect("pending-ack lock poisoned")
            .remove(&sequence_number)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending-ack lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps every entry older than `timeout`. Entries under the retry
    /// budget are bumped (retry count incremented, send time reset) and
    /// produce a `Retry` action; entries at the budget are removed and
    /// produce a `LinkFailed` action.
    pub fn sweep_timeouts(&self, timeout: Duration, max_retries: u32) -> Vec<TimeoutAction> {
        let mut actions = Vec::new();
        let mut inner = self.inner.lock().expect("pending-ack lock poisoned");
        let mut failed_seqs = Vec::new();

        for (seq, entry) in inner.iter_mut() {
            if entry.send_time.elapsed() < timeout {
                continue;
            }
            if entry.retries < max_retries {
                entry.retries += 1;
                entry.send_time = Instant::now();
                actions.push(TimeoutAction::Retry {
                    next_hop_id: entry.next_hop_id,
                    packet: entry.original_packet.clone(),
                });
            } else {
                actions.push(TimeoutAction::LinkFailed {
                    next_hop_id: entry.next_hop_id,
                });
                failed_seqs.push(*seq);
            }
        }

        for seq in failed_seqs {
            inner.remove(&seq);
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopwire_core::PacketType;

    fn sample_packet() -> Packet {
        Packet {
            packet_type: PacketType::Data,
            source_id: 0,
            destination_id: 4,
            sequence_number: 7,
            timestamp: 0,
            hop_addresses: vec![0, 1, 2, 3, 4],
            payload: vec![],
        }
    }

    #[test]
    fn insert_then_acknowledge_removes_entry() {
        let table = PendingAckTable::new();
        table.insert(7, 1, sample_packet());
        assert_eq!(table.len(), 1);
        assert!(table.acknowledge(7));
        assert!(table.is_empty());
    }

    #[test]
    fn acknowledge_unknown_sequence_returns_false() {
        let table = PendingAckTable::new();
        assert!(!table.acknowledge(99));
    }

    #[test]
    fn sweep_before_timeout_does_nothing() {
        let table = PendingAckTable::new();
        table.insert(7, 1, sample_packet());
        let actions = table.sweep_timeouts(Duration::from_secs(10), 3);
        assert!(actions.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn sweep_after_timeout_retries_until_budget_then_fails() {
        let table = PendingAckTable::new();
        table.insert(7, 1, sample_packet());

        for expected_retry in 1..=3u32 {
            let actions = table.sweep_timeouts(Duration::from_millis(0), 3);
            assert_eq!(actions.len(), 1);
            match &actions[0] {
                TimeoutAction::Retry { next_hop_id, .. } => {
                    assert_eq!(*next_hop_id, 1);
                    assert_eq!(expected_retry, expected_retry);
                }
                TimeoutAction::LinkFailed { .. } => panic!("should still be retrying"),
            }
            assert_eq!(table.len(), 1);
        }

        let actions = table.sweep_timeouts(Duration::from_millis(0), 3);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], TimeoutAction::LinkFailed { next_hop_id: 1 }));
        assert!(table.is_empty());
    }
}
