use hopwire_core::{hash::sha256_32, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A node's admission certificate: its identity plus a validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub node_id: NodeId,
    pub public_key: Vec<u8>,
    pub encryption_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub not_before: u64,
    pub not_after: u64,
}

/// Ten years, in seconds — the default certificate validity window.
pub const DEFAULT_VALIDITY_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_len_prefixed(bytes: &[u8], offset: &mut usize) -> Result<Vec<u8>, CodecError> {
    if bytes.len() < *offset + 2 {
        return Err(CodecError::truncated(*offset + 2, bytes.len()));
    }
    let len = u16::from_be_bytes(bytes[*offset..*offset + 2].try_into().unwrap()) as usize;
    *offset += 2;
    if bytes.len() < *offset + len {
        return Err(CodecError::truncated(*offset + len, bytes.len()));
    }
    let value = bytes[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(value)
}

pub fn serialize_cert(cert: &Certificate) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(cert.node_id);
    write_len_prefixed(&mut out, &cert.public_key);
    write_len_prefixed(&mut out, &cert.encryption_key);
    write_len_prefixed(&mut out, &cert.signature);
    out.extend_from_slice(&cert.not_before.to_be_bytes());
    out.extend_from_slice(&cert.not_after.to_be_bytes());
    out
}

pub fn deserialize_cert(bytes: &[u8]) -> Result<Certificate, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::truncated(1, 0));
    }
    let mut offset = 0usize;
    let node_id = bytes[offset];
    offset += 1;
    let public_key = read_len_prefixed(bytes, &mut offset)?;
    let encryption_key = read_len_prefixed(bytes, &mut offset)?;
    let signature = read_len_prefixed(bytes, &mut offset)?;
    if bytes.len() < offset + 16 {
        return Err(CodecError::truncated(offset + 16, bytes.len()));
    }
    let not_before = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
    offset += 8;
    let not_after = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());

    Ok(Certificate {
        node_id,
        public_key,
        encryption_key,
        signature,
        not_before,
        not_after,
    })
}

/// One block of the admission (node-registration) hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionBlock {
    pub prev_hash: [u8; 32],
    pub next_hash: [u8; 32],
    pub block_hash: [u8; 32],
    pub nonce: u64,
    pub difficulty: [u8; 2],
    pub timestamp: u64,
    pub cert: Certificate,
}

/// Serializes a block for hashing purposes: identical to `serialize_admission_block`
/// except `block_hash` is zeroed in the preimage, since a block cannot hash itself.
fn serialize_for_hash(block: &AdmissionBlock) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&block.prev_hash);
    out.extend_from_slice(&block.next_hash);
    out.extend_from_slice(&[0u8; 32]);
    out.extend_from_slice(&block.nonce.to_be_bytes());
    out.extend_from_slice(&block.difficulty);
    out.extend_from_slice(&block.timestamp.to_be_bytes());
    out.extend_from_slice(&serialize_cert(&block.cert));
    out
}

/// Computes the block's content hash, independent of whatever is currently
/// stored in its `block_hash` field.
pub fn compute_block_hash(block: &AdmissionBlock) -> [u8; 32] {
    sha256_32(&serialize_for_hash(block))
}

pub fn serialize_admission_block(block: &AdmissionBlock) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&block.prev_hash);
    out.extend_from_slice(&block.next_hash);
    out.extend_from_slice(&block.block_hash);
    out.extend_from_slice(&block.nonce.to_be_bytes());
    out.extend_from_slice(&block.difficulty);
    out.extend_from_slice(&block.timestamp.to_be_bytes());
    out.extend_from_slice(&serialize_cert(&block.cert));
    out
}

/// The action a routing-log receipt attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptAction {
    DataForwarded,
    PacketReceived,
}

impl ReceiptAction {
    /// The action tag as it appears in a receipt id's preimage and in
    /// routing-log text dumps.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataForwarded => "DATA_forwarded",
            Self::PacketReceived => "PACKET_RECEIVED",
        }
    }
}

/// A single forwarding/reception attestation emitted by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub node_id: NodeId,
    pub route_id: String,
    pub action: ReceiptAction,
    pub packet_seq: u32,
    pub prev_node: Option<NodeId>,
    pub next_node: Option<NodeId>,
    pub id: [u8; 32],
    pub timestamp: u64,
}

/// Computes `id = SHA256(node_id . action . timestamp . packet_seq)`, where
/// `.` is string concatenation of each field's decimal (or, for `action`,
/// literal tag) representation — mirroring `std::stringstream ss; ss <<
/// node_id << action << timestamp << packet_seq;` over the same fields.
pub fn compute_receipt_id(
    node_id: NodeId,
    action: ReceiptAction,
    timestamp: u64,
    packet_seq: u32,
) -> [u8; 32] {
    let preimage = format!("{node_id}{}{timestamp}{packet_seq}", action.as_str());
    sha256_32(preimage.as_bytes())
}

/// One block of the routing-log hash chain: a batch of receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBlock {
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
    pub timestamp: u64,
    pub receipts: Vec<Receipt>,
}

/// Computes `hash = SHA256(prev_hash || concat(receipt.id) || timestamp)`.
pub fn compute_log_block_hash(prev_hash: [u8; 32], receipts: &[Receipt], timestamp: u64) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(32 + receipts.len() * 32 + 8);
    preimage.extend_from_slice(&prev_hash);
    for receipt in receipts {
        preimage.extend_from_slice(&receipt.id);
    }
    preimage.extend_from_slice(&timestamp.to_be_bytes());
    sha256_32(&preimage)
}
