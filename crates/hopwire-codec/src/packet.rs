use hopwire_core::{NodeId, PacketType, Route};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Fixed header size in bytes, before the variable-length hop list and payload.
const HEADER_LEN: usize = 1 + 1 + 1 + 4 + 4 + 1;

/// A single protocol packet, in its decoded in-memory form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub packet_type: PacketType,
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub sequence_number: u32,
    pub timestamp: u32,
    pub hop_addresses: Route,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn hop_count(&self) -> u8 {
        self.hop_addresses.len() as u8
    }
}

/// Serializes a packet into its canonical big-endian wire form.
///
/// Layout: `type(1) source_id(1) destination_id(1) sequence_number(4)
/// timestamp(4) hop_count(1) hop_addresses(hop_count) payload(rest)`.
pub fn serialize_packet(packet: &Packet) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + packet.hop_addresses.len() + packet.payload.len());
    out.push(packet.packet_type.as_u8());
    out.push(packet.source_id);
    out.push(packet.destination_id);
    out.extend_from_slice(&packet.sequence_number.to_be_bytes());
    out.extend_from_slice(&packet.timestamp.to_be_bytes());
    out.push(packet.hop_count());
    out.extend_from_slice(&packet.hop_addresses);
    out.extend_from_slice(&packet.payload);
    out
}

/// Deserializes a packet from its canonical wire form.
pub fn deserialize_packet(bytes: &[u8]) -> Result<Packet, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::truncated(HEADER_LEN, bytes.len()));
    }
    let packet_type = PacketType::from_u8(bytes[0])
        .ok_or(CodecError::InvalidField("unrecognized packet type byte"))?;
    let source_id = bytes[1];
    let destination_id = bytes[2];
    let sequence_number = u32::from_be_bytes(bytes[3..7].try_into().unwrap());
    let timestamp = u32::from_be_bytes(bytes[7..11].try_into().unwrap());
    let hop_count = bytes[11] as usize;

    let hop_end = HEADER_LEN + hop_count;
    if bytes.len() < hop_end {
        return Err(CodecError::truncated(hop_end, bytes.len()));
    }
    let hop_addresses = bytes[HEADER_LEN..hop_end].to_vec();
    let payload = bytes[hop_end..].to_vec();

    Ok(Packet {
        packet_type,
        source_id,
        destination_id,
        sequence_number,
        timestamp,
        hop_addresses,
        payload,
    })
}
