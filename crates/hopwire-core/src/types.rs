use serde::{Deserialize, Serialize};

/// 8-bit node identifier. `0` is reserved for the genesis admission block,
/// `255` is reserved as the broadcast id used by simplified RERR flooding.
pub type NodeId = u8;

pub const GENESIS_NODE_ID: NodeId = 0;
pub const BROADCAST_NODE_ID: NodeId = 255;

/// Ordered sequence of node ids from source to destination, inclusive.
pub type Route = Vec<NodeId>;

/// Wire-level packet discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    Data = 0,
    RouteRequest = 1,
    RouteReply = 2,
    RouteError = 3,
    Ack = 4,
    Identity = 5,
}

impl PacketType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Data),
            1 => Some(Self::RouteRequest),
            2 => Some(Self::RouteReply),
            3 => Some(Self::RouteError),
            4 => Some(Self::Ack),
            5 => Some(Self::Identity),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Returns the next hop after `self_id` along `route`, if any.
pub fn next_hop_after(route: &Route, self_id: NodeId) -> Option<NodeId> {
    let idx = route.iter().position(|&n| n == self_id)?;
    route.get(idx + 1).copied()
}

/// Returns the hop immediately before `self_id` along `route`.
pub fn prev_hop_before(route: &Route, self_id: NodeId) -> Option<NodeId> {
    let idx = route.iter().position(|&n| n == self_id)?;
    if idx == 0 {
        None
    } else {
        route.get(idx - 1).copied()
    }
}
