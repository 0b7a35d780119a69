//! Core primitives shared across the node crates.
//!
//! Includes node/route types, hash helpers, CSPRNG helpers, and base errors.

pub mod csprng;
pub mod error;
pub mod hash;
pub mod types;

pub use error::CoreError;
pub use types::{
    next_hop_after, prev_hop_before, NodeId, PacketType, Route, BROADCAST_NODE_ID,
    GENESIS_NODE_ID,
};
