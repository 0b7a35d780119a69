//! Wire and on-disk codec for packets and hash-chained ledger blocks.
//!
//! All multi-byte integers are big-endian regardless of host endianness.

pub mod error;
pub mod ledger;
pub mod packet;

pub use error::CodecError;
pub use ledger::{
    compute_block_hash, compute_log_block_hash, compute_receipt_id, deserialize_cert,
    serialize_admission_block, serialize_cert, AdmissionBlock, Certificate, LogBlock, Receipt,
    ReceiptAction, DEFAULT_VALIDITY_SECONDS,
};
pub use packet::{deserialize_packet, serialize_packet, Packet};
