use rand::RngCore;

// No `random_u32`: sequence numbers are drawn from an `AtomicU32` counter
// (see `hopwire-node::dsr::DsrNode::fresh_sequence`), not from the CSPRNG,
// so nothing in this tree needs a 32-bit random draw.

/// Draws a uniformly random 16-bit value, used for proof-of-work difficulty targets.
pub fn random_u16() -> u16 {
    rand::random()
}

/// Draws a uniformly random 64-bit value, used to seed parallel nonce search.
pub fn random_u64() -> u64 {
    rand::random()
}

/// Fills `buf` with CSPRNG output.
pub fn fill_random(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}
