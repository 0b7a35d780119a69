use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use hopwire_core::csprng::{random_u16, random_u64};
use hopwire_core::hash::sha256_32;
use hopwire_core::NodeId;
use thiserror::Error;

/// A proof-of-work puzzle: a 32-byte challenge digest and a two-byte target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowChallenge {
    pub challenge: [u8; 32],
    pub difficulty: [u8; 2],
}

#[derive(Debug, Error)]
pub enum PowError {
    #[error("exhausted all workers without finding a solution")]
    Exhausted,
}

/// Builds the challenge a prospective node must solve before its admission
/// block can be appended: `R = SHA256(serialized_prev_block || id || pk_sign
/// || pk_encrypt)`, with a uniformly random two-byte target `T`.
pub fn generate_challenge(
    serialized_prev_block: &[u8],
    id: NodeId,
    pk_sign: &[u8],
    pk_encrypt: &[u8],
) -> PowChallenge {
    let challenge = sha256_32(
        &[serialized_prev_block, &[id], pk_sign, pk_encrypt].concat(),
    );
    let target = random_u16().to_be_bytes();
    PowChallenge {
        challenge,
        difficulty: target,
    }
}

/// Checks whether `nonce` solves `challenge`:
/// `SHA256(R || SHA256(BE64(nonce)))` must start with the two target bytes,
/// checked as strict equality (not `<=`).
pub fn is_solved(challenge: &PowChallenge, nonce: u64) -> bool {
    let inner = sha256_32(&nonce.to_be_bytes());
    let outer = sha256_32(&[challenge.challenge.as_slice(), &inner].concat());
    outer[0] == challenge.difficulty[0] && outer[1] == challenge.difficulty[1]
}

/// Upper bound on attempts any single worker will make before giving up.
pub const MAX_ATTEMPTS: u64 = 1_000_000;

/// Searches for a solving nonce using `worker_count` parallel threads, each
/// starting at a random 64-bit offset and striding by `worker_count` so the
/// search spaces do not overlap. The first worker to find a solution sets
/// a shared flag and the rest stop at their next attempt boundary. Each
/// worker is bounded at `max_attempts_per_worker`; if every worker exhausts
/// its budget without success, returns `PowError::Exhausted`.
pub fn solve(
    challenge: PowChallenge,
    worker_count: usize,
    max_attempts_per_worker: u64,
) -> Result<u64, PowError> {
    let worker_count = worker_count.max(1);
    let found = Arc::new(AtomicBool::new(false));
    let solution = Arc::new(AtomicU64::new(0));

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let found = Arc::clone(&found);
            let solution = Arc::clone(&solution);
            handles.push(scope.spawn(move || {
                let mut nonce = random_u64();
                let stride = worker_count as u64;
                for _ in 0..max_attempts_per_worker {
                    if found.load(Ordering::Relaxed) {
                        return;
                    }
                    if is_solved(&challenge, nonce) {
                        solution.store(nonce, Ordering::Relaxed);
                        found.store(true, Ordering::Relaxed);
                        return;
                    }
                    nonce = nonce.wrapping_add(stride);
                    let _ = worker_id;
                }
            }));
        }
        for handle in handles {
            let _ = handle.join();
        }
    });

    if found.load(Ordering::Relaxed) {
        Ok(solution.load(Ordering::Relaxed))
    } else {
        Err(PowError::Exhausted)
    }
}
