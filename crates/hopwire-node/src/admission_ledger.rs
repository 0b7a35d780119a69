use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use hopwire_codec::{
    compute_block_hash, serialize_admission_block, AdmissionBlock, Certificate,
    DEFAULT_VALIDITY_SECONDS,
};
use hopwire_core::NodeId;
use thiserror::Error;

use crate::pow::{generate_challenge, is_solved, solve, PowChallenge, PowError};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(&'static str),
    #[error("no pending challenge matches the given challenge")]
    NoPending,
    #[error("proof-of-work solution does not satisfy the challenge")]
    PowInvalid,
    #[error("genesis admission is only permitted for node 0 on an empty ledger")]
    NotGenesisAllowed,
    #[error(transparent)]
    Pow(#[from] PowError),
}

struct PendingNode {
    node_id: NodeId,
    pk_sign: Vec<u8>,
    pk_encrypt: Vec<u8>,
    challenge: PowChallenge,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

fn self_signed_cert(id: NodeId, pk_sign: &[u8], pk_encrypt: &[u8]) -> Certificate {
    let not_before = now_secs();
    Certificate {
        node_id: id,
        public_key: pk_sign.to_vec(),
        encryption_key: pk_encrypt.to_vec(),
        signature: Vec::new(),
        not_before,
        not_after: not_before + DEFAULT_VALIDITY_SECONDS,
    }
}

/// Finishes building and hashing a block once a solved nonce is in hand.
fn finish_block(
    prev_hash: [u8; 32],
    cert: Certificate,
    challenge: &PowChallenge,
    nonce: u64,
) -> AdmissionBlock {
    let mut block = AdmissionBlock {
        prev_hash,
        next_hash: [0u8; 32],
        block_hash: [0u8; 32],
        nonce,
        difficulty: challenge.difficulty,
        timestamp: now_secs(),
        cert,
    };
    block.block_hash = compute_block_hash(&block);
    block
}

/// Hash-chained sequence of node-registration blocks, each gated by a
/// proof-of-work puzzle bound to a pending registration until solved.
#[derive(Default)]
pub struct AdmissionLedger {
    blocks: RwLock<Vec<AdmissionBlock>>,
    pending: Mutex<HashMap<[u8; 32], PendingNode>>,
}

impl AdmissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain_len(&self) -> usize {
        self.blocks.read().expect("admission ledger lock poisoned").len()
    }

    pub fn tail_block_hash(&self) -> Option<[u8; 32]> {
        self.blocks
            .read()
            .expect("admission ledger lock poisoned")
            .last()
            .map(|b| b.block_hash)
    }

    fn serialized_tail(&self) -> Vec<u8> {
        self.blocks
            .read()
            .expect("admission ledger lock poisoned")
            .last()
            .map(serialize_admission_block)
            .unwrap_or_default()
    }

    /// Issues a proof-of-work challenge for a prospective node, recording a
    /// pending registration keyed by the challenge digest.
    pub fn add_node(
        &self,
        id: NodeId,
        pk_sign: &[u8],
        pk_encrypt: &[u8],
    ) -> Result<PowChallenge, AdmissionError> {
        if pk_sign.is_empty() || pk_encrypt.is_empty() {
            return Err(AdmissionError::InvalidArgs("empty key material"));
        }
        let challenge = generate_challenge(&self.serialized_tail(), id, pk_sign, pk_encrypt);
        self.pending.lock().expect("pending lock poisoned").insert(
            challenge.challenge,
            PendingNode {
                node_id: id,
                pk_sign: pk_sign.to_vec(),
                pk_encrypt: pk_encrypt.to_vec(),
                challenge,
            },
        );
        Ok(challenge)
    }

    /// Verifies a solved challenge and appends the new admission block.
    /// The pending entry is consumed as soon as it is found, even if the
    /// proof-of-work check below subsequently fails.
    pub fn finalize_node(
        &self,
        challenge: &PowChallenge,
        nonce: u64,
    ) -> Result<bool, AdmissionError> {
        let pending = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&challenge.challenge)
            .ok_or(AdmissionError::NoPending)?;

        if !is_solved(challenge, nonce) {
            return Err(AdmissionError::PowInvalid);
        }

        let cert = self_signed_cert(pending.node_id, &pending.pk_sign, &pending.pk_encrypt);
        let mut blocks = self.blocks.write().expect("admission ledger lock poisoned");
        let prev_hash = blocks.last().map(|b| b.block_hash).unwrap_or([0u8; 32]);
        let new_block = finish_block(prev_hash, cert, challenge, nonce);
        let new_hash = new_block.block_hash;

        if let Some(prev) = blocks.last_mut() {
            prev.next_hash = new_hash;
        }
        blocks.push(new_block);
        Ok(true)
    }

    /// Mines and appends the genesis block in-process. Permitted only for
    /// node id 0 on an empty chain.
    pub fn create_genesis(
        &self,
        id: NodeId,
        pk_sign: &[u8],
        pk_encrypt: &[u8],
        pow_max_workers: usize,
        pow_max_attempts: u64,
    ) -> Result<(), AdmissionError> {
        if id != hopwire_core::GENESIS_NODE_ID || self.chain_len() != 0 {
            return Err(AdmissionError::NotGenesisAllowed);
        }
        let challenge = generate_challenge(&[], id, pk_sign, pk_encrypt);
        let nonce = solve(challenge, pow_max_workers, pow_max_attempts)?;
        let cert = self_signed_cert(id, pk_sign, pk_encrypt);
        let block = finish_block([0u8; 32], cert, &challenge, nonce);
        self.blocks
            .write()
            .expect("admission ledger lock poisoned")
            .push(block);
        Ok(())
    }

    /// Validates hash-chain linkage across the entire ledger.
    pub fn verify_chain(&self) -> bool {
        let blocks = self.blocks.read().expect("admission ledger lock poisoned");
        for (i, block) in blocks.iter().enumerate() {
            if compute_block_hash(block) != block.block_hash {
                return false;
            }
            if i == 0 {
                if block.prev_hash != [0u8; 32] {
                    return false;
                }
            } else if block.prev_hash != blocks[i - 1].block_hash {
                return false;
            }
            if i + 1 < blocks.len() && block.next_hash != blocks[i + 1].block_hash {
                return false;
            }
        }
        true
    }
}
