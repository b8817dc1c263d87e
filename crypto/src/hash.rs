//! Blake2b hashing for sub-block identifiers and selection seeds.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use meridian_types::{SubBlockId, Timestamp, TxId};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Derive a sub-block id from the assembler sequence, assembly time, and the
/// ordered transaction ids.
///
/// Each id is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn sub_block_id(sequence: u64, assembled_at: Timestamp, tx_ids: &[TxId]) -> SubBlockId {
    let mut hasher = Blake2b256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(assembled_at.as_millis().to_le_bytes());
    for id in tx_ids {
        hasher.update((id.as_str().len() as u64).to_le_bytes());
        hasher.update(id.as_str().as_bytes());
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    SubBlockId::new(output)
}

/// Deterministic 64-bit seed for stake-weighted selection of a sub-block's
/// validator: the first 8 bytes of `Blake2b(sub_block_id)`, little-endian.
pub fn selection_seed(id: &SubBlockId) -> u64 {
    let hash = blake2b_256(id.as_bytes());
    u64::from_le_bytes([
        hash[0], hash[1], hash[2], hash[3], hash[4], hash[5], hash[6], hash[7],
    ])
}
