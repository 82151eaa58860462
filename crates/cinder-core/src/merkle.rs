//! Merkle commitment over a block's transaction list.
//!
//! Leaves are `Keccak256(tx_hash)`. Odd layers duplicate their last node;
//! each internal node is `Keccak256(left || right)` over the raw 32-byte
//! children. A single transaction therefore commits as its leaf hash alone.
//!
//! The transaction list must be non-empty; blocks always carry at least the
//! coinbase.

use crate::crypto::keccak256;
use crate::types::Hash256;

fn leaf_hash(tx_hash: &Hash256) -> Hash256 {
    keccak256(tx_hash.as_bytes())
}

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    keccak256(&data)
}

/// Compute the Merkle root of an ordered, non-empty list of transaction
/// hashes.
///
/// # Panics
///
/// Panics on an empty list; an empty block is a caller bug, not an input.
pub fn merkle_root(tx_hashes: &[Hash256]) -> Hash256 {
    assert!(!tx_hashes.is_empty(), "merkle root of empty transaction list");

    let mut layer: Vec<Hash256> = tx_hashes.iter().map(leaf_hash).collect();
    while layer.len() > 1 {
        layer = next_layer(&layer);
    }
    layer[0]
}

/// Pair adjacent nodes, duplicating the last one when the layer is odd.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}
