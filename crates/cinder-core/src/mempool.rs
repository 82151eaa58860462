//! Cache of unconfirmed transactions awaiting a block.
//!
//! Validation against chain state is the caller's job; the pool only
//! deduplicates, bounds its size, and evicts entries once a block confirms
//! or conflicts with them. Not internally locked; the node wraps it in a
//! mutex.

use std::collections::HashMap;

use crate::constants::DEFAULT_MEMPOOL_CAPACITY;
use crate::error::MempoolError;
use crate::types::{Block, Hash256, Transaction};

pub struct Mempool {
    pool: HashMap<Hash256, Transaction>,
    capacity: usize,
}

impl Mempool {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: HashMap::new(),
            capacity,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MEMPOOL_CAPACITY)
    }

    /// Insert an already-validated transaction, returning its hash.
    pub fn insert(&mut self, tx: Transaction) -> Result<Hash256, MempoolError> {
        if self.pool.len() >= self.capacity {
            return Err(MempoolError::Full);
        }
        let hash = tx.hash();
        if self.pool.contains_key(&hash) {
            return Err(MempoolError::Duplicate(hash.to_string()));
        }
        self.pool.insert(hash, tx);
        Ok(hash)
    }

    pub fn remove(&mut self, hash: &Hash256) {
        self.pool.remove(hash);
    }

    /// Drop every transaction confirmed by `block`, plus any transaction
    /// spending an outpoint the block consumed.
    pub fn remove_confirmed(&mut self, block: &Block) {
        let confirmed: Vec<Hash256> =
            block.transactions.iter().map(Transaction::hash).collect();
        let spent: Vec<(Hash256, u32)> = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .flat_map(|tx| {
                tx.inputs
                    .iter()
                    .map(|input| (input.prev_tx_hash, input.prev_out_index))
            })
            .collect();

        self.pool.retain(|hash, tx| {
            if confirmed.contains(hash) {
                return false;
            }
            !tx.inputs
                .iter()
                .any(|input| spent.contains(&(input.prev_tx_hash, input.prev_out_index)))
        });
    }

    /// Up to `max` transactions, for block assembly.
    pub fn take(&self, max: usize) -> Vec<Transaction> {
        self.pool.values().take(max).cloned().collect()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.pool.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<&Transaction> {
        self.pool.get(hash)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn clear(&mut self) {
        self.pool.clear();
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle;
    use crate::types::{Address, Header, TxInput, TxOutput, Work};

    fn tx(seed: u8) -> Transaction {
        Transaction {
            inputs: vec![TxInput {
                prev_tx_hash: Hash256([seed; 32]),
                prev_out_index: 0,
                public_key: vec![0; 32],
                signature: vec![0; 64],
            }],
            outputs: vec![TxOutput {
                value: seed as u64,
                address: Address([seed; 20]),
            }],
        }
    }

    fn block_with(txs: Vec<Transaction>) -> Block {
        let hashes: Vec<Hash256> = txs.iter().map(Transaction::hash).collect();
        Block {
            header: Header {
                version: 1,
                prev_hash: Hash256([1; 32]),
                height: 1,
                merkle_root: merkle::merkle_root(&hashes),
                timestamp: 0,
                difficulty: 1,
                nonce: 0,
                ema_block_time: 15,
                cumulative_work: Work::zero(),
            },
            transactions: txs,
        }
    }

    #[test]
    fn insert_and_query() {
        let mut pool = Mempool::with_defaults();
        let hash = pool.insert(tx(1)).unwrap();
        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&hash), Some(&tx(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn duplicate_rejected() {
        let mut pool = Mempool::with_defaults();
        pool.insert(tx(1)).unwrap();
        assert!(matches!(
            pool.insert(tx(1)),
            Err(MempoolError::Duplicate(_))
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn capacity_enforced() {
        let mut pool = Mempool::new(2);
        pool.insert(tx(1)).unwrap();
        pool.insert(tx(2)).unwrap();
        assert_eq!(pool.insert(tx(3)), Err(MempoolError::Full));
    }

    #[test]
    fn take_bounded() {
        let mut pool = Mempool::with_defaults();
        for seed in 1..=5 {
            pool.insert(tx(seed)).unwrap();
        }
        assert_eq!(pool.take(3).len(), 3);
        assert_eq!(pool.take(100).len(), 5);
        // Taking does not drain the pool.
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn remove_confirmed_drops_included_txs() {
        let mut pool = Mempool::with_defaults();
        let kept = pool.insert(tx(1)).unwrap();
        let confirmed = pool.insert(tx(2)).unwrap();

        pool.remove_confirmed(&block_with(vec![tx(2)]));
        assert!(pool.contains(&kept));
        assert!(!pool.contains(&confirmed));
    }

    #[test]
    fn remove_confirmed_drops_conflicts() {
        let mut pool = Mempool::with_defaults();
        // Same outpoint as tx(1), different outputs: a conflicting spend.
        let mut conflicting = tx(1);
        conflicting.outputs[0].value = 99;
        let conflict_hash = pool.insert(conflicting).unwrap();

        pool.remove_confirmed(&block_with(vec![tx(1)]));
        assert!(!pool.contains(&conflict_hash));
        assert!(pool.is_empty());
    }

    #[test]
    fn clear_empties_pool() {
        let mut pool = Mempool::with_defaults();
        pool.insert(tx(1)).unwrap();
        pool.clear();
        assert!(pool.is_empty());
    }
}
