//! The UTXO set: applying and rolling back a block's effect on chain state.
//!
//! Key scheme in the shared store:
//!
//! - `'u' || tx_hash (32B) || output_index (u32 BE)` → encoded [`TxOutput`]
//! - `'z' || block_hash (32B)` → encoded [`BlockUndo`]
//!
//! `apply` deletes every spent UTXO, creates every new output, and writes
//! the block's undo record; `rollback` reverses all three. Each commits as
//! a single atomic batch, so a crash leaves the set at a block boundary.

use std::sync::Arc;

use crate::codec;
use crate::error::{ChainError, IntegrityError};
use crate::store::{KvStore, WriteBatch};
use crate::types::{Address, Block, BlockUndo, Hash256, TxOutput, UtxoRef};

/// Namespace byte for UTXO entries.
pub const UTXO_PREFIX: u8 = b'u';
/// Namespace byte for undo records.
pub const UNDO_PREFIX: u8 = b'z';

/// `'u' || tx_hash || index` (big-endian index for ordered iteration).
pub fn utxo_key(tx_hash: &Hash256, index: u32) -> [u8; 37] {
    let mut key = [0u8; 37];
    key[0] = UTXO_PREFIX;
    key[1..33].copy_from_slice(tx_hash.as_bytes());
    key[33..].copy_from_slice(&index.to_be_bytes());
    key
}

/// `'z' || block_hash`.
pub fn undo_key(block_hash: &Hash256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = UNDO_PREFIX;
    key[1..].copy_from_slice(block_hash.as_bytes());
    key
}

pub struct UtxoSet<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> UtxoSet<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Look up one unspent output. `None` if spent or unknown.
    pub fn get(&self, tx_hash: &Hash256, index: u32) -> Result<Option<TxOutput>, ChainError> {
        match self.store.get(&utxo_key(tx_hash, index))? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, tx_hash: &Hash256, index: u32) -> Result<bool, ChainError> {
        Ok(self.store.has(&utxo_key(tx_hash, index))?)
    }

    /// Whether the undo record for a block is present, i.e. whether the
    /// block's effect is currently applied to the set.
    pub fn has_undo(&self, block_hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.store.has(&undo_key(block_hash))?)
    }

    /// Apply a validated block to the UTXO set in one atomic batch.
    ///
    /// Inputs are consumed before outputs are created, against the state as
    /// it was before the block; a block cannot spend its own outputs. A
    /// missing input UTXO means validation was skipped or the store is
    /// corrupt and surfaces as an integrity error.
    pub fn apply(&self, block: &Block) -> Result<(), ChainError> {
        let batch = self.build_apply(block)?;
        self.store.write_batch(batch)?;
        Ok(())
    }

    /// Build the batch for [`apply`](Self::apply) without committing it, so
    /// the caller can append the tip-marker update to the same atomic unit.
    pub(crate) fn build_apply(&self, block: &Block) -> Result<WriteBatch, ChainError> {
        let mut undo = BlockUndo::default();
        let mut batch = WriteBatch::new();

        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                let output = self
                    .get(&input.prev_tx_hash, input.prev_out_index)?
                    .ok_or_else(|| {
                        IntegrityError::UtxoMissing(format!(
                            "{}:{}",
                            input.prev_tx_hash, input.prev_out_index
                        ))
                    })?;
                undo.spent.push(UtxoRef {
                    tx_hash: input.prev_tx_hash,
                    index: input.prev_out_index,
                    output,
                });
                batch.delete(utxo_key(&input.prev_tx_hash, input.prev_out_index).to_vec());
            }
        }

        for tx in &block.transactions {
            let tx_hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                batch.put(
                    utxo_key(&tx_hash, index as u32).to_vec(),
                    codec::encode(output)?,
                );
            }
        }

        batch.put(
            undo_key(&block.header.hash()).to_vec(),
            codec::encode(&undo)?,
        );
        Ok(batch)
    }

    /// Reverse a previously applied block in one atomic batch: delete the
    /// outputs it created, restore the UTXOs it spent, consume its undo
    /// record.
    pub fn rollback(&self, block: &Block) -> Result<(), ChainError> {
        let block_hash = block.header.hash();
        let undo_bytes = self
            .store
            .get(&undo_key(&block_hash))?
            .ok_or_else(|| IntegrityError::UndoMissing(block_hash.to_string()))?;
        let undo: BlockUndo = codec::decode(&undo_bytes)?;

        let mut batch = WriteBatch::new();
        for tx in &block.transactions {
            let tx_hash = tx.hash();
            for index in 0..tx.outputs.len() {
                batch.delete(utxo_key(&tx_hash, index as u32).to_vec());
            }
        }
        for spent in &undo.spent {
            batch.put(
                utxo_key(&spent.tx_hash, spent.index).to_vec(),
                codec::encode(&spent.output)?,
            );
        }
        batch.delete(undo_key(&block_hash).to_vec());

        self.store.write_batch(batch)?;
        Ok(())
    }

    /// Every unspent output paying `address`. Scans the whole UTXO
    /// namespace; O(n) in the size of the set.
    pub fn find_by_address(&self, address: &Address) -> Result<Vec<UtxoRef>, ChainError> {
        let mut found = Vec::new();
        for (key, value) in self.store.iter_prefix(&[UTXO_PREFIX])? {
            let output: TxOutput = codec::decode(&value)?;
            if output.address != *address {
                continue;
            }
            // key = 'u' || tx_hash(32) || index(4 BE)
            let Some(tx_hash) = Hash256::from_slice(&key[1..33]) else {
                continue;
            };
            let index = u32::from_be_bytes([key[33], key[34], key[35], key[36]]);
            found.push(UtxoRef {
                tx_hash,
                index,
                output,
            });
        }
        Ok(found)
    }

    /// All unspent outputs, in key order.
    pub fn iter_all(&self) -> Result<Vec<UtxoRef>, ChainError> {
        let mut all = Vec::new();
        for (key, value) in self.store.iter_prefix(&[UTXO_PREFIX])? {
            let Some(tx_hash) = Hash256::from_slice(&key[1..33]) else {
                continue;
            };
            let index = u32::from_be_bytes([key[33], key[34], key[35], key[36]]);
            all.push(UtxoRef {
                tx_hash,
                index,
                output: codec::decode(&value)?,
            });
        }
        Ok(all)
    }
}
