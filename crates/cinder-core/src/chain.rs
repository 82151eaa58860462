//! The chain manager: header index, tip tracking, validation pipeline, and
//! heaviest-work fork choice with crash-safe reorganization.
//!
//! One value owns the header index and the tip, guarded by a single
//! reader/writer lock. Exactly one writer at a time runs the
//! validate-then-apply pipeline; readers serve queries from a consistent
//! snapshot because every UTXO mutation happens under the write lock.
//!
//! Crash safety: a straight tip extension commits the UTXO delta, the undo
//! record, and the tip marker in one atomic batch. A reorganization first
//! journals its endpoints under [`REORG_KEY`], performs per-block atomic
//! rollbacks and applies, then advances the tip marker and clears the
//! journal together. [`Chain::open`] completes any journaled reorg it finds,
//! using undo-record presence to tell which blocks are currently applied.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::block_store::BlockStore;
use crate::codec;
use crate::constants::BLOCK_SUBSIDY;
use crate::crypto;
use crate::difficulty;
use crate::error::{ChainError, IntegrityError, StoreError, TxError, ValidationError};
use crate::genesis::{self, GenesisParams};
use crate::merkle;
use crate::pow;
use crate::store::{KvStore, WriteBatch};
use crate::types::{Address, Block, Hash256, Header, Transaction, UtxoRef};
use crate::utxo::UtxoSet;

/// Tip marker: the 32-byte hash of the active tip.
pub const HEAD_KEY: &[u8] = b"head";
/// Journal for an in-progress reorganization.
const REORG_KEY: &[u8] = b"reorg";

/// Endpoints of a reorganization in flight, persisted before any UTXO
/// mutation so a crash can be recovered.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
struct ReorgJournal {
    old_tip: Hash256,
    new_tip: Hash256,
}

/// How [`Chain::add_block`] integrated a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Extended the active tip.
    Connected,
    /// Triggered a reorganization onto a heavier branch.
    Reorganized,
    /// Stored on a side branch with no state change.
    SideChain,
    /// Already indexed; treated as success.
    AlreadyKnown,
}

struct ChainInner {
    /// Every known header, main chain and side branches alike.
    headers: HashMap<Hash256, Header>,
    /// Header of the heaviest-work tip.
    head: Header,
}

/// The chain state machine.
pub struct Chain<S: KvStore> {
    store: Arc<S>,
    blocks: BlockStore<S>,
    utxo: UtxoSet<S>,
    inner: RwLock<ChainInner>,
}

impl<S: KvStore> Chain<S> {
    /// Open chain state on a store. Creates and persists genesis when no
    /// tip marker exists; otherwise rebuilds the header index from the
    /// block store and completes any interrupted reorganization.
    pub fn open(store: Arc<S>, params: &GenesisParams) -> Result<Self, ChainError> {
        let blocks = BlockStore::new(Arc::clone(&store));
        let utxo = UtxoSet::new(Arc::clone(&store));

        match store.get(HEAD_KEY)? {
            None => {
                let block = genesis::build(params)?;
                let hash = block.header.hash();
                blocks.put(&block)?;
                let mut batch = utxo.build_apply(&block)?;
                batch.put(HEAD_KEY.to_vec(), hash.as_bytes().to_vec());
                store.write_batch(batch)?;

                info!(%hash, difficulty = params.initial_difficulty, "created genesis block");
                let mut headers = HashMap::new();
                headers.insert(hash, block.header.clone());
                Ok(Self {
                    store,
                    blocks,
                    utxo,
                    inner: RwLock::new(ChainInner {
                        headers,
                        head: block.header,
                    }),
                })
            }
            Some(bytes) => {
                let head_hash = Hash256::from_slice(&bytes).ok_or_else(|| {
                    StoreError::Corrupt(format!("tip marker has length {}", bytes.len()))
                })?;

                let mut headers = HashMap::new();
                for (hash, header) in blocks.scan_headers()? {
                    headers.insert(hash, header);
                }
                let head = headers
                    .get(&head_hash)
                    .cloned()
                    .ok_or_else(|| IntegrityError::HeaderMissing(head_hash.to_string()))?;
                debug!(headers = headers.len(), height = head.height, "loaded chain state");

                let chain = Self {
                    store,
                    blocks,
                    utxo,
                    inner: RwLock::new(ChainInner { headers, head }),
                };
                chain.resume_reorg()?;
                Ok(chain)
            }
        }
    }

    /// Header of the active tip.
    pub fn head(&self) -> Header {
        self.inner.read().head.clone()
    }

    /// Hash of the active tip.
    pub fn head_hash(&self) -> Hash256 {
        self.inner.read().head.hash()
    }

    /// Validate and integrate a block.
    ///
    /// A valid block extending the tip is applied to the UTXO set; a valid
    /// block on a heavier side branch triggers a reorganization; a lighter
    /// side-branch block is retained without touching state. A block
    /// already in the index is a no-op success.
    pub fn add_block(&self, mut block: Block) -> Result<BlockOutcome, ChainError> {
        let mut inner = self.inner.write();
        let hash = block.header.hash();

        if inner.headers.contains_key(&hash) {
            return Ok(BlockOutcome::AlreadyKnown);
        }

        self.validate_with_inner(&mut inner, &block)?;

        // Stamp the cumulative work before persisting; it is excluded from
        // the header hash, so the hash is unchanged.
        let own_work = pow::work(block.header.difficulty);
        block.header.cumulative_work = if block.header.height == 0 {
            own_work
        } else {
            let parent = inner
                .headers
                .get(&block.header.prev_hash)
                .ok_or_else(|| IntegrityError::HeaderMissing(block.header.prev_hash.to_string()))?;
            &parent.cumulative_work + &own_work
        };

        self.blocks.put(&block)?;
        inner.headers.insert(hash, block.header.clone());

        let head_hash = inner.head.hash();
        if block.header.prev_hash == head_hash {
            // Straight extension: UTXO delta, undo record, and tip marker
            // commit as one batch.
            let mut batch = self.utxo.build_apply(&block)?;
            batch.put(HEAD_KEY.to_vec(), hash.as_bytes().to_vec());
            self.store.write_batch(batch)?;
            inner.head = block.header;
            info!(height = inner.head.height, %hash, "extended chain");
            Ok(BlockOutcome::Connected)
        } else if block.header.cumulative_work > inner.head.cumulative_work {
            info!(
                height = block.header.height,
                %hash,
                work = %block.header.cumulative_work,
                "heavier branch found, reorganizing"
            );
            self.perform_reorg(&mut inner, head_hash, hash)?;
            Ok(BlockOutcome::Reorganized)
        } else {
            debug!(height = block.header.height, %hash, "retained side-chain block");
            Ok(BlockOutcome::SideChain)
        }
    }

    /// Pure validation against current state; no side effects beyond
    /// adopting the parent header into the index.
    pub fn validate_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        self.validate_with_inner(&mut inner, block)
    }

    /// Validate a transaction against the current UTXO set.
    ///
    /// A coinbase is always accepted. Otherwise every input must reference
    /// a live UTXO owned by the input's public key, every signature must
    /// verify, and the outputs must not exceed the inputs.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ChainError> {
        // Hold the read lock so the lookup cannot interleave with a reorg.
        let _inner = self.inner.read();
        self.check_transaction(tx).map(|_| ())
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        let _inner = self.inner.read();
        self.blocks.get(hash)
    }

    pub fn get_header(&self, hash: &Hash256) -> Result<Option<Header>, ChainError> {
        Ok(self.inner.read().headers.get(hash).cloned())
    }

    /// The main-chain path from `from` (inclusive) to the tip, in forward
    /// order. Errors when `from` is not on the path from tip to genesis.
    pub fn get_blocks_from(&self, from: &Hash256) -> Result<Vec<Block>, ChainError> {
        let inner = self.inner.read();
        let mut path = Vec::new();
        let mut current = inner.head.hash();
        loop {
            let block = self
                .blocks
                .get(&current)?
                .ok_or_else(|| IntegrityError::BlockMissing(current.to_string()))?;
            let height = block.header.height;
            let prev = block.header.prev_hash;
            path.push(block);
            if current == *from {
                break;
            }
            if height == 0 {
                return Err(ChainError::NotInMainChain(from.to_string()));
            }
            current = prev;
        }
        path.reverse();
        Ok(path)
    }

    pub fn get_utxo(&self, tx_hash: &Hash256, index: u32) -> Result<Option<crate::types::TxOutput>, ChainError> {
        let _inner = self.inner.read();
        self.utxo.get(tx_hash, index)
    }

    /// Every unspent output paying `address`. Full scan of the UTXO
    /// namespace; O(n) convenience for wallets and the API.
    pub fn find_utxos(&self, address: &Address) -> Result<Vec<UtxoRef>, ChainError> {
        let _inner = self.inner.read();
        self.utxo.find_by_address(address)
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn validate_with_inner(
        &self,
        inner: &mut ChainInner,
        block: &Block,
    ) -> Result<(), ChainError> {
        let header = &block.header;

        if header.height == 0 {
            if !header.prev_hash.is_zero() {
                return Err(ValidationError::GenesisNonZeroPrev.into());
            }
        } else {
            if header.prev_hash.is_zero() {
                return Err(ValidationError::NonGenesisZeroPrev.into());
            }

            let parent = match inner.headers.get(&header.prev_hash) {
                Some(parent) => parent.clone(),
                // Fall back to the block store and adopt the header into
                // the index for future lookups.
                None => match self.blocks.get_header(&header.prev_hash)? {
                    Some(parent) => {
                        inner.headers.insert(header.prev_hash, parent.clone());
                        parent
                    }
                    None => {
                        return Err(
                            ValidationError::UnknownParent(header.prev_hash.to_string()).into()
                        )
                    }
                },
            };

            if header.height != parent.height + 1 {
                return Err(ValidationError::BadHeight {
                    got: header.height,
                    expected: parent.height + 1,
                }
                .into());
            }

            let (expected_difficulty, expected_ema) =
                difficulty::next_difficulty(&parent, header.timestamp);
            if header.difficulty != expected_difficulty {
                return Err(ValidationError::BadDifficulty {
                    got: header.difficulty,
                    expected: expected_difficulty,
                }
                .into());
            }
            if header.ema_block_time != expected_ema {
                return Err(ValidationError::BadEmaBlockTime {
                    got: header.ema_block_time,
                    expected: expected_ema,
                }
                .into());
            }
        }

        if !pow::check(header) {
            return Err(ValidationError::InvalidPow.into());
        }

        match block.transactions.first() {
            None => return Err(ValidationError::NoCoinbase.into()),
            Some(first) if !first.is_coinbase() => {
                return Err(ValidationError::FirstTxNotCoinbase.into())
            }
            Some(_) => {}
        }
        if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
            return Err(ValidationError::MultipleCoinbase.into());
        }

        let tx_hashes: Vec<Hash256> = block.transactions.iter().map(Transaction::hash).collect();
        if merkle::merkle_root(&tx_hashes) != header.merkle_root {
            return Err(ValidationError::BadMerkleRoot.into());
        }

        // Non-coinbase transactions: UTXO existence, ownership, signatures,
        // conservation, and no duplicate spends across the block.
        let mut spent: HashSet<(Hash256, u32)> = HashSet::new();
        let mut fees: u64 = 0;
        for (index, tx) in block.transactions.iter().enumerate().skip(1) {
            for input in &tx.inputs {
                if !spent.insert((input.prev_tx_hash, input.prev_out_index)) {
                    return Err(ValidationError::DoubleSpend(format!(
                        "{}:{}",
                        input.prev_tx_hash, input.prev_out_index
                    ))
                    .into());
                }
            }
            let fee = match self.check_transaction(tx) {
                Ok(fee) => fee,
                Err(ChainError::Transaction(source)) => {
                    return Err(ValidationError::Transaction { index, source }.into())
                }
                Err(other) => return Err(other),
            };
            fees = fees
                .checked_add(fee)
                .ok_or(ValidationError::Transaction {
                    index,
                    source: TxError::ValueOverflow,
                })?;
        }

        // Coinbase bound. Genesis is exempt: it mints the initial supply.
        if header.height > 0 {
            let coinbase_value = block.transactions[0]
                .total_output_value()
                .ok_or(ValidationError::Transaction {
                    index: 0,
                    source: TxError::ValueOverflow,
                })?;
            let max = BLOCK_SUBSIDY.saturating_add(fees);
            if coinbase_value > max {
                return Err(ValidationError::ExcessiveCoinbase {
                    got: coinbase_value,
                    max,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Check one non-coinbase transaction against the UTXO set and return
    /// its fee. Callers hold the chain lock.
    fn check_transaction(&self, tx: &Transaction) -> Result<u64, ChainError> {
        if tx.is_coinbase() {
            return Ok(0);
        }

        let mut input_sum: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let output = self
                .utxo
                .get(&input.prev_tx_hash, input.prev_out_index)?
                .ok_or_else(|| {
                    TxError::UnknownUtxo(format!(
                        "{}:{}",
                        input.prev_tx_hash, input.prev_out_index
                    ))
                })?;
            if crypto::address_of(&input.public_key) != output.address {
                return Err(TxError::OwnershipMismatch { index }.into());
            }
            input_sum = input_sum
                .checked_add(output.value)
                .ok_or(TxError::ValueOverflow)?;
        }

        crypto::verify_transaction(tx)?;

        let output_sum = tx.total_output_value().ok_or(TxError::ValueOverflow)?;
        if output_sum > input_sum {
            return Err(TxError::OutputsExceedInputs {
                inputs: input_sum,
                outputs: output_sum,
            }
            .into());
        }
        Ok(input_sum - output_sum)
    }

    // ------------------------------------------------------------------
    // Reorganization
    // ------------------------------------------------------------------

    /// Switch the active tip from `old_tip` to `new_tip`.
    ///
    /// Journals the endpoints, rolls back to the common ancestor, applies
    /// the new branch oldest-first, then advances the tip marker and clears
    /// the journal in one batch. Skips blocks whose undo-record state shows
    /// them already processed, which makes the same routine serve crash
    /// recovery.
    fn perform_reorg(
        &self,
        inner: &mut ChainInner,
        old_tip: Hash256,
        new_tip: Hash256,
    ) -> Result<(), ChainError> {
        let journal = ReorgJournal { old_tip, new_tip };
        self.store.put(REORG_KEY, &codec::encode(&journal)?)?;

        let ancestor = self.common_ancestor(inner, &old_tip, &new_tip)?;
        debug!(%ancestor, "reorg common ancestor");

        let rollback_path = self.path_between(inner, &old_tip, &ancestor)?;
        let mut apply_path = self.path_between(inner, &new_tip, &ancestor)?;
        apply_path.reverse();

        for hash in &rollback_path {
            if !self.utxo.has_undo(hash)? {
                continue;
            }
            let block = self
                .blocks
                .get(hash)?
                .ok_or_else(|| IntegrityError::BlockMissing(hash.to_string()))?;
            debug!(height = block.header.height, %hash, "rolling back block");
            self.utxo.rollback(&block)?;
        }

        for hash in &apply_path {
            if self.utxo.has_undo(hash)? {
                continue;
            }
            let block = self
                .blocks
                .get(hash)?
                .ok_or_else(|| IntegrityError::BlockMissing(hash.to_string()))?;
            debug!(height = block.header.height, %hash, "applying block");
            self.utxo.apply(&block)?;
        }

        let mut batch = WriteBatch::new();
        batch.put(HEAD_KEY.to_vec(), new_tip.as_bytes().to_vec());
        batch.delete(REORG_KEY.to_vec());
        self.store.write_batch(batch)?;

        inner.head = inner
            .headers
            .get(&new_tip)
            .cloned()
            .ok_or_else(|| IntegrityError::HeaderMissing(new_tip.to_string()))?;
        info!(height = inner.head.height, hash = %new_tip, "reorganization complete");
        Ok(())
    }

    /// Complete a journaled reorganization left by a crash.
    fn resume_reorg(&self) -> Result<(), ChainError> {
        let Some(bytes) = self.store.get(REORG_KEY)? else {
            return Ok(());
        };
        let journal: ReorgJournal = codec::decode(&bytes)?;
        warn!(
            old_tip = %journal.old_tip,
            new_tip = %journal.new_tip,
            "resuming interrupted reorganization"
        );
        let mut inner = self.inner.write();
        self.perform_reorg(&mut inner, journal.old_tip, journal.new_tip)
    }

    /// First hash on the path from `b` to genesis that also lies on the
    /// path from `a` to genesis.
    fn common_ancestor(
        &self,
        inner: &ChainInner,
        a: &Hash256,
        b: &Hash256,
    ) -> Result<Hash256, ChainError> {
        let path_a = self.path_between(inner, a, &Hash256::ZERO)?;
        let set_a: HashSet<Hash256> = path_a.into_iter().collect();
        for hash in self.path_between(inner, b, &Hash256::ZERO)? {
            if set_a.contains(&hash) {
                return Ok(hash);
            }
        }
        Err(IntegrityError::NoCommonAncestor.into())
    }

    /// Hashes from `start` toward genesis, stopping before `end` (or at
    /// genesis). Every hash on the path must be in the header index.
    fn path_between(
        &self,
        inner: &ChainInner,
        start: &Hash256,
        end: &Hash256,
    ) -> Result<Vec<Hash256>, ChainError> {
        let mut path = Vec::new();
        let mut current = *start;
        while current != *end && !current.is_zero() {
            path.push(current);
            let header = inner
                .headers
                .get(&current)
                .ok_or_else(|| IntegrityError::HeaderMissing(current.to_string()))?;
            if header.height == 0 {
                break;
            }
            current = header.prev_hash;
        }
        Ok(path)
    }
}
