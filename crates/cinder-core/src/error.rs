//! Error types for the Cinder chain core.
use thiserror::Error;

/// Rule violations in a single transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("malformed public key on input {index}")] MalformedPublicKey { index: usize },
    #[error("malformed signature on input {index}")] MalformedSignature { index: usize },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("input {index} public key does not own the referenced output")] OwnershipMismatch { index: usize },
    #[error("outputs exceed inputs: spend {outputs}, available {inputs}")] OutputsExceedInputs { inputs: u64, outputs: u64 },
    #[error("value overflow")] ValueOverflow,
}

/// Consensus-rule violations found while validating a block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown parent block: {0}")] UnknownParent(String),
    #[error("invalid height: got {got}, expected {expected}")] BadHeight { got: u32, expected: u32 },
    #[error("invalid difficulty: got {got}, expected {expected}")] BadDifficulty { got: u32, expected: u32 },
    #[error("invalid EMA block time: got {got}, expected {expected}")] BadEmaBlockTime { got: i64, expected: i64 },
    #[error("difficulty {0} outside valid range")] DifficultyOutOfRange(u32),
    #[error("invalid proof of work")] InvalidPow,
    #[error("invalid merkle root")] BadMerkleRoot,
    #[error("genesis block must have zero prev-hash")] GenesisNonZeroPrev,
    #[error("non-genesis block has zero prev-hash")] NonGenesisZeroPrev,
    #[error("block has no coinbase transaction")] NoCoinbase,
    #[error("first transaction is not the coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("double spend within block: {0}")] DoubleSpend(String),
    #[error("coinbase value {got} exceeds subsidy plus fees {max}")] ExcessiveCoinbase { got: u64, max: u64 },
    #[error("invalid transaction {index}: {source}")] Transaction { index: usize, source: TxError },
}

/// A corrupt or inconsistent store. Not retriable; the operation that hit
/// one of these must not be resumed without operator intervention.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("undo record missing for block {0}")] UndoMissing(String),
    #[error("header missing from index: {0}")] HeaderMissing(String),
    #[error("block missing from store: {0}")] BlockMissing(String),
    #[error("UTXO missing during apply: {0}")] UtxoMissing(String),
    #[error("no common ancestor between competing tips")] NoCommonAncestor,
}

/// Failures surfaced by the storage adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend: {0}")] Backend(String),
    #[error("corrupt stored value: {0}")] Corrupt(String),
}

/// Canonical-encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in mempool: {0}")] Duplicate(String),
    #[error("mempool is full")] Full,
}

/// Umbrella error for chain operations.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error(transparent)] Transaction(#[from] TxError),
    #[error(transparent)] Integrity(#[from] IntegrityError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error("block {0} is not on the main chain")] NotInMainChain(String),
}

impl ChainError {
    /// Whether this error indicates a corrupt store rather than bad input.
    pub fn is_integrity(&self) -> bool {
        matches!(self, ChainError::Integrity(_))
    }
}
