//! Construction and mining of the height-0 block.
//!
//! Genesis is produced by the chain manager on first open, when no tip
//! marker exists. Its coinbase mints the configured initial supply; its
//! EMA seed is the target block time and its cumulative work is zero.

use crate::constants::{
    GENESIS_TIMESTAMP, MAX_DIFFICULTY, MIN_DIFFICULTY, TARGET_BLOCK_TIME_SECS,
};
use crate::error::{ChainError, ValidationError};
use crate::merkle;
use crate::pow;
use crate::types::{Address, Block, Hash256, Header, Transaction, TxInput, TxOutput, Work};

/// Parameters fixed at chain creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisParams {
    /// Recipient of the initial supply. May be the zero address.
    pub coinbase_address: Address,
    /// Value of the single genesis coinbase output.
    pub initial_supply: u64,
    /// Starting difficulty, inherited by the first mined block.
    pub initial_difficulty: u32,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            coinbase_address: Address::ZERO,
            initial_supply: 1000,
            initial_difficulty: 10,
        }
    }
}

/// Build and mine the genesis block.
///
/// Deterministic apart from the proof-of-work nonce, which is itself
/// deterministic given the search starts at zero: the same parameters
/// always produce the same block.
pub fn build(params: &GenesisParams) -> Result<Block, ChainError> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&params.initial_difficulty) {
        return Err(ValidationError::DifficultyOutOfRange(params.initial_difficulty).into());
    }

    let coinbase = Transaction {
        inputs: vec![TxInput {
            prev_tx_hash: Hash256::ZERO,
            prev_out_index: 0,
            public_key: vec![],
            signature: vec![],
        }],
        outputs: vec![TxOutput {
            value: params.initial_supply,
            address: params.coinbase_address,
        }],
    };

    let mut header = Header {
        version: 1,
        prev_hash: Hash256::ZERO,
        height: 0,
        merkle_root: merkle::merkle_root(&[coinbase.hash()]),
        timestamp: GENESIS_TIMESTAMP,
        difficulty: params.initial_difficulty,
        nonce: 0,
        ema_block_time: TARGET_BLOCK_TIME_SECS,
        cumulative_work: Work::zero(),
    };
    pow::mine(&mut header);

    Ok(Block {
        header,
        transactions: vec![coinbase],
    })
}
