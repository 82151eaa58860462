//! Core chain types: hashes, addresses, transactions, blocks, undo records.
//!
//! Header hashes and transaction signing hashes use explicit fixed byte
//! layouts rather than the storage codec, so the header hash is independent
//! of cumulative work and the signing hash is independent of signatures and
//! public keys by construction.

use std::fmt;
use std::ops::Add;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::keccak256;

/// A 32-byte Keccak-256 digest. The zero hash is reserved as "none".
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash, used as the coinbase prev-tx marker and the genesis
    /// prev-hash.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from a 32-byte slice. Returns `None` on length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Parse from lowercase hex (64 characters, no prefix).
    pub fn from_hex(s: &str) -> Option<Self> {
        Self::from_slice(&hex::decode(s).ok()?)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte account identifier: the trailing 20 bytes of the Keccak-256
/// digest of an Ed25519 public key.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse from lowercase hex (40 characters, no prefix).
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 20] = bytes.as_slice().try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Accumulated proof-of-work, an arbitrary-precision non-negative integer.
///
/// Encodes as minimal-length big-endian bytes behind the codec's length
/// prefix. Ordering is numeric, which is what fork choice compares.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Work(BigUint);

impl Work {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }
}

impl From<BigUint> for Work {
    fn from(v: BigUint) -> Self {
        Self(v)
    }
}

impl From<u64> for Work {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl Add<&Work> for &Work {
    type Output = Work;

    fn add(self, rhs: &Work) -> Work {
        Work(&self.0 + &rhs.0)
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Work {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_bytes_be().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Work {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Ok(Self(BigUint::from_bytes_be(&bytes)))
    }
}

/// A transaction input, spending one prior output.
///
/// The coinbase input carries a zero `prev_tx_hash` and empty key and
/// signature fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    /// Hash of the transaction whose output is being spent.
    pub prev_tx_hash: Hash256,
    /// Index of the output within that transaction.
    pub prev_out_index: u32,
    /// Ed25519 public key (32 bytes). Empty for coinbase inputs.
    pub public_key: Vec<u8>,
    /// Ed25519 signature (64 bytes). Empty for coinbase inputs.
    pub signature: Vec<u8>,
}

/// A transaction output: a value assigned to an address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub address: Address,
}

/// A transfer of value: ordered inputs consuming UTXOs, ordered outputs
/// creating new ones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// The transaction hash, which doubles as the message every input signs.
    ///
    /// Commits to all input outpoints and all outputs over a fixed byte
    /// layout. Signatures and public keys are excluded so the digest is
    /// stable across signing.
    pub fn hash(&self) -> Hash256 {
        let mut data =
            Vec::with_capacity(16 + self.inputs.len() * 36 + self.outputs.len() * 28);
        data.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.prev_tx_hash.as_bytes());
            data.extend_from_slice(&input.prev_out_index.to_le_bytes());
        }
        data.extend_from_slice(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(output.address.as_bytes());
        }
        keccak256(&data)
    }

    /// A coinbase has exactly one input whose prev-tx-hash is zero.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_tx_hash.is_zero()
    }

    /// Sum of all output values. `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// Block header. `cumulative_work` is set by the chain manager when the
/// block is integrated and never feeds into the header hash.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    /// Hash of the parent header. Zero only for genesis.
    pub prev_hash: Hash256,
    /// Chain height. Zero only for genesis.
    pub height: u32,
    pub merkle_root: Hash256,
    /// Unix seconds.
    pub timestamp: i64,
    /// Leading-zero-bit count of the target: target = 2^(256 - difficulty).
    pub difficulty: u32,
    pub nonce: u64,
    /// Exponential moving average of observed inter-block time, seconds.
    pub ema_block_time: i64,
    /// Total work on the chain ending at this block.
    pub cumulative_work: Work,
}

impl Header {
    /// Byte length of the fixed hashing layout.
    const HASH_SIZE: usize = 4 + 32 + 4 + 32 + 8 + 4 + 8 + 8;

    /// The block hash: Keccak-256 over a fixed layout of every header field
    /// except `cumulative_work`.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.difficulty.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        data.extend_from_slice(&self.ema_block_time.to_le_bytes());
        keccak256(&data)
    }
}

/// A header plus its ordered transaction list. The first transaction is the
/// coinbase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// A reference to one unspent output, as stored in undo records and
/// returned by address scans.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UtxoRef {
    pub tx_hash: Hash256,
    pub index: u32,
    pub output: TxOutput,
}

/// Per-block undo record: the UTXOs the block consumed, in spend order.
/// Sufficient to reverse the block's effect on the UTXO set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockUndo {
    pub spent: Vec<UtxoRef>,
}
