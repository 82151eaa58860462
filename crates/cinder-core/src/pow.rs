//! Proof-of-work: target derivation, hash search, validation, work metric.
//!
//! A header is valid when its hash, read as a big-endian 256-bit integer,
//! is strictly below `target = 2^(256 - difficulty)`. The work a block
//! contributes is `2^256 / (target + 1)`.

use std::sync::atomic::{AtomicBool, Ordering};

use num_bigint::BigUint;
use num_traits::One;

use crate::types::{Hash256, Header, Work};

/// The threshold a valid header hash must fall below.
///
/// Defined for difficulties in `1..=255`; values outside saturate to the
/// hardest target. Callers validate the difficulty range before trusting a
/// header.
pub fn target(difficulty: u32) -> BigUint {
    BigUint::one() << 256usize.saturating_sub(difficulty as usize)
}

/// Check a header's proof of work against its own claimed difficulty.
pub fn check(header: &Header) -> bool {
    let hash_int = BigUint::from_bytes_be(header.hash().as_bytes());
    hash_int < target(header.difficulty)
}

/// The work metric for a block at the given difficulty:
/// `2^256 / (target + 1)`.
pub fn work(difficulty: u32) -> Work {
    let numerator = BigUint::one() << 256usize;
    Work::from(numerator / (target(difficulty) + BigUint::one()))
}

/// Search for a valid nonce, starting from zero. Unbounded; terminates for
/// every difficulty below 256. Returns the winning hash with the nonce
/// written into the header.
pub fn mine(header: &mut Header) -> Hash256 {
    let threshold = target(header.difficulty);
    let mut nonce = 0u64;
    loop {
        header.nonce = nonce;
        let hash = header.hash();
        if BigUint::from_bytes_be(hash.as_bytes()) < threshold {
            return hash;
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Like [`mine`], but aborts at the next nonce boundary once `cancel` is
/// set. Returns `None` when cancelled.
pub fn mine_cancellable(header: &mut Header, cancel: &AtomicBool) -> Option<Hash256> {
    let threshold = target(header.difficulty);
    let mut nonce = 0u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        header.nonce = nonce;
        let hash = header.hash();
        if BigUint::from_bytes_be(hash.as_bytes()) < threshold {
            return Some(hash);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Bounded search for tests: gives up after `max_attempts` nonces.
pub fn mine_bounded(header: &mut Header, max_attempts: u64) -> Option<Hash256> {
    let threshold = target(header.difficulty);
    for nonce in 0..max_attempts {
        header.nonce = nonce;
        let hash = header.hash();
        if BigUint::from_bytes_be(hash.as_bytes()) < threshold {
            return Some(hash);
        }
    }
    None
}
