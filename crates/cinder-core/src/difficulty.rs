//! Per-block difficulty steering via an EMA of observed block times.
//!
//! Each block updates an exponential moving average of the inter-block
//! interval (`alpha = 95/1000`, integer arithmetic with truncation). When
//! the EMA drifts below 75% of the target block time the difficulty rises
//! by one; above 150% it falls by one, floored at
//! [`MIN_DIFFICULTY`](crate::constants::MIN_DIFFICULTY).
//!
//! The pair `(difficulty, ema_block_time)` is a deterministic function of
//! the parent header and the child's timestamp, and validation recomputes
//! it exactly.

use crate::constants::{
    EMA_ALPHA_DEN, EMA_ALPHA_NUM, EMA_LOWER_BOUND, EMA_UPPER_BOUND, MAX_DIFFICULTY,
    MIN_DIFFICULTY,
};
use crate::types::Header;

/// Compute the difficulty and EMA block time for a child of `parent` at
/// `new_timestamp`.
///
/// A child of genesis inherits the genesis values unchanged.
pub fn next_difficulty(parent: &Header, new_timestamp: i64) -> (u32, i64) {
    if parent.height == 0 {
        return (parent.difficulty, parent.ema_block_time);
    }

    let actual = new_timestamp - parent.timestamp;
    let new_ema =
        (EMA_ALPHA_NUM * actual + (EMA_ALPHA_DEN - EMA_ALPHA_NUM) * parent.ema_block_time)
            / EMA_ALPHA_DEN;

    let new_difficulty = if new_ema < EMA_LOWER_BOUND {
        parent.difficulty.saturating_add(1).min(MAX_DIFFICULTY)
    } else if new_ema > EMA_UPPER_BOUND {
        parent.difficulty.saturating_sub(1).max(MIN_DIFFICULTY)
    } else {
        parent.difficulty
    };

    (new_difficulty, new_ema)
}
