//! Consensus constants. All timestamps are Unix seconds.

/// Target time between blocks, in seconds.
pub const TARGET_BLOCK_TIME_SECS: i64 = 15;

/// EMA smoothing factor numerator (alpha = 95/1000, roughly 2/(N+1) for N=20).
pub const EMA_ALPHA_NUM: i64 = 95;
/// EMA smoothing factor denominator.
pub const EMA_ALPHA_DEN: i64 = 1000;

/// EMA below this raises difficulty by one. 75% of the target block time.
pub const EMA_LOWER_BOUND: i64 = TARGET_BLOCK_TIME_SECS - TARGET_BLOCK_TIME_SECS / 4;
/// EMA above this lowers difficulty by one. 150% of the target block time.
pub const EMA_UPPER_BOUND: i64 = TARGET_BLOCK_TIME_SECS + TARGET_BLOCK_TIME_SECS / 2;

pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 255;

/// Fixed per-block coinbase subsidy. The genesis coinbase is exempt (it
/// mints the configured initial supply instead).
pub const BLOCK_SUBSIDY: u64 = 50;

/// Genesis timestamp: 2024-01-01T00:00:00Z.
pub const GENESIS_TIMESTAMP: i64 = 1_704_067_200;

pub const DEFAULT_MEMPOOL_CAPACITY: usize = 4096;
pub const DEFAULT_MAX_BLOCK_TXS: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_bounds() {
        assert_eq!(EMA_LOWER_BOUND, 12);
        assert_eq!(EMA_UPPER_BOUND, 22);
    }

    #[test]
    fn genesis_timestamp_is_2024() {
        // 19723 days between 1970-01-01 and 2024-01-01.
        assert_eq!(GENESIS_TIMESTAMP, 19_723 * 86_400);
    }
}
