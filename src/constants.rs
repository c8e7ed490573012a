//! Consensus constants shared across the validation kernel.

/// Satoshis per coin.
pub const COIN: i64 = 100_000_000;

/// Maximum money supply: 21,000,000 coins in satoshis.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Maximum serialized transaction size accepted by consensus.
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Default ceiling for serialized block size. Runtime-configurable via
/// `ConsensusParams::max_block_size`.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 32_000_000;

/// Maximum script length in bytes.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single stack element.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum combined stack + altstack depth during script execution.
pub const MAX_STACK_SIZE: usize = 1_000;

/// Maximum number of non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum keys participating in a CHECKMULTISIG.
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// One sigcheck is allowed per this many bytes of unlocking script, on top
/// of the flat allowance. Bounds verification cost linearly in input size.
pub const SIGCHECKS_DENSITY_DIVISOR: usize = 43;
pub const SIGCHECKS_FLAT_ALLOWANCE: u64 = 1;

/// Sigchecks ceiling per block: one per this many bytes of the block size
/// ceiling.
pub const BLOCK_SIGCHECKS_DIVISOR: usize = 141;

/// Spends of a coinbase output must wait this many confirmations.
pub const COINBASE_MATURITY: u64 = 100;

/// Halving interval in blocks.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Initial block subsidy: 50 coins.
pub const INITIAL_SUBSIDY: i64 = 50 * COIN;

/// Difficulty adjustment interval in blocks.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target spacing between blocks, in seconds.
pub const TARGET_BLOCK_SPACING: u64 = 600;

/// Expected seconds per difficulty adjustment window.
pub const TARGET_TIMESPAN: u64 = DIFFICULTY_ADJUSTMENT_INTERVAL * TARGET_BLOCK_SPACING;

/// Number of headers feeding the median-time-past calculation.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// A header timestamp may not exceed local time by more than this.
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Lock times below this threshold are block heights, above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence value that disables lock-time semantics for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// BIP68: relative lock-time disabled when this bit is set.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// BIP68: when set, the locked value counts 512-second units, not blocks.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// BIP68: mask extracting the relative lock value from a sequence.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// BIP68 time-based locks count 2^9-second units.
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9;
