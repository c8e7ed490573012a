//! Network consensus parameters.
//!
//! Everything height- or time-dependent about rule activation lives here,
//! so the rules engine and the interpreter stay pure functions of
//! (params, context). No global state.

use crate::constants::*;
use crate::pow::U256;
use crate::script::ScriptFlags;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    /// Confirmations before a coinbase output may be spent.
    pub coinbase_maturity: u64,
    /// Ceiling on serialized block size.
    pub max_block_size: usize,
    /// Easiest permitted target.
    pub pow_limit: U256,
    /// Compact encoding of `pow_limit`.
    pub pow_limit_bits: u32,
    /// Blocks per difficulty retarget.
    pub difficulty_adjustment_interval: u64,
    /// Intended seconds per block.
    pub target_spacing: u64,
    /// Intended seconds per retarget window.
    pub target_timespan: u64,
    /// Skip the retarget schedule and accept the minimum difficulty
    /// everywhere (test networks).
    pub no_retargeting: bool,
    /// Emergency difficulty adjustment enabled.
    pub eda_enabled: bool,
    /// Height from which strict DER, low-S and NULLFAIL apply.
    pub strict_sig_height: u64,
    /// Height activating CHECKLOCKTIMEVERIFY.
    pub cltv_height: u64,
    /// Height activating CHECKSEQUENCEVERIFY and BIP68 sequence locks.
    pub csv_height: u64,
    /// Height activating CHECKDATASIG and push-only unlocking scripts.
    pub checkdatasig_height: u64,
    /// Height activating Schnorr multisig and the sigchecks budget.
    pub sigchecks_height: u64,
}

impl ConsensusParams {
    pub fn mainnet() -> Self {
        // Limit target 2^224 - 1, compact 0x1d00ffff.
        let pow_limit = U256::from_compact(0x1d00ffff);
        ConsensusParams {
            coinbase_maturity: COINBASE_MATURITY,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            pow_limit,
            pow_limit_bits: 0x1d00ffff,
            difficulty_adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_spacing: TARGET_BLOCK_SPACING,
            target_timespan: TARGET_TIMESPAN,
            no_retargeting: false,
            eda_enabled: true,
            strict_sig_height: 0,
            cltv_height: 0,
            csv_height: 0,
            checkdatasig_height: 0,
            sigchecks_height: 0,
        }
    }

    /// Local test network: trivially easy work, no retargeting, short
    /// maturity so scenarios stay small.
    pub fn regtest() -> Self {
        let pow_limit = U256::from_compact(0x207fffff);
        ConsensusParams {
            coinbase_maturity: COINBASE_MATURITY,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            pow_limit,
            pow_limit_bits: 0x207fffff,
            difficulty_adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_spacing: TARGET_BLOCK_SPACING,
            target_timespan: TARGET_TIMESPAN,
            no_retargeting: true,
            eda_enabled: false,
            strict_sig_height: 0,
            cltv_height: 0,
            csv_height: 0,
            checkdatasig_height: 0,
            sigchecks_height: 0,
        }
    }

    pub fn csv_active(&self, height: u64) -> bool {
        height >= self.csv_height
    }

    /// Mandatory interpreter flags for a block at `height`.
    pub fn script_flags_for_height(&self, height: u64) -> ScriptFlags {
        let mut flags = ScriptFlags::empty();
        if height >= self.strict_sig_height {
            flags |= ScriptFlags::STRICTENC | ScriptFlags::LOW_S;
        }
        if height >= self.cltv_height {
            flags |= ScriptFlags::CHECKLOCKTIMEVERIFY;
        }
        if height >= self.csv_height {
            flags |= ScriptFlags::CHECKSEQUENCEVERIFY;
        }
        if height >= self.checkdatasig_height {
            flags |= ScriptFlags::CHECKDATASIG | ScriptFlags::SIGPUSHONLY;
        }
        if height >= self.sigchecks_height {
            flags |= ScriptFlags::SCHNORR_MULTISIG
                | ScriptFlags::ENFORCE_SIGCHECKS
                | ScriptFlags::MINIMALDATA
                | ScriptFlags::MINIMALNUM
                | ScriptFlags::CLEANSTACK
                | ScriptFlags::MINIMALIF;
        }
        flags
    }

    /// Block subsidy at `height`, halving on schedule until it reaches
    /// zero.
    pub fn block_subsidy(&self, height: u64) -> i64 {
        let halvings = height / HALVING_INTERVAL;
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }
}
