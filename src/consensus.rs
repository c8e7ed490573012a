//! Consensus rules engine: the pure validation functions the chain state
//! machine composes. Context-free checks depend only on the object itself;
//! contextual checks additionally take the UTXO view and header context.

use crate::amount::Amount;
use crate::coins::{Coin, CoinsCache, CoinsView};
use crate::constants::*;
use crate::error::{BlockError, ConsensusError, TxError};
use crate::merkle::merkle_root_and_mutation;
use crate::params::ConsensusParams;
use crate::serialize::Encodable;
use crate::types::{Block, Transaction};
use std::collections::HashSet;

/// Structural transaction checks needing no chain context.
pub fn check_transaction(tx: &Transaction) -> Result<(), TxError> {
    if tx.inputs.is_empty() {
        return Err(TxError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(TxError::NoOutputs);
    }
    if tx.serialized_size() > MAX_TX_SIZE {
        return Err(TxError::Oversized);
    }

    let mut total = Amount::ZERO;
    for output in &tx.outputs {
        if !output.value.is_valid_output_value() {
            return Err(TxError::OutputValueOutOfRange);
        }
        total = total
            .checked_add(output.value)
            .filter(|t| t.is_valid_output_value())
            .ok_or(TxError::TotalOutputOutOfRange)?;
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prevout) {
            return Err(TxError::DuplicateInput(input.prevout.to_string()));
        }
    }

    if tx.is_coinbase() {
        let len = tx.inputs[0].script_sig.len();
        if !(2..=100).contains(&len) {
            return Err(TxError::BadCoinbaseLength);
        }
    } else {
        for input in &tx.inputs {
            if input.prevout.is_null() {
                return Err(TxError::NullPrevout);
            }
        }
    }
    Ok(())
}

/// Lock-time finality at a given (height, median-time-past) point.
pub fn is_final_tx(tx: &Transaction, height: u64, mtp: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        height
    } else {
        u64::from(mtp)
    };
    if u64::from(tx.lock_time) < cutoff {
        return true;
    }
    // A transaction with every input final ignores its lock time.
    tx.inputs.iter().all(|i| i.sequence == SEQUENCE_FINAL)
}

/// Contextual input checks against a UTXO view confirmed at `height`.
/// Returns the fee on success. A view read failure propagates as itself;
/// only a coin that is genuinely absent is a missing-input violation.
pub fn check_tx_inputs<V: CoinsView>(
    tx: &Transaction,
    view: &V,
    height: u64,
    params: &ConsensusParams,
) -> Result<Amount, ConsensusError> {
    let mut input_total = Amount::ZERO;
    for (index, input) in tx.inputs.iter().enumerate() {
        let coin = view
            .get_coin(&input.prevout)?
            .ok_or(TxError::MissingInput { index })?;
        if coin.is_coinbase {
            let depth = height.saturating_sub(u64::from(coin.height));
            if depth < params.coinbase_maturity {
                return Err(TxError::PrematureCoinbaseSpend { depth }.into());
            }
        }
        input_total = input_total
            .checked_add(coin.output.value)
            .filter(|t| t.is_in_range())
            .ok_or(TxError::TotalInputOutOfRange)?;
    }

    let output_total = tx
        .total_output_value()
        .ok_or(TxError::TotalOutputOutOfRange)?;
    if output_total > input_total {
        return Err(TxError::FeeOutOfRange {
            input: input_total.sats(),
            output: output_total.sats(),
        }
        .into());
    }
    let fee = input_total
        .checked_sub(output_total)
        .filter(|f| f.is_in_range())
        .ok_or(TxError::FeeOutOfRange {
            input: input_total.sats(),
            output: output_total.sats(),
        })?;
    Ok(fee)
}

/// Relative lock-time (sequence) checks. `coin_heights[i]` is the height
/// at which input i's coin was confirmed; inputs from the mempool use
/// `spend_height` itself.
pub fn check_sequence_locks(
    tx: &Transaction,
    coin_heights: &[u32],
    spend_height: u64,
    coin_mtps: &[u32],
    spend_mtp: u32,
) -> Result<(), TxError> {
    if tx.version < 2 {
        return Ok(());
    }
    for (input, (&coin_height, &coin_mtp)) in tx
        .inputs
        .iter()
        .zip(coin_heights.iter().zip(coin_mtps.iter()))
    {
        if input.sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            continue;
        }
        let value = u64::from(input.sequence & SEQUENCE_LOCKTIME_MASK);
        if input.sequence & SEQUENCE_LOCKTIME_TYPE_FLAG != 0 {
            // Time-based: value counts 512s granules from the coin's MTP.
            let lock_until = u64::from(coin_mtp) + (value << SEQUENCE_LOCKTIME_GRANULARITY);
            if lock_until > u64::from(spend_mtp) {
                return Err(TxError::SequenceLocked);
            }
        } else {
            let lock_until = u64::from(coin_height) + value;
            if lock_until > spend_height {
                return Err(TxError::SequenceLocked);
            }
        }
    }
    Ok(())
}

/// Structural block checks: coinbase placement, merkle commitment with
/// mutation detection, size ceiling. Header PoW is checked separately by
/// the caller since it needs chain context for the bits.
pub fn check_block_structure(block: &Block, params: &ConsensusParams) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        return Err(BlockError::Empty);
    }
    if block.serialized_size() > params.max_block_size {
        return Err(BlockError::Oversized);
    }

    if !block.transactions[0].is_coinbase() {
        return Err(BlockError::MissingCoinbase);
    }
    for (i, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() {
            return Err(BlockError::ExtraCoinbase(i));
        }
    }

    let txids = block.txids();
    let (root, mutated) = merkle_root_and_mutation(&txids);
    if mutated {
        return Err(BlockError::MutatedMerkleTree);
    }
    if root != block.header.merkle_root {
        return Err(BlockError::BadMerkleRoot);
    }

    for tx in &block.transactions {
        check_transaction(tx)?;
    }
    Ok(())
}

/// Block-wide sigchecks ceiling scales with the size ceiling.
pub fn max_block_sigchecks(params: &ConsensusParams) -> u64 {
    (params.max_block_size / BLOCK_SIGCHECKS_DIVISOR) as u64
}

/// Coinbase may claim at most subsidy + fees.
pub fn check_coinbase_value(
    block: &Block,
    fees: Amount,
    height: u64,
    params: &ConsensusParams,
) -> Result<(), BlockError> {
    let claimed = match block.transactions[0].total_output_value() {
        Some(v) => v,
        None => {
            return Err(BlockError::Tx(TxError::TotalOutputOutOfRange));
        }
    };
    let allowed = Amount::from_sats(params.block_subsidy(height))
        .checked_add(fees)
        .unwrap_or(Amount::MAX);
    if claimed > allowed {
        return Err(BlockError::BadCoinbaseValue {
            claimed: claimed.sats(),
            allowed: allowed.sats(),
        });
    }
    Ok(())
}

/// Overwrite guard: a new coinbase must not shadow an existing unspent
/// coin with the same txid.
pub fn check_coinbase_overwrite<V: CoinsView>(
    block: &Block,
    view: &CoinsCache<V>,
) -> Result<(), BlockError> {
    let coinbase = &block.transactions[0];
    let txid = coinbase.txid();
    for vout in 0..coinbase.outputs.len() as u32 {
        let outpoint = crate::types::OutPoint::new(txid, vout);
        if view.have_coin(&outpoint).unwrap_or(false) {
            return Err(BlockError::CoinbaseOverwrite);
        }
    }
    Ok(())
}

/// Record of what connecting one transaction consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxUndo {
    pub spent_coins: Vec<Coin>,
}

/// Per-block undo data, one entry per non-coinbase transaction in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUndo {
    pub tx_undos: Vec<TxUndo>,
}
