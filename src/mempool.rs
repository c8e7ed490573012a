//! Memory pool: unconfirmed transactions that passed admission under the
//! current tip's rules plus local relay policy.
//!
//! Policy rejections are deliberately a different error family from
//! consensus violations; a peer relaying an underpaying transaction is not
//! misbehaving.

use crate::amount::Amount;
use crate::coins::CoinsView;
use crate::consensus::{check_transaction, check_tx_inputs, is_final_tx};
use crate::error::{PolicyError, Result, TxError};
use crate::params::ConsensusParams;
use crate::script::{is_push_only, verify_script, TransactionSignatureChecker};
use crate::serialize::Encodable;
use crate::sigcache::SigCache;
use crate::types::{OutPoint, Transaction, TransactionRef};
use crate::hash::TxId;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Default minimum fee rate, satoshis per 1000 serialized bytes.
pub const DEFAULT_MIN_RELAY_FEE_PER_KB: i64 = 1_000;

/// Local policy knobs. Not consensus.
#[derive(Debug, Clone)]
pub struct MempoolPolicy {
    pub min_relay_fee_per_kb: i64,
    /// Policy ceiling on one transaction's serialized size.
    pub max_tx_size: usize,
}

impl Default for MempoolPolicy {
    fn default() -> Self {
        MempoolPolicy {
            min_relay_fee_per_kb: DEFAULT_MIN_RELAY_FEE_PER_KB,
            max_tx_size: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: TransactionRef,
    pub fee: Amount,
    pub size: usize,
}

/// The pool itself: entries by txid plus an index of spent outpoints for
/// conflict detection.
#[derive(Default)]
pub struct Mempool {
    entries: HashMap<TxId, MempoolEntry>,
    spends: HashMap<OutPoint, TxId>,
    policy: MempoolPolicy,
}

impl Mempool {
    pub fn new(policy: MempoolPolicy) -> Self {
        Mempool {
            entries: HashMap::new(),
            spends: HashMap::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &TxId) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Which pool transaction, if any, already spends this output.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<&TxId> {
        self.spends.get(outpoint)
    }

    fn insert(&mut self, entry: MempoolEntry) {
        let txid = entry.tx.txid();
        for input in &entry.tx.inputs {
            self.spends.insert(input.prevout, txid);
        }
        self.entries.insert(txid, entry);
    }

    pub fn remove(&mut self, txid: &TxId) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            self.spends.remove(&input.prevout);
        }
        Some(entry)
    }

    /// Drop everything a newly connected block made invalid: confirmed
    /// transactions and any pool entry conflicting with a confirmed spend.
    pub fn remove_for_block(&mut self, block_txs: &[Transaction]) {
        for tx in block_txs {
            self.remove(&tx.txid());
            for input in &tx.inputs {
                if let Some(conflict) = self.spends.get(&input.prevout).copied() {
                    self.remove(&conflict);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }
}

fn required_fee(size: usize, fee_per_kb: i64) -> i64 {
    (size as i64).saturating_mul(fee_per_kb) / 1000
}

/// Admission check: consensus validity against the current view at the
/// next block height, then local policy. On success the transaction is in
/// the pool.
pub fn accept_to_memory_pool<V: CoinsView>(
    tx: Transaction,
    view: &V,
    pool: &mut Mempool,
    params: &ConsensusParams,
    next_height: u64,
    mtp: u32,
    sigcache: &SigCache,
) -> Result<TxId> {
    let txid = tx.txid();
    if pool.contains(&txid) {
        return Err(PolicyError::AlreadyInMempool.into());
    }

    check_transaction(&tx)?;
    if tx.is_coinbase() {
        // A loose coinbase can never be valid.
        return Err(TxError::NullPrevout.into());
    }
    if !is_final_tx(&tx, next_height, mtp) {
        return Err(TxError::NonFinal.into());
    }

    let size = tx.serialized_size();
    if size > pool.policy.max_tx_size {
        return Err(PolicyError::TooLarge.into());
    }
    for input in &tx.inputs {
        if !is_push_only(&input.script_sig) {
            return Err(PolicyError::NonStandard("unlocking script is not push-only").into());
        }
        if pool.spender_of(&input.prevout).is_some() {
            return Err(PolicyError::MempoolConflict.into());
        }
    }
    for output in &tx.outputs {
        if output.script_pubkey.is_empty() {
            return Err(PolicyError::NonStandard("empty locking script").into());
        }
    }

    let fee = check_tx_inputs(&tx, view, next_height, params)?;
    let required = required_fee(size, pool.policy.min_relay_fee_per_kb);
    if fee.sats() < required {
        return Err(PolicyError::FeeBelowMinimum {
            fee: fee.sats(),
            required,
        }
        .into());
    }

    // Scripts under the *current* flag set, with policy bits on top.
    let flags = params.script_flags_for_height(next_height)
        | crate::script::ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS;
    for (index, input) in tx.inputs.iter().enumerate() {
        let coin = view
            .get_coin(&input.prevout)?
            .ok_or(TxError::MissingInput { index })?;
        let mut checker =
            TransactionSignatureChecker::new(&tx, index, &coin.output).with_cache(sigcache);
        verify_script(&input.script_sig, &coin.output.script_pubkey, flags, &mut checker)
            .map_err(|error| TxError::ScriptFailure { index, error })?;
    }

    debug!("mempool accept {txid}: {} bytes, fee {fee}", size);
    pool.insert(MempoolEntry {
        tx: Arc::new(tx),
        fee,
        size,
    });
    Ok(txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coins::{Coin, CoinsCache, EmptyCoinsView};
    use crate::constants::{COIN, SEQUENCE_FINAL};
    use crate::error::ConsensusError;
    use crate::types::{TxIn, TxOut};

    fn funded_view() -> (CoinsCache<EmptyCoinsView>, OutPoint) {
        let mut cache = CoinsCache::new(EmptyCoinsView);
        let prev = OutPoint::new(TxId::from_bytes([7; 32]), 0);
        cache
            .add_coin(
                prev,
                Coin::new(
                    TxOut {
                        value: Amount::from_sats(COIN),
                        script_pubkey: vec![0x51],
                    },
                    1,
                    false,
                ),
                false,
            )
            .unwrap();
        (cache, prev)
    }

    fn simple_spend(prev: OutPoint, value: i64) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: prev,
                script_sig: vec![],
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TxOut {
                value: Amount::from_sats(value),
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn admit(
        tx: Transaction,
        view: &CoinsCache<EmptyCoinsView>,
        pool: &mut Mempool,
    ) -> Result<TxId> {
        let params = ConsensusParams::regtest();
        let sigcache = SigCache::new(16);
        accept_to_memory_pool(tx, view, pool, &params, 200, 0, &sigcache)
    }

    #[test]
    fn test_accept_simple_spend() {
        let (view, prev) = funded_view();
        let mut pool = Mempool::default();
        let tx = simple_spend(prev, COIN - 10_000);
        let txid = admit(tx, &view, &mut pool).unwrap();
        assert!(pool.contains(&txid));
        assert_eq!(pool.get(&txid).unwrap().fee, Amount::from_sats(10_000));
        assert_eq!(pool.spender_of(&prev), Some(&txid));
    }

    #[test]
    fn test_reject_below_min_fee() {
        let (view, prev) = funded_view();
        let mut pool = Mempool::default();
        let tx = simple_spend(prev, COIN); // zero fee
        let err = admit(tx, &view, &mut pool).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Policy(PolicyError::FeeBelowMinimum { .. })
        ));
        assert!(!err.is_consensus_violation());
    }

    #[test]
    fn test_reject_double_spend_conflict() {
        let (view, prev) = funded_view();
        let mut pool = Mempool::default();
        admit(simple_spend(prev, COIN - 10_000), &view, &mut pool).unwrap();
        let rival = simple_spend(prev, COIN - 20_000);
        let err = admit(rival, &view, &mut pool).unwrap_err();
        assert_eq!(err, ConsensusError::Policy(PolicyError::MempoolConflict));
    }

    #[test]
    fn test_reject_duplicate() {
        let (view, prev) = funded_view();
        let mut pool = Mempool::default();
        let tx = simple_spend(prev, COIN - 10_000);
        admit(tx.clone(), &view, &mut pool).unwrap();
        let err = admit(tx, &view, &mut pool).unwrap_err();
        assert_eq!(err, ConsensusError::Policy(PolicyError::AlreadyInMempool));
    }

    #[test]
    fn test_reject_missing_input_is_consensus() {
        let view = CoinsCache::new(EmptyCoinsView);
        let mut pool = Mempool::default();
        let tx = simple_spend(OutPoint::new(TxId::from_bytes([9; 32]), 3), 100);
        let err = admit(tx, &view, &mut pool).unwrap_err();
        assert_eq!(
            err,
            ConsensusError::Tx(TxError::MissingInput { index: 0 })
        );
        assert!(err.is_consensus_violation());
    }

    #[test]
    fn test_reject_non_push_only_script_sig() {
        let (view, prev) = funded_view();
        let mut pool = Mempool::default();
        let mut tx = simple_spend(prev, COIN - 10_000);
        tx.inputs[0].script_sig = vec![0x76]; // OP_DUP
        let err = admit(tx, &view, &mut pool).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Policy(PolicyError::NonStandard(_))
        ));
    }

    #[test]
    fn test_reject_loose_coinbase() {
        let (view, _) = funded_view();
        let mut pool = Mempool::default();
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: vec![0, 0],
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TxOut {
                value: Amount::from_sats(COIN),
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        };
        assert!(admit(coinbase, &view, &mut pool).is_err());
    }

    #[test]
    fn test_remove_for_block_clears_confirmed_and_conflicts() {
        let (mut view, prev) = funded_view();
        let other = OutPoint::new(TxId::from_bytes([8; 32]), 0);
        view.add_coin(
            other,
            Coin::new(
                TxOut {
                    value: Amount::from_sats(COIN),
                    script_pubkey: vec![0x51],
                },
                1,
                false,
            ),
            false,
        )
        .unwrap();

        let mut pool = Mempool::default();
        let confirmed = simple_spend(prev, COIN - 10_000);
        let conflicted = simple_spend(other, COIN - 10_000);
        let confirmed_id = admit(confirmed.clone(), &view, &mut pool).unwrap();
        let conflicted_id = admit(conflicted, &view, &mut pool).unwrap();

        // The block confirms `confirmed` and spends `other` differently.
        let rival = simple_spend(other, COIN - 30_000);
        pool.remove_for_block(&[confirmed, rival]);
        assert!(!pool.contains(&confirmed_id));
        assert!(!pool.contains(&conflicted_id));
        assert!(pool.is_empty());
    }
}
