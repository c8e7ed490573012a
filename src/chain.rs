//! Chain state machine: block index, active chain selection, connect and
//! disconnect with undo, and reorganization.
//!
//! All validation state lives in a [`ChainState`] value owned by the
//! caller. Block bodies and undo records are held in memory behind the
//! same object; the UTXO set flushes through the configured key-value
//! store. Connect and disconnect are strictly serialized; only script
//! verification inside one block fans out across threads.

use crate::coins::{apply_delta, Coin, CoinsCache, CoinsDb, CoinsView};
use crate::consensus::{
    check_block_structure, check_coinbase_overwrite, check_coinbase_value, check_sequence_locks,
    check_tx_inputs, is_final_tx, max_block_sigchecks, BlockUndo, TxUndo,
};
use crate::amount::Amount;
use crate::error::{BlockError, ChainError, ConsensusError, Result, TxError};
use crate::hash::BlockHash;
use crate::params::ConsensusParams;
use crate::pow::{
    block_proof, check_header_time, check_proof_of_work, get_next_work_required,
    median_time_past, RetargetContext, U256,
};
use crate::script::{verify_script, ScriptFlags, TransactionSignatureChecker};
use crate::sigcache::SigCache;
use crate::store::KvStore;
use crate::types::{Block, BlockHeader, OutPoint, Transaction};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Validation progress ladder. `Invalid` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockStatus {
    Unknown,
    /// Header is well-formed and satisfies its own proof of work.
    HeaderValid,
    /// Header connects to a fully validated header ancestry.
    TreeValid,
    /// Block body passed context-free transaction checks.
    TransactionsValid,
    /// Connected on top of a valid chain at least once (amounts, UTXOs).
    ChainValid,
    /// Script checks passed as well.
    ScriptsValid,
}

/// One entry per known header.
#[derive(Debug, Clone)]
pub struct BlockIndexEntry {
    pub header: BlockHeader,
    pub height: u64,
    /// Total work on the chain ending here.
    pub chain_work: U256,
    /// Arrival order, first-seen wins ties.
    pub sequence: u64,
    pub status: BlockStatus,
    pub invalid: bool,
}

/// Notifications emitted after each committed state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    BlockConnected { hash: BlockHash, height: u64 },
    BlockDisconnected { hash: BlockHash, height: u64 },
}

pub type EventCallback = Box<dyn Fn(&ChainEvent) + Send + Sync>;

pub struct ChainState<S: KvStore> {
    params: ConsensusParams,
    index: HashMap<BlockHash, BlockIndexEntry>,
    /// Active chain, genesis first.
    active: Vec<BlockHash>,
    blocks: HashMap<BlockHash, Arc<Block>>,
    undos: HashMap<BlockHash, BlockUndo>,
    coins: CoinsCache<CoinsDb<S>>,
    sigcache: Arc<SigCache>,
    interrupt: Arc<AtomicBool>,
    callbacks: Vec<EventCallback>,
    next_sequence: u64,
}

impl<S: KvStore> ChainState<S> {
    /// Initialize over an empty store with a trusted genesis block.
    pub fn new(params: ConsensusParams, store: S, genesis: Block) -> Result<Self> {
        let genesis_hash = genesis.block_hash();
        let mut state = ChainState {
            params,
            index: HashMap::new(),
            active: Vec::new(),
            blocks: HashMap::new(),
            undos: HashMap::new(),
            coins: CoinsCache::new(CoinsDb::new(store)),
            sigcache: Arc::new(SigCache::default()),
            interrupt: Arc::new(AtomicBool::new(false)),
            callbacks: Vec::new(),
            next_sequence: 0,
        };

        let genesis_sequence = state.take_sequence();
        state.index.insert(
            genesis_hash,
            BlockIndexEntry {
                header: genesis.header,
                height: 0,
                chain_work: block_proof(genesis.header.bits),
                sequence: genesis_sequence,
                status: BlockStatus::ScriptsValid,
                invalid: false,
            },
        );
        state.active.push(genesis_hash);
        // Genesis coinbase enters the UTXO set like any other.
        let genesis_arc = Arc::new(genesis);
        for (i, tx) in genesis_arc.transactions.iter().enumerate() {
            let is_coinbase = i == 0;
            let txid = tx.txid();
            for (vout, output) in tx.outputs.iter().enumerate() {
                state.coins.add_coin(
                    OutPoint::new(txid, vout as u32),
                    Coin::new(output.clone(), 0, is_coinbase),
                    false,
                )?;
            }
        }
        state.coins.set_best_block(genesis_hash);
        state.blocks.insert(genesis_hash, genesis_arc);
        info!("initialized chain at genesis {genesis_hash}");
        Ok(state)
    }

    fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Shared flag that aborts long-running chain activation between
    /// blocks.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn subscribe(&mut self, callback: EventCallback) {
        self.callbacks.push(callback);
    }

    fn notify(&self, event: ChainEvent) {
        for callback in &self.callbacks {
            callback(&event);
        }
    }

    // --- queries ---------------------------------------------------------

    pub fn tip_hash(&self) -> BlockHash {
        *self.active.last().unwrap_or(&BlockHash::ZERO)
    }

    pub fn tip_height(&self) -> u64 {
        self.active.len().saturating_sub(1) as u64
    }

    pub fn get_block_hash(&self, height: u64) -> Option<BlockHash> {
        self.active.get(height as usize).copied()
    }

    pub fn block_index(&self, hash: &BlockHash) -> Option<&BlockIndexEntry> {
        self.index.get(hash)
    }

    /// Stored block body, whether or not it is on the active chain.
    pub fn get_block(&self, hash: &BlockHash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    pub fn is_on_active_chain(&self, hash: &BlockHash) -> bool {
        self.index
            .get(hash)
            .map(|e| self.active.get(e.height as usize) == Some(hash))
            .unwrap_or(false)
    }

    /// Timestamps of a header's ancestry, oldest first, up to the median
    /// window length.
    fn ancestor_times(&self, mut hash: BlockHash) -> Vec<u32> {
        let mut times = Vec::new();
        while let Some(entry) = self.index.get(&hash) {
            times.push(entry.header.time);
            if entry.height == 0 {
                break;
            }
            hash = entry.header.prev_blockhash;
            if times.len() >= crate::constants::MEDIAN_TIME_SPAN {
                break;
            }
        }
        times.reverse();
        times
    }

    /// Median time past of the block *after* the given header.
    pub fn median_time_past(&self, hash: &BlockHash) -> u32 {
        median_time_past(&self.ancestor_times(*hash))
    }

    /// Current tip MTP, the context mempool admission validates under.
    pub fn tip_median_time_past(&self) -> u32 {
        self.median_time_past(&self.tip_hash())
    }

    pub fn coins(&self) -> &CoinsCache<CoinsDb<S>> {
        &self.coins
    }

    pub fn sigcache(&self) -> Arc<SigCache> {
        Arc::clone(&self.sigcache)
    }

    /// Flush the dirty UTXO overlay down to the key-value store.
    pub fn flush(&mut self) -> Result<()> {
        let delta = self.coins.take_delta()?;
        let changes = delta.changes.len();
        self.coins.base().apply_delta(delta)?;
        debug!("flushed {changes} coin changes to the store");
        Ok(())
    }

    // --- header acceptance -----------------------------------------------

    fn ancestor_at(&self, mut hash: BlockHash, height: u64) -> Option<&BlockIndexEntry> {
        loop {
            let entry = self.index.get(&hash)?;
            if entry.height == height {
                return self.index.get(&hash);
            }
            if entry.height < height || entry.height == 0 {
                return None;
            }
            hash = entry.header.prev_blockhash;
        }
    }

    fn required_bits(&self, parent_hash: &BlockHash, height: u64) -> Result<u32> {
        let parent = self
            .index
            .get(parent_hash)
            .ok_or_else(|| ChainError::UnknownBlock(parent_hash.to_string()))?;

        let interval = self.params.difficulty_adjustment_interval;
        let first_block_time = if height % interval == 0 && height >= interval {
            self.ancestor_at(*parent_hash, height - interval)
                .map(|e| e.header.time)
                .unwrap_or(parent.header.time)
        } else {
            parent.header.time
        };
        let sixth_ancestor_mtp = self
            .ancestor_at(*parent_hash, parent.height.saturating_sub(6))
            .map(|e| e.header.block_hash())
            .map(|hash| self.median_time_past(&hash))
            .unwrap_or(0);

        let ctx = RetargetContext {
            height,
            prev_bits: parent.header.bits,
            prev_time: parent.header.time,
            first_block_time,
            tip_mtp: self.median_time_past(parent_hash),
            sixth_ancestor_mtp,
        };
        Ok(get_next_work_required(&ctx, &self.params))
    }

    /// Admit a header into the block index.
    pub fn accept_header(&mut self, header: BlockHeader, now: u64) -> Result<BlockHash> {
        let hash = header.block_hash();
        if self.index.contains_key(&hash) {
            return Ok(hash);
        }

        let parent = self
            .index
            .get(&header.prev_blockhash)
            .ok_or(BlockError::OrphanHeader)?;
        if parent.invalid {
            return Err(BlockError::InvalidAncestor.into());
        }
        let height = parent.height + 1;
        let parent_work = parent.chain_work;
        let parent_hash = header.prev_blockhash;

        let required = self.required_bits(&parent_hash, height)?;
        if header.bits != required {
            return Err(BlockError::BadDiffBits.into());
        }
        check_proof_of_work(&hash, header.bits, &self.params)?;
        check_header_time(&header, self.median_time_past(&parent_hash), now)?;

        let entry = BlockIndexEntry {
            header,
            height,
            chain_work: parent_work.saturating_add(&block_proof(header.bits)),
            sequence: self.take_sequence(),
            status: BlockStatus::TreeValid,
            invalid: false,
        };
        self.index.insert(hash, entry);
        debug!("accepted header {hash} at height {height}");
        Ok(hash)
    }

    /// Admit a full block: header plus structural body checks, then try to
    /// extend the best chain.
    pub fn accept_block(&mut self, block: Block, now: u64) -> Result<BlockHash> {
        let hash = self.accept_header(block.header, now)?;
        if let Err(e) = check_block_structure(&block, &self.params) {
            self.mark_invalid(&hash);
            return Err(e.into());
        }
        if let Some(entry) = self.index.get_mut(&hash) {
            if entry.status < BlockStatus::TransactionsValid {
                entry.status = BlockStatus::TransactionsValid;
            }
        }
        self.blocks.insert(hash, Arc::new(block));
        self.activate_best_chain()?;
        Ok(hash)
    }

    // --- connect / disconnect --------------------------------------------

    /// One script-verification work item: the spending transaction, the
    /// input under check, and a snapshot of the output it consumes.
    /// Snapshotting keeps the parallel phase read-only and lets in-block
    /// spend chains resolve against the sequentially updated view.
    fn run_script_jobs(
        &self,
        jobs: Vec<(Arc<Transaction>, usize, crate::types::TxOut)>,
        flags: ScriptFlags,
    ) -> Result<u64> {
        let sigcache = &self.sigcache;
        let results: Result<Vec<u64>> = jobs
            .par_iter()
            .map(|(tx, input_index, spent)| {
                let mut checker =
                    TransactionSignatureChecker::new(tx.as_ref(), *input_index, spent)
                        .with_cache(sigcache);
                let metrics = verify_script(
                    &tx.inputs[*input_index].script_sig,
                    &spent.script_pubkey,
                    flags,
                    &mut checker,
                )
                .map_err(|error| TxError::ScriptFailure {
                    index: *input_index,
                    error,
                })?;
                Ok(metrics.sigchecks)
            })
            .collect();
        Ok(results?.iter().sum())
    }

    /// Validate and apply one block on top of the current view. On success
    /// the coins overlay and undo map are updated; the active chain vector
    /// is the caller's to extend.
    fn connect_block(&mut self, hash: BlockHash, block: &Block) -> Result<()> {
        let entry = self
            .index
            .get(&hash)
            .ok_or_else(|| ChainError::UnknownBlock(hash.to_string()))?;
        let height = entry.height;
        let flags = self.params.script_flags_for_height(height);
        let spend_mtp = self.median_time_past(&block.header.prev_blockhash);

        // Work in an overlay: nothing touches real state until every check
        // has passed.
        let mut view = CoinsCache::new(&self.coins);
        check_coinbase_overwrite(block, &view)?;

        let mut fees = Amount::ZERO;
        let mut undo = BlockUndo::default();
        let mut jobs: Vec<(Arc<Transaction>, usize, crate::types::TxOut)> = Vec::new();
        for tx in block.transactions.iter().skip(1) {
            if !is_final_tx(tx, height, spend_mtp) {
                return Err(BlockError::Tx(TxError::NonFinal).into());
            }
            let fee = check_tx_inputs(tx, &view, height, &self.params)?;
            fees = fees
                .checked_add(fee)
                .ok_or(BlockError::Tx(TxError::TotalInputOutOfRange))?;

            if self.params.csv_active(height) {
                let mut coin_heights = Vec::with_capacity(tx.inputs.len());
                let mut coin_mtps = Vec::with_capacity(tx.inputs.len());
                for (index, input) in tx.inputs.iter().enumerate() {
                    let coin = view
                        .get_coin(&input.prevout)?
                        .ok_or(TxError::MissingInput { index })?;
                    coin_mtps.push(self.mtp_at_height(u64::from(coin.height), spend_mtp));
                    coin_heights.push(coin.height);
                }
                check_sequence_locks(tx, &coin_heights, height, &coin_mtps, spend_mtp)
                    .map_err(BlockError::Tx)?;
            }

            // Spend inputs, recording the consumed coins for undo and
            // snapshotting the locking scripts for the parallel phase.
            let shared = Arc::new(tx.clone());
            let mut tx_undo = TxUndo { spent_coins: Vec::new() };
            for (index, input) in tx.inputs.iter().enumerate() {
                let coin = view
                    .spend_coin(&input.prevout)?
                    .ok_or(TxError::MissingInput { index })?;
                jobs.push((Arc::clone(&shared), index, coin.output.clone()));
                tx_undo.spent_coins.push(coin);
            }
            undo.tx_undos.push(tx_undo);

            let txid = tx.txid();
            for (vout, output) in tx.outputs.iter().enumerate() {
                view.add_coin(
                    OutPoint::new(txid, vout as u32),
                    Coin::new(output.clone(), height as u32, false),
                    false,
                )?;
            }
        }

        check_coinbase_value(block, fees, height, &self.params)?;
        let coinbase = &block.transactions[0];
        let coinbase_txid = coinbase.txid();
        for (vout, output) in coinbase.outputs.iter().enumerate() {
            view.add_coin(
                OutPoint::new(coinbase_txid, vout as u32),
                Coin::new(output.clone(), height as u32, true),
                true,
            )?;
        }
        view.set_best_block(hash);

        let sigchecks = self.run_script_jobs(jobs, flags)?;
        if sigchecks > max_block_sigchecks(&self.params) {
            return Err(BlockError::SigChecks.into());
        }

        // All checks passed: merge the overlay into real state.
        let delta = view.take_delta()?;
        drop(view);
        apply_delta(&mut self.coins, delta)?;
        self.undos.insert(hash, undo);
        if let Some(e) = self.index.get_mut(&hash) {
            e.status = BlockStatus::ScriptsValid;
        }
        Ok(())
    }

    /// MTP visible when the coin at `coin_height` confirmed. The stored
    /// coin does not carry it, so derive from the active chain when the
    /// height is still on it; otherwise fall back to the spend MTP, which
    /// can only make a time lock stricter.
    fn mtp_at_height(&self, coin_height: u64, spend_mtp: u32) -> u32 {
        match self.get_block_hash(coin_height) {
            Some(hash) => self
                .index
                .get(&hash)
                .map(|e| self.median_time_past(&e.header.prev_blockhash))
                .unwrap_or(spend_mtp),
            None => spend_mtp,
        }
    }

    /// Reverse the tip block using its undo record.
    fn disconnect_block(&mut self, hash: BlockHash) -> Result<()> {
        let block = self
            .blocks
            .get(&hash)
            .cloned()
            .ok_or_else(|| ChainError::MissingBlockData(hash.to_string()))?;
        let undo = self
            .undos
            .remove(&hash)
            .ok_or_else(|| ChainError::MissingUndo(hash.to_string()))?;
        if undo.tx_undos.len() != block.transactions.len() - 1 {
            return Err(ChainError::UndoMismatch.into());
        }

        // Undo transaction by transaction, last first: remove a
        // transaction's outputs before restoring its inputs. A coin
        // created and consumed inside this block is restored by its
        // spender's undo and removed again when its creator is reached,
        // so no intra-block coin survives the disconnect.
        for (tx, tx_undo) in block
            .transactions
            .iter()
            .skip(1)
            .zip(undo.tx_undos.iter())
            .rev()
        {
            if tx_undo.spent_coins.len() != tx.inputs.len() {
                return Err(ChainError::UndoMismatch.into());
            }
            let txid = tx.txid();
            for vout in 0..tx.outputs.len() as u32 {
                self.coins.spend_coin(&OutPoint::new(txid, vout))?;
            }
            for (input, coin) in tx.inputs.iter().zip(tx_undo.spent_coins.iter()).rev() {
                self.coins
                    .add_coin(input.prevout, coin.clone(), true)?;
            }
        }
        let coinbase = &block.transactions[0];
        let coinbase_txid = coinbase.txid();
        for vout in 0..coinbase.outputs.len() as u32 {
            self.coins.spend_coin(&OutPoint::new(coinbase_txid, vout))?;
        }
        self.coins.set_best_block(block.header.prev_blockhash);
        Ok(())
    }

    // --- best chain activation -------------------------------------------

    fn mark_invalid(&mut self, hash: &BlockHash) {
        let mut tainted = vec![*hash];
        if let Some(entry) = self.index.get_mut(hash) {
            entry.invalid = true;
        }
        // Invalidity propagates to every descendant.
        loop {
            let mut grew = false;
            let children: Vec<BlockHash> = self
                .index
                .iter()
                .filter(|(h, e)| {
                    !e.invalid && tainted.contains(&e.header.prev_blockhash) && !tainted.contains(h)
                })
                .map(|(h, _)| *h)
                .collect();
            for child in children {
                if let Some(entry) = self.index.get_mut(&child) {
                    entry.invalid = true;
                }
                tainted.push(child);
                grew = true;
            }
            if !grew {
                break;
            }
        }
        warn!("marked {} block(s) invalid from {hash}", tainted.len());
    }

    /// The most-work valid candidate with full block data available.
    /// Ties break by arrival order, then by hash.
    fn best_candidate(&self) -> Option<BlockHash> {
        self.index
            .iter()
            .filter(|(hash, entry)| {
                !entry.invalid
                    && entry.status >= BlockStatus::TransactionsValid
                    && self.blocks.contains_key(*hash)
            })
            .max_by(|(ha, a), (hb, b)| {
                a.chain_work
                    .cmp(&b.chain_work)
                    .then(b.sequence.cmp(&a.sequence))
                    .then(hb.as_bytes().cmp(ha.as_bytes()))
            })
            .map(|(hash, _)| *hash)
    }

    /// Last common ancestor height of the active chain and `hash`'s chain.
    fn fork_height(&self, hash: &BlockHash) -> u64 {
        let mut cursor = *hash;
        loop {
            let entry = match self.index.get(&cursor) {
                Some(e) => e,
                None => return 0,
            };
            if self.active.get(entry.height as usize) == Some(&cursor) {
                return entry.height;
            }
            if entry.height == 0 {
                return 0;
            }
            cursor = entry.header.prev_blockhash;
        }
    }

    /// Branch from the fork point (exclusive) to `hash`, ascending.
    fn branch_to(&self, hash: &BlockHash, fork_height: u64) -> Vec<BlockHash> {
        let mut branch = Vec::new();
        let mut cursor = *hash;
        while let Some(entry) = self.index.get(&cursor) {
            if entry.height <= fork_height {
                break;
            }
            branch.push(cursor);
            cursor = entry.header.prev_blockhash;
        }
        branch.reverse();
        branch
    }

    /// Reorganize onto the best available candidate chain. A failed
    /// connect marks the offender invalid, rolls back to the previous
    /// active chain, and retries with the next candidate; the first
    /// failure is reported once a valid tip is settled.
    pub fn activate_best_chain(&mut self) -> Result<()> {
        let mut first_failure: Option<ConsensusError> = None;
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(ChainError::Interrupted.into());
            }
            let candidate = match self.best_candidate() {
                Some(c) => c,
                None => return Err(ChainError::NoCandidate.into()),
            };
            let settled = if candidate == self.tip_hash() {
                true
            } else {
                let tip_work = self
                    .index
                    .get(&self.tip_hash())
                    .map(|e| e.chain_work)
                    .unwrap_or(U256::ZERO);
                let candidate_work = self
                    .index
                    .get(&candidate)
                    .map(|e| e.chain_work)
                    .unwrap_or(U256::ZERO);
                // Equal work never displaces the current tip.
                candidate_work <= tip_work
            };
            if settled {
                return match first_failure {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
            }

            match self.try_switch_to(candidate) {
                Ok(()) => {
                    return match first_failure {
                        Some(e) => Err(e),
                        None => Ok(()),
                    }
                }
                Err(ConsensusError::Chain(ChainError::Interrupted)) => {
                    return Err(ChainError::Interrupted.into())
                }
                Err(e) => {
                    warn!("candidate {candidate} failed to connect: {e}");
                    first_failure.get_or_insert(e);
                    // Loop again: the offender is now invalid.
                }
            }
        }
    }

    /// Disconnect to the fork point, then connect the new branch. On a
    /// connect failure, restore the original chain.
    fn try_switch_to(&mut self, target: BlockHash) -> Result<()> {
        let fork_height = self.fork_height(&target);
        let old_tip = self.tip_hash();
        let old_branch: Vec<BlockHash> = self.active[(fork_height as usize + 1)..].to_vec();

        let mut disconnected = Vec::new();
        while self.tip_height() > fork_height {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(ChainError::Interrupted.into());
            }
            let tip = self.tip_hash();
            let height = self.tip_height();
            self.disconnect_block(tip)?;
            self.active.pop();
            disconnected.push(tip);
            self.notify(ChainEvent::BlockDisconnected { hash: tip, height });
        }
        if !disconnected.is_empty() {
            info!(
                "disconnected {} block(s) back to height {fork_height}",
                disconnected.len()
            );
        }

        let branch = self.branch_to(&target, fork_height);
        for hash in branch {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(ChainError::Interrupted.into());
            }
            let block = self
                .blocks
                .get(&hash)
                .cloned()
                .ok_or_else(|| ChainError::MissingBlockData(hash.to_string()))?;
            match self.connect_block(hash, &block) {
                Ok(()) => {
                    let height = self.active.len() as u64;
                    self.active.push(hash);
                    self.notify(ChainEvent::BlockConnected { hash, height });
                }
                Err(e) => {
                    self.mark_invalid(&hash);
                    // Roll back by reactivating the original branch.
                    self.rollback_to(fork_height, &old_branch)?;
                    debug_assert_eq!(self.tip_hash(), old_tip);
                    return Err(e);
                }
            }
        }
        info!(
            "new tip {} at height {}",
            self.tip_hash(),
            self.tip_height()
        );
        Ok(())
    }

    /// Undo a partial switch: disconnect whatever connected past the fork
    /// point and reconnect the previously active branch.
    fn rollback_to(&mut self, fork_height: u64, old_branch: &[BlockHash]) -> Result<()> {
        while self.tip_height() > fork_height {
            let tip = self.tip_hash();
            let height = self.tip_height();
            self.disconnect_block(tip)?;
            self.active.pop();
            self.notify(ChainEvent::BlockDisconnected { hash: tip, height });
        }
        for hash in old_branch {
            let block = self
                .blocks
                .get(hash)
                .cloned()
                .ok_or_else(|| ChainError::MissingBlockData(hash.to_string()))?;
            self.connect_block(*hash, &block)?;
            let height = self.active.len() as u64;
            self.active.push(*hash);
            self.notify(ChainEvent::BlockConnected { hash: *hash, height });
        }
        Ok(())
    }
}
