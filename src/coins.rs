//! The unspent transaction output set.
//!
//! Views stack: a write-back [`CoinsCache`] sits over a backing
//! [`CoinsView`] (another cache, or a [`CoinsDb`] over a key-value store).
//! Spends and creations accumulate in the cache and reach the backing view
//! only on [`CoinsCache::flush`], keyed by DIRTY/FRESH entry flags so a
//! coin created and spent entirely within one cache lifetime never touches
//! the parent at all.

use crate::amount::Amount;
use crate::error::{Result, SerializeError};
use crate::hash::BlockHash;
use crate::serialize::{deserialize, serialize, Decodable, Encodable, Reader};
use crate::store::{KvStore, WriteBatch};
use crate::types::{OutPoint, TxOut};
use std::collections::HashMap;
use std::sync::Arc;

/// An unspent output plus the metadata consensus rules need about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub output: TxOut,
    /// Height of the block that created this coin.
    pub height: u32,
    pub is_coinbase: bool,
}

impl Coin {
    pub fn new(output: TxOut, height: u32, is_coinbase: bool) -> Self {
        Coin {
            output,
            height,
            is_coinbase,
        }
    }
}

impl Encodable for Coin {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        // Height and coinbase flag pack into one u32.
        let code = (self.height << 1) | u32::from(self.is_coinbase);
        buf.extend_from_slice(&code.to_le_bytes());
        self.output.encode_to(&mut *buf);
    }

    fn serialized_size(&self) -> usize {
        4 + self.output.serialized_size()
    }
}

impl Decodable for Coin {
    fn decode_from(r: &mut Reader<'_>) -> std::result::Result<Self, SerializeError> {
        let code = r.read_u32()?;
        let output = TxOut::decode_from(r)?;
        if !output.value.is_valid_output_value() {
            return Err(SerializeError::InvalidValue("coin value out of range"));
        }
        Ok(Coin {
            output,
            height: code >> 1,
            is_coinbase: code & 1 == 1,
        })
    }
}

/// Read access to a UTXO set at some block.
pub trait CoinsView {
    /// Fetch a coin if it is unspent in this view.
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>>;

    /// Hash of the block whose post-state this view represents.
    fn best_block(&self) -> Result<BlockHash>;
}

impl<T: CoinsView + ?Sized> CoinsView for &T {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        (**self).get_coin(outpoint)
    }

    fn best_block(&self) -> Result<BlockHash> {
        (**self).best_block()
    }
}

impl<T: CoinsView + ?Sized> CoinsView for Arc<T> {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        (**self).get_coin(outpoint)
    }

    fn best_block(&self) -> Result<BlockHash> {
        (**self).best_block()
    }
}

/// The empty view. Backs the cache under the genesis block.
pub struct EmptyCoinsView;

impl CoinsView for EmptyCoinsView {
    fn get_coin(&self, _: &OutPoint) -> Result<Option<Coin>> {
        Ok(None)
    }

    fn best_block(&self) -> Result<BlockHash> {
        Ok(BlockHash::ZERO)
    }
}

/// A batch of UTXO changes produced by flushing a cache. `None` spends.
#[derive(Debug, Default)]
pub struct CoinsDelta {
    pub changes: Vec<(OutPoint, Option<Coin>)>,
    pub best_block: BlockHash,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` marks the coin spent (or known-absent when clean).
    coin: Option<Coin>,
    /// Entry differs from the backing view.
    dirty: bool,
    /// Coin does not exist in the backing view, so a spend cancels out.
    fresh: bool,
}

/// Write-back overlay over a backing [`CoinsView`].
pub struct CoinsCache<V: CoinsView> {
    base: V,
    entries: HashMap<OutPoint, CacheEntry>,
    best_block: Option<BlockHash>,
}

impl<V: CoinsView> CoinsCache<V> {
    pub fn new(base: V) -> Self {
        CoinsCache {
            base,
            entries: HashMap::new(),
            best_block: None,
        }
    }

    /// Add a coin for an outpoint believed unspent. `overwrite` permits
    /// clobbering an existing unspent coin (required for a historical
    /// duplicate-coinbase quirk, rejected everywhere else).
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin, overwrite: bool) -> Result<()> {
        let fresh = if overwrite {
            false
        } else {
            // Fresh iff the backing view has no unspent coin here.
            match self.entries.get(&outpoint) {
                Some(entry) => {
                    if entry.coin.is_some() {
                        return Err(crate::error::ChainError::UndoMismatch.into());
                    }
                    entry.fresh
                }
                None => self.base.get_coin(&outpoint)?.is_none(),
            }
        };
        self.entries.insert(
            outpoint,
            CacheEntry {
                coin: Some(coin),
                dirty: true,
                fresh,
            },
        );
        Ok(())
    }

    /// Remove and return a coin. `Ok(None)` when no unspent coin exists.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        let entry = match self.entries.get_mut(outpoint) {
            Some(e) => e,
            None => {
                let coin = self.base.get_coin(outpoint)?;
                self.entries.insert(
                    *outpoint,
                    CacheEntry {
                        coin,
                        dirty: false,
                        fresh: false,
                    },
                );
                self.entries
                    .get_mut(outpoint)
                    .ok_or(crate::error::ChainError::UndoMismatch)?
            }
        };
        let taken = entry.coin.take();
        if taken.is_some() {
            if entry.fresh {
                // Created and spent within this cache: drop the entry.
                self.entries.remove(outpoint);
            } else {
                entry.dirty = true;
            }
        }
        Ok(taken)
    }

    /// True iff an unspent coin for the outpoint is visible.
    pub fn have_coin(&self, outpoint: &OutPoint) -> Result<bool> {
        Ok(self.get_coin(outpoint)?.is_some())
    }

    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = Some(hash);
    }

    /// Drain dirty entries into a delta batch, leaving the cache empty.
    pub fn take_delta(&mut self) -> Result<CoinsDelta> {
        let mut delta = CoinsDelta {
            changes: Vec::new(),
            best_block: match self.best_block {
                Some(h) => h,
                None => self.base.best_block()?,
            },
        };
        for (outpoint, entry) in self.entries.drain() {
            if !entry.dirty {
                continue;
            }
            if entry.coin.is_none() && entry.fresh {
                continue;
            }
            delta.changes.push((outpoint, entry.coin));
        }
        self.best_block = None;
        Ok(delta)
    }

    /// Drop a clean cached entry to bound memory. Dirty entries stay.
    pub fn uncache(&mut self, outpoint: &OutPoint) {
        if let Some(entry) = self.entries.get(outpoint) {
            if !entry.dirty {
                self.entries.remove(outpoint);
            }
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn base(&self) -> &V {
        &self.base
    }
}

impl<V: CoinsView> CoinsView for CoinsCache<V> {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        match self.entries.get(outpoint) {
            Some(entry) => Ok(entry.coin.clone()),
            None => self.base.get_coin(outpoint),
        }
    }

    fn best_block(&self) -> Result<BlockHash> {
        match self.best_block {
            Some(h) => Ok(h),
            None => self.base.best_block(),
        }
    }
}

/// Apply a delta to a mutable cache (cache-to-cache flush).
pub fn apply_delta<V: CoinsView>(cache: &mut CoinsCache<V>, delta: CoinsDelta) -> Result<()> {
    for (outpoint, coin) in delta.changes {
        match coin {
            Some(c) => cache.add_coin(outpoint, c, true)?,
            None => {
                cache.spend_coin(&outpoint)?;
            }
        }
    }
    cache.set_best_block(delta.best_block);
    Ok(())
}

const COIN_KEY_PREFIX: u8 = b'C';
const BEST_BLOCK_KEY: &[u8] = b"B";

fn coin_key(outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(COIN_KEY_PREFIX);
    key.extend_from_slice(outpoint.txid.as_bytes());
    key.extend_from_slice(&outpoint.vout.to_le_bytes());
    key
}

/// UTXO set persisted through a [`KvStore`].
pub struct CoinsDb<S: KvStore> {
    store: S,
}

impl<S: KvStore> CoinsDb<S> {
    pub fn new(store: S) -> Self {
        CoinsDb { store }
    }

    /// Apply a flushed delta as one atomic batch, best-block last.
    pub fn apply_delta(&self, delta: CoinsDelta) -> Result<()> {
        let mut batch: WriteBatch = Vec::with_capacity(delta.changes.len() + 1);
        for (outpoint, coin) in delta.changes {
            let key = coin_key(&outpoint);
            batch.push((key, coin.map(|c| serialize(&c))));
        }
        batch.push((
            BEST_BLOCK_KEY.to_vec(),
            Some(delta.best_block.as_bytes().to_vec()),
        ));
        self.store.write_batch(batch)
    }

    pub fn coin_count(&self) -> Result<usize> {
        Ok(self.store.iter_prefix(&[COIN_KEY_PREFIX])?.len())
    }

    /// Sum of every stored coin's value. Supply audits only; walks the
    /// whole set.
    pub fn total_value(&self) -> Result<Amount> {
        let mut total = Amount::ZERO;
        for (_, bytes) in self.store.iter_prefix(&[COIN_KEY_PREFIX])? {
            let coin: Coin = deserialize(&bytes)?;
            total = total
                .checked_add(coin.output.value)
                .ok_or(SerializeError::InvalidValue("coin total overflows"))?;
        }
        Ok(total)
    }
}

impl<S: KvStore> CoinsView for CoinsDb<S> {
    fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        match self.store.get(&coin_key(outpoint))? {
            Some(bytes) => Ok(Some(deserialize::<Coin>(&bytes)?)),
            None => Ok(None),
        }
    }

    fn best_block(&self) -> Result<BlockHash> {
        match self.store.get(BEST_BLOCK_KEY)? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| SerializeError::InvalidValue("best block record length"))?;
                Ok(BlockHash::from_bytes(arr))
            }
            None => Ok(BlockHash::ZERO),
        }
    }
}

/// Sum the input values of a transaction as seen by a view.
pub fn view_input_value<V: CoinsView>(
    view: &V,
    outpoints: &[OutPoint],
) -> Result<Option<Amount>> {
    let mut total = Amount::ZERO;
    for outpoint in outpoints {
        match view.get_coin(outpoint)? {
            Some(coin) => match total.checked_add(coin.output.value) {
                Some(t) => total = t,
                None => return Ok(None),
            },
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}
