//! Cache of successfully verified signatures.
//!
//! The same (signature, pubkey, message) triple is commonly checked twice,
//! once at relay admission and again at block connection. Entries are keyed
//! by a salted hash so an attacker cannot engineer cache collisions.

use crate::hash::Hash;
use lru::LruCache;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

pub const DEFAULT_SIGCACHE_CAPACITY: usize = 1 << 16;

pub struct SigCache {
    salt: [u8; 32],
    entries: Mutex<LruCache<Hash, ()>>,
}

impl SigCache {
    pub fn new(capacity: usize) -> Self {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        SigCache {
            salt,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn entry_key(&self, sig: &[u8], pubkey: &[u8], msg: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.salt);
        hasher.update(msg);
        hasher.update((pubkey.len() as u32).to_le_bytes());
        hasher.update(pubkey);
        hasher.update((sig.len() as u32).to_le_bytes());
        hasher.update(sig);
        hasher.finalize().into()
    }

    pub fn contains(&self, sig: &[u8], pubkey: &[u8], msg: &Hash) -> bool {
        let key = self.entry_key(sig, pubkey, msg);
        self.entries.lock().get(&key).is_some()
    }

    pub fn insert(&self, sig: &[u8], pubkey: &[u8], msg: &Hash) {
        let key = self.entry_key(sig, pubkey, msg);
        self.entries.lock().put(key, ());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SigCache {
    fn default() -> Self {
        SigCache::new(DEFAULT_SIGCACHE_CAPACITY)
    }
}
