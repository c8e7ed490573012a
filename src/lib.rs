//! # cashcore
//!
//! Consensus kernel for a UTXO-based peer-to-peer electronic cash system:
//! wire serialization, the script virtual machine, the unspent-output set,
//! proof-of-work and difficulty, block and transaction consensus rules,
//! and the chain validation state machine.
//!
//! The crate is a library of pure validation logic plus one stateful
//! context object, [`chain::ChainState`]. There are no globals: callers
//! own the state, the key-value store behind it, and the notification
//! callbacks. Networking, wallets and RPC live elsewhere.
//!
//! ## Layering
//!
//! - `serialize`, `hash`, `amount`, `types`: canonical encodings and the
//!   primitive ledger objects.
//! - `script`, `sigcache`: the flag-parameterized script interpreter and
//!   the cache of verified signatures.
//! - `coins`, `store`: the layered UTXO views over an opaque key-value
//!   boundary.
//! - `merkle`, `pow`, `params`, `consensus`: pure consensus rules.
//! - `chain`, `mempool`: the stateful surfaces composing the above.
//!
//! ## Usage
//!
//! ```no_run
//! use cashcore::chain::ChainState;
//! use cashcore::params::ConsensusParams;
//! use cashcore::store::MemoryStore;
//! # fn genesis_block() -> cashcore::types::Block { unimplemented!() }
//!
//! let mut chain = ChainState::new(
//!     ConsensusParams::regtest(),
//!     MemoryStore::new(),
//!     genesis_block(),
//! ).unwrap();
//! # let some_block = genesis_block();
//! chain.accept_block(some_block, 1_600_000_000)?;
//! # Ok::<(), cashcore::error::ConsensusError>(())
//! ```

pub mod amount;
pub mod chain;
pub mod coins;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod hash;
pub mod mempool;
pub mod merkle;
pub mod params;
pub mod pow;
pub mod script;
pub mod serialize;
pub mod sigcache;
pub mod store;
pub mod types;

pub use amount::Amount;
pub use error::{ConsensusError, Result};
pub use hash::{BlockHash, TxId};
pub use types::{Block, BlockHeader, OutPoint, Transaction, TxIn, TxOut};
