//! Hash primitives and identity newtypes.
//!
//! All digests are pure functions over byte buffers. Transaction and block
//! identities are the double SHA-256 of the serialized form; `hash160` is
//! the RIPEMD160-of-SHA256 composition used by pay-to-pubkey-hash style
//! predicates.

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 256-bit hash value.
pub type Hash = [u8; 32];

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// RIPEMD160(SHA256(x)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// RIPEMD160(x).
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

macro_rules! hash_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub Hash);

        impl $name {
            pub const ZERO: $name = $name([0u8; 32]);

            pub fn from_bytes(bytes: Hash) -> Self {
                $name(bytes)
            }

            pub fn as_bytes(&self) -> &Hash {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl fmt::Display for $name {
            /// Hex, byte-reversed as is conventional for hash display.
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut rev = self.0;
                rev.reverse();
                write!(f, "{}", hex::encode(rev))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }
    };
}

hash_newtype!(TxId, "Transaction identity: sha256d of the serialized transaction.");
hash_newtype!(BlockHash, "Block identity: sha256d of the 80-byte serialized header.");
