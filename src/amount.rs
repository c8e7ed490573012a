//! Fixed-point money type with overflow-checked arithmetic.

use crate::constants::MAX_MONEY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// A quantity of the currency's smallest unit (satoshis), signed so fee
/// arithmetic can be expressed before range checks run. Any value accepted
/// into a consensus structure must satisfy [`Amount::is_in_range`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(MAX_MONEY);

    pub fn from_sats(sats: i64) -> Self {
        Amount(sats)
    }

    pub fn sats(self) -> i64 {
        self.0
    }

    /// Whether the value lies in `[-MAX_MONEY, MAX_MONEY]`. Consensus
    /// additionally requires output values to be non-negative.
    pub fn is_in_range(self) -> bool {
        self.0 >= -MAX_MONEY && self.0 <= MAX_MONEY
    }

    /// Non-negative and within the money range: valid as an output value.
    pub fn is_valid_output_value(self) -> bool {
        self.0 >= 0 && self.0 <= MAX_MONEY
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

impl Sum<Amount> for Option<Amount> {
    /// Overflow-aware summation: `None` when any partial sum leaves i64.
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        let mut total = Amount::ZERO;
        for a in iter {
            total = total.checked_add(a)?;
        }
        Some(total)
    }
}
