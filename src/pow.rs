//! Proof of work: compact targets, 256-bit target arithmetic, cumulative
//! chain work, and the difficulty retarget schedule.

use crate::constants::*;
use crate::error::BlockError;
use crate::hash::BlockHash;
use crate::params::ConsensusParams;
use crate::types::BlockHeader;
use std::cmp::Ordering;

/// 256-bit unsigned integer, little-endian u64 limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    /// Interpret a 32-byte big-endian hash as an integer.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[32 - 8 * (i + 1)..32 - 8 * i]);
            *limb = u64::from_be_bytes(chunk);
        }
        U256(limbs)
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }
        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;
        for i in word_shift..4 {
            result.0[i - word_shift] = self.0[i] >> bit_shift;
            if bit_shift > 0 && i + 1 < 4 {
                result.0[i - word_shift] |= self.0[i + 1] << (64 - bit_shift);
            }
        }
        result
    }

    pub fn checked_add(&self, other: &U256) -> Option<U256> {
        let mut result = U256::ZERO;
        let mut carry = 0u64;
        for i in 0..4 {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry);
            result.0[i] = sum;
            carry = u64::from(c1) + u64::from(c2);
        }
        if carry != 0 {
            return None;
        }
        Some(result)
    }

    /// Saturating addition, for cumulative chain work.
    pub fn saturating_add(&self, other: &U256) -> U256 {
        self.checked_add(other).unwrap_or(U256::MAX)
    }

    pub fn checked_sub(&self, other: &U256) -> Option<U256> {
        if self < other {
            return None;
        }
        let mut result = U256::ZERO;
        let mut borrow = 0u64;
        for i in 0..4 {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow);
            result.0[i] = diff;
            borrow = u64::from(b1) + u64::from(b2);
        }
        Some(result)
    }

    /// Multiply by a small scalar, saturating on overflow.
    pub fn saturating_mul_u64(&self, scalar: u64) -> U256 {
        let mut result = U256::ZERO;
        let mut carry: u128 = 0;
        for i in 0..4 {
            let product = u128::from(self.0[i]) * u128::from(scalar) + carry;
            result.0[i] = product as u64;
            carry = product >> 64;
        }
        if carry != 0 {
            return U256::MAX;
        }
        result
    }

    /// Long division by a small scalar.
    pub fn div_u64(&self, divisor: u64) -> U256 {
        if divisor == 0 {
            return U256::ZERO;
        }
        let mut result = U256::ZERO;
        let mut remainder: u128 = 0;
        for i in (0..4).rev() {
            let acc = (remainder << 64) | u128::from(self.0[i]);
            result.0[i] = (acc / u128::from(divisor)) as u64;
            remainder = acc % u128::from(divisor);
        }
        result
    }

    /// Full-width division, bit-by-bit long division.
    pub fn div(&self, divisor: &U256) -> U256 {
        if divisor.is_zero() {
            return U256::ZERO;
        }
        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for bit in (0..256).rev() {
            remainder = remainder.shl(1);
            if self.bit(bit) {
                remainder.0[0] |= 1;
            }
            if remainder.cmp(divisor) != Ordering::Less {
                remainder = match remainder.checked_sub(divisor) {
                    Some(r) => r,
                    None => remainder,
                };
                quotient.0[(bit / 64) as usize] |= 1u64 << (bit % 64);
            }
        }
        quotient
    }

    fn bit(&self, index: u32) -> bool {
        self.0[(index / 64) as usize] >> (index % 64) & 1 == 1
    }

    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + 64 - self.0[i].leading_zeros();
            }
        }
        0
    }

    /// Decode the compact exponent/mantissa target form. Negative or
    /// overflowing encodings decode to zero, which fails every PoW check.
    pub fn from_compact(compact: u32) -> U256 {
        let exponent = compact >> 24;
        let mut mantissa = compact & 0x007f_ffff;
        if compact & 0x0080_0000 != 0 {
            // Sign bit set: no valid target is negative.
            return U256::ZERO;
        }
        if exponent <= 3 {
            mantissa >>= 8 * (3 - exponent);
            return U256::from_u64(u64::from(mantissa));
        }
        if exponent > 32 {
            // Mantissa bits would shift past 256.
            return U256::ZERO;
        }
        U256::from_u64(u64::from(mantissa)).shl(8 * (exponent - 3))
    }

    /// Re-encode as compact form (mantissa normalized, sign bit clear).
    pub fn to_compact(&self) -> u32 {
        let bits = self.bits();
        let mut exponent = (bits + 7) / 8;
        let mut mantissa = if exponent <= 3 {
            (self.0[0] as u32) << (8 * (3 - exponent))
        } else {
            let shifted = self.shr(8 * (exponent - 3));
            shifted.0[0] as u32
        };
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            exponent += 1;
        }
        (exponent << 24) | (mantissa & 0x007f_ffff)
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

/// Hash must not exceed the decoded target, and the target must fit under
/// the network's pow limit.
pub fn check_proof_of_work(
    hash: &BlockHash,
    bits: u32,
    params: &ConsensusParams,
) -> Result<(), BlockError> {
    let target = U256::from_compact(bits);
    if target.is_zero() || target > params.pow_limit {
        return Err(BlockError::BadTarget);
    }
    let hash_value = {
        // Hash bytes are stored little-endian; flip for the integer view.
        let mut be = *hash.as_bytes();
        be.reverse();
        U256::from_be_bytes(&be)
    };
    if hash_value > target {
        return Err(BlockError::HighHash);
    }
    Ok(())
}

/// Expected cumulative-work contribution of a block with target `bits`,
/// ~2^256 / (target + 1), computed as (~target / (target + 1)) + 1.
pub fn block_proof(bits: u32) -> U256 {
    let target = U256::from_compact(bits);
    if target.is_zero() {
        return U256::ZERO;
    }
    let neg = match U256::MAX.checked_sub(&target) {
        Some(n) => n,
        None => return U256::ZERO,
    };
    let denom = match target.checked_add(&U256::from_u64(1)) {
        Some(d) => d,
        None => return U256::ZERO,
    };
    neg.div(&denom)
        .checked_add(&U256::from_u64(1))
        .unwrap_or(U256::MAX)
}

/// Inputs to the retarget decision about one historical window.
#[derive(Debug, Clone, Copy)]
pub struct RetargetContext {
    /// Height of the block being mined.
    pub height: u64,
    /// Compact bits of the chain tip.
    pub prev_bits: u32,
    /// Timestamp of the chain tip.
    pub prev_time: u32,
    /// Timestamp of the first block in the adjustment window.
    pub first_block_time: u32,
    /// MTP of the tip and of the block six back, for the emergency path.
    pub tip_mtp: u32,
    pub sixth_ancestor_mtp: u32,
}

/// Work required for the next block.
pub fn get_next_work_required(ctx: &RetargetContext, params: &ConsensusParams) -> u32 {
    if params.no_retargeting {
        return params.pow_limit_bits;
    }

    if ctx.height % params.difficulty_adjustment_interval != 0 {
        if params.eda_enabled {
            // Emergency adjustment: if the last six blocks took more than
            // twelve hours of MTP, ease the target by 25%.
            let spread = ctx.tip_mtp.saturating_sub(ctx.sixth_ancestor_mtp);
            if u64::from(spread) > 12 * 3600 {
                let target = U256::from_compact(ctx.prev_bits);
                let eased = target.saturating_add(&target.shr(2));
                let eased = if eased > params.pow_limit {
                    params.pow_limit
                } else {
                    eased
                };
                return eased.to_compact();
            }
        }
        return ctx.prev_bits;
    }

    // Scheduled retarget, actual timespan clamped to [T/4, 4T].
    let actual = u64::from(ctx.prev_time.saturating_sub(ctx.first_block_time));
    let clamped = actual
        .max(params.target_timespan / 4)
        .min(params.target_timespan * 4);

    let prev_target = U256::from_compact(ctx.prev_bits);
    // new = prev * actual / expected, with 64-bit scalar steps.
    let scaled = prev_target.saturating_mul_u64(clamped);
    let next = scaled.div_u64(params.target_timespan);
    let next = if next > params.pow_limit || next.is_zero() {
        params.pow_limit
    } else {
        next
    };
    next.to_compact()
}

/// Median of the most recent `MEDIAN_TIME_SPAN` timestamps, newest last.
pub fn median_time_past(timestamps: &[u32]) -> u32 {
    if timestamps.is_empty() {
        return 0;
    }
    let start = timestamps.len().saturating_sub(MEDIAN_TIME_SPAN);
    let mut window: Vec<u32> = timestamps[start..].to_vec();
    window.sort_unstable();
    window[window.len() / 2]
}

/// Header-level time checks: strictly after the MTP, no further than the
/// permitted drift ahead of local time.
pub fn check_header_time(
    header: &BlockHeader,
    mtp: u32,
    now: u64,
) -> Result<(), BlockError> {
    if u64::from(header.time) <= u64::from(mtp) {
        return Err(BlockError::TimeTooOld);
    }
    if u64::from(header.time) > now + MAX_FUTURE_BLOCK_TIME {
        return Err(BlockError::TimeTooNew);
    }
    Ok(())
}
