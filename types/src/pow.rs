//! Compact difficulty targets.
//!
//! Difficulty is carried in headers as a 32-bit compact number (one exponent
//! byte, three mantissa bytes). It expands to a 256-bit big-endian target; a
//! block satisfies proof-of-work when its hash, read as a big-endian integer,
//! does not exceed the target.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::block::BlockHash;
use crate::error::TypesError;

/// A 256-bit big-endian difficulty target.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target([u8; 32]);

impl Target {
    pub const MAX: Self = Self([0xff; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Expand compact bits. Negative or overflowing encodings are rejected.
    pub fn from_compact(bits: u32) -> Result<Self, TypesError> {
        let exponent = (bits >> 24) as i64;
        let mantissa = bits & 0x007f_ffff;
        if bits & 0x0080_0000 != 0 && mantissa != 0 {
            return Err(TypesError::InvalidCompact(bits));
        }
        let digits = [(mantissa >> 16) as u8, (mantissa >> 8) as u8, mantissa as u8];
        let mut out = [0u8; 32];
        for (i, digit) in digits.iter().enumerate() {
            // Power of 256 this mantissa byte lands on.
            let weight = exponent - 1 - i as i64;
            if weight < 0 {
                continue;
            }
            if weight >= 32 {
                if *digit != 0 {
                    return Err(TypesError::InvalidCompact(bits));
                }
                continue;
            }
            out[31 - weight as usize] = *digit;
        }
        Ok(Self(out))
    }

    /// Re-encode as compact bits. Precision below the top three significant
    /// bytes is lost.
    pub fn to_compact(&self) -> u32 {
        let Some(first) = self.0.iter().position(|b| *b != 0) else {
            return 0;
        };
        let mut size = (32 - first) as u32;
        let byte_at = |i: usize| if i < 32 { self.0[i] as u32 } else { 0 };
        let mut mantissa = (byte_at(first) << 16) | (byte_at(first + 1) << 8) | byte_at(first + 2);
        if mantissa & 0x0080_0000 != 0 {
            mantissa >>= 8;
            size += 1;
        }
        (size << 24) | mantissa
    }

    pub fn is_met_by(&self, hash: &BlockHash) -> bool {
        hash.as_bytes() <= &self.0
    }

    /// Multiply by a small factor, clamping to [`Target::MAX`] on overflow.
    pub fn saturating_mul(&self, factor: u32) -> Self {
        let mut out = [0u8; 32];
        let mut carry: u64 = 0;
        for i in (0..32).rev() {
            let product = self.0[i] as u64 * factor as u64 + carry;
            out[i] = product as u8;
            carry = product >> 8;
        }
        if carry != 0 {
            return Self::MAX;
        }
        Self(out)
    }

    /// The top 128 bits.
    fn high_u128(&self) -> u128 {
        let mut hi = [0u8; 16];
        hi.copy_from_slice(&self.0[..16]);
        u128::from_be_bytes(hi)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({:#010x})", self.to_compact())
    }
}

/// Expected number of hashes needed to meet `bits`, approximately
/// `2^256 / (target + 1)`. Saturates at `u128::MAX` for targets below 2^128.
pub fn calc_work(bits: u32) -> u128 {
    let Ok(target) = Target::from_compact(bits) else {
        return 0;
    };
    let hi = target.high_u128();
    if hi == 0 {
        return u128::MAX;
    }
    (u128::MAX / hi.saturating_add(1)).max(1)
}

/// The easiest target a block may legally carry `elapsed_secs` after a block
/// with target `start`: the target may loosen by `factor` once per
/// `max_retarget_secs`, never beyond `pow_limit`.
pub fn easiest_target(
    start: Target,
    elapsed_secs: u64,
    max_retarget_secs: u64,
    factor: u32,
    pow_limit: Target,
) -> Target {
    let mut target = start;
    let mut remaining = elapsed_secs;
    let step = max_retarget_secs.max(1);
    while remaining > 0 && target < pow_limit {
        target = target.saturating_mul(factor.max(2));
        remaining = remaining.saturating_sub(step);
    }
    target.min(pow_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_round_trip() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x1f0198f2, 0x03123456] {
            let target = Target::from_compact(bits).unwrap();
            assert_eq!(target.to_compact(), bits, "bits {bits:#x}");
        }
    }

    #[test]
    fn small_exponent_shifts_right() {
        let target = Target::from_compact(0x01120000).unwrap();
        assert_eq!(target.as_bytes()[31], 0x12);
        assert!(target.as_bytes()[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn negative_and_overflowing_are_rejected() {
        assert!(Target::from_compact(0x04923456).is_err());
        assert!(Target::from_compact(0x22123456).is_err());
    }

    #[test]
    fn regtest_limit_accepts_low_hashes() {
        let target = Target::from_compact(0x207fffff).unwrap();
        let mut low = [0u8; 32];
        low[0] = 0x10;
        assert!(target.is_met_by(&BlockHash::new(low)));
        assert!(!target.is_met_by(&BlockHash::new([0xff; 32])));
    }

    #[test]
    fn easier_targets_have_less_work() {
        assert!(calc_work(0x1d00ffff) > calc_work(0x207fffff));
        assert!(calc_work(0x207fffff) >= 1);
    }

    #[test]
    fn easiest_target_is_clamped_to_limit() {
        let limit = Target::from_compact(0x207fffff).unwrap();
        let start = Target::from_compact(0x1d00ffff).unwrap();
        assert_eq!(easiest_target(start, 0, 100, 4, limit), start);
        let one_step = easiest_target(start, 50, 100, 4, limit);
        assert_eq!(one_step, start.saturating_mul(4));
        assert_eq!(easiest_target(start, u64::MAX / 2, 1, 4, limit), limit);
    }
}
