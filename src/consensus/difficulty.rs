//! Compact difficulty encoding and per-block retargeting.
//!
//! The header's `difficulty` field is a 64-bit value, but the mining target
//! is always derived from it through Bitcoin's nBits convention: the high
//! byte of the low 32 bits is the exponent, the low three bytes are the
//! mantissa, and `target = mantissa * 2^(8*(exponent-3))`.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Easiest permitted target (genesis-style difficulty), matching Bitcoin's
/// mainnet starting nBits.
pub const MAX_TARGET_COMPACT: u32 = 0x1d00_ffff;

/// Hardest permitted target — an arbitrary floor chosen so tests can reach
/// it within a bounded nonce search; real deployments would tune this.
pub const MIN_TARGET_COMPACT: u32 = 0x0300_0001;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DifficultyParams {
    /// Target spacing between blocks, in seconds (spec-fixed: T = 10).
    pub target_spacing_secs: u64,
    pub min_target_compact: u32,
    pub max_target_compact: u32,
}

impl Default for DifficultyParams {
    fn default() -> Self {
        Self {
            target_spacing_secs: 10,
            min_target_compact: MIN_TARGET_COMPACT,
            max_target_compact: MAX_TARGET_COMPACT,
        }
    }
}

/// Bitcoin-style nBits: high byte exponent, low three bytes mantissa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactDifficulty(pub u32);

impl CompactDifficulty {
    pub fn exponent(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn mantissa(&self) -> u32 {
        self.0 & 0x00ff_ffff
    }

    /// `target = mantissa * 2^(8*(exponent-3))`, returned as a 32-byte
    /// big-endian array (saturating to all-ones if it would overflow).
    pub fn to_target(&self) -> [u8; 32] {
        let mantissa = BigUint::from(self.mantissa());
        let exponent = self.exponent() as i64;
        let shift = 8 * (exponent - 3);
        let target = if shift >= 0 {
            mantissa << (shift as u32)
        } else {
            mantissa >> ((-shift) as u32)
        };
        biguint_to_32_bytes(&target)
    }

    /// Smallest-size compact encoding representing `target` (rounding is
    /// inherent to the mantissa truncation, same as Bitcoin's nBits).
    pub fn from_target_bytes(target: &[u8; 32]) -> Self {
        let first_nonzero = target.iter().position(|&b| b != 0);
        let Some(first_nonzero) = first_nonzero else {
            return CompactDifficulty(0);
        };
        let significant = &target[first_nonzero..];
        let mut size = significant.len() as u32;
        let mut mantissa_bytes = [0u8; 3];
        if significant.len() >= 3 {
            mantissa_bytes.copy_from_slice(&significant[0..3]);
        } else {
            let pad = 3 - significant.len();
            mantissa_bytes[pad..].copy_from_slice(significant);
        }
        let mut compact = ((mantissa_bytes[0] as u32) << 16)
            | ((mantissa_bytes[1] as u32) << 8)
            | (mantissa_bytes[2] as u32);
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        CompactDifficulty(compact | (size << 24))
    }
}

fn biguint_to_32_bytes(value: &BigUint) -> [u8; 32] {
    let be = value.to_bytes_be();
    if be.len() > 32 {
        return [0xffu8; 32];
    }
    let mut out = [0u8; 32];
    out[32 - be.len()..].copy_from_slice(&be);
    out
}

/// A header satisfies the target iff the lowercase hex of its (double-hashed)
/// hash compares lexicographically less than the zero-padded target hex.
/// Fixed-width lowercase hex compares identically to unsigned big-endian
/// integer comparison, so this is equivalent to (and implemented as) the
/// latter — but expressed the way the spec states the check.
pub fn hash_meets_target(hash_hex: &str, target: &[u8; 32]) -> bool {
    hash_hex < hex::encode(target).as_str()
}

/// Per-block retarget (spec-fixed consensus parameter, no fixed epoch):
/// if the parent→block spacing is under `target_spacing_secs`, the target
/// shrinks by `1/2048` (harder); otherwise it grows by `1/2048` (easier).
/// Clamped to `[min_target_compact, max_target_compact]`.
pub fn retarget(
    parent_compact: u32,
    parent_timestamp: u32,
    block_timestamp: u32,
    params: &DifficultyParams,
) -> u32 {
    let parent_target_bytes = CompactDifficulty(parent_compact).to_target();
    let parent_target = BigUint::from_bytes_be(&parent_target_bytes);
    if parent_target.is_zero() {
        return parent_compact;
    }

    let spacing = block_timestamp.saturating_sub(parent_timestamp) as u64;
    let delta = parent_target.clone() >> 11u32; // 1/2048
    let adjusted = if spacing < params.target_spacing_secs {
        if parent_target > delta {
            &parent_target - &delta
        } else {
            BigUint::from(1u8)
        }
    } else {
        &parent_target + &delta
    };

    let min_target = BigUint::from_bytes_be(&CompactDifficulty(params.min_target_compact).to_target());
    let max_target = BigUint::from_bytes_be(&CompactDifficulty(params.max_target_compact).to_target());
    let clamped = adjusted.clamp(min_target, max_target);
    CompactDifficulty::from_target_bytes(&biguint_to_32_bytes(&clamped)).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_compact_roundtrips_through_target() {
        let compact = CompactDifficulty(MAX_TARGET_COMPACT);
        let target = compact.to_target();
        let back = CompactDifficulty::from_target_bytes(&target);
        assert_eq!(back.0, MAX_TARGET_COMPACT);
    }

    #[test]
    fn target_matches_mantissa_times_power_of_two() {
        // exponent 4, mantissa 1 => target = 1 * 2^8 = 256
        let compact = CompactDifficulty(0x0400_0001);
        let target = compact.to_target();
        let value = BigUint::from_bytes_be(&target);
        assert_eq!(value, BigUint::from(256u32));
    }

    #[test]
    fn fast_blocks_shrink_target() {
        let params = DifficultyParams::default();
        let next = retarget(MAX_TARGET_COMPACT, 1_000, 1_005, &params);
        let next_target = BigUint::from_bytes_be(&CompactDifficulty(next).to_target());
        let parent_target = BigUint::from_bytes_be(&CompactDifficulty(MAX_TARGET_COMPACT).to_target());
        assert!(next_target < parent_target);
    }

    #[test]
    fn slow_blocks_grow_target_up_to_clamp() {
        let params = DifficultyParams::default();
        let next = retarget(MIN_TARGET_COMPACT, 1_000, 2_000, &params);
        let next_target = BigUint::from_bytes_be(&CompactDifficulty(next).to_target());
        let parent_target = BigUint::from_bytes_be(&CompactDifficulty(MIN_TARGET_COMPACT).to_target());
        assert!(next_target > parent_target);
    }

    #[test]
    fn hash_meets_target_is_lexicographic() {
        let target = [0x00u8; 32];
        let mut above = [0u8; 32];
        above[31] = 1;
        let hash_hex = hex::encode(above);
        assert!(!hash_meets_target(&hash_hex, &target));

        let mut real_target = [0xffu8; 32];
        real_target[0] = 0x00;
        let low_hash_hex = hex::encode([0u8; 32]);
        assert!(hash_meets_target(&low_hash_hex, &real_target));
    }
}
