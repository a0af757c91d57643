//! Block reward schedule: a supplemental (non-spec) feature grounded in the
//! teacher's linear-decay emission model, adapted to credit an `Address`
//! directly rather than minting a UTXO.

use num_bigint::BigUint;

/// 10-minute blocks, 6 per hour * 24 * 365.
const BLOCKS_PER_YEAR: u64 = 52_560;

/// 1 unit = 100,000,000 base units.
const COIN: u64 = 100_000_000;

/// 32.375-unit initial block reward, in base units.
const INITIAL_REWARD_BASE_UNITS: u64 = 3_237_500_000;

/// 0.5-unit tail emission reward, in base units.
const FINAL_REWARD_BASE_UNITS: u64 = 50_000_000;

/// 24-year decay period.
const DECAY_PERIOD_YEARS: u64 = 24;

const DECAY_PERIOD_BLOCKS: u64 = BLOCKS_PER_YEAR * DECAY_PERIOD_YEARS;

/// Linear-decay block reward: `INITIAL_REWARD` down to `FINAL_REWARD` over
/// `DECAY_PERIOD_BLOCKS`, then a constant tail emission.
///
/// Computed with integer arithmetic (no floating point) so the reward is
/// reproducible bit-for-bit across implementations.
pub fn block_reward(height: u64) -> BigUint {
    if height >= DECAY_PERIOD_BLOCKS {
        return BigUint::from(FINAL_REWARD_BASE_UNITS);
    }

    let initial = BigUint::from(INITIAL_REWARD_BASE_UNITS);
    let delta = initial.clone() - BigUint::from(FINAL_REWARD_BASE_UNITS);
    let decayed = delta * BigUint::from(height) / BigUint::from(DECAY_PERIOD_BLOCKS);
    initial - decayed
}

/// True once a height has passed into the constant tail-emission regime.
pub fn is_tail_emission(height: u64) -> bool {
    height >= DECAY_PERIOD_BLOCKS
}

/// Reward amount expressed in whole units (base units / `COIN`), as a
/// floating approximation for display purposes only.
pub fn reward_in_whole_units(height: u64) -> f64 {
    let reward = block_reward(height);
    let reward_str = reward.to_string();
    reward_str.parse::<f64>().unwrap_or(0.0) / COIN as f64
}
