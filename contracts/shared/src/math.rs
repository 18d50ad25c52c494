//! Overflow-safe arithmetic. Reward accounting multiplies 1e18-scale
//! balances by 1e18-scale accumulator deltas, which does not fit in i128,
//! so products are widened to 256 bits before the division.

use soroban_sdk::{Env, I256};

use crate::rewards::RewardError;
use crate::MAX_BASIS_POINTS;

/// `a * b / denom` with a 256-bit intermediate. Floor division; all reward
/// math in the protocol rounds down.
pub fn mul_div(env: &Env, a: i128, b: i128, denom: i128) -> Result<i128, RewardError> {
    if denom == 0 {
        return Err(RewardError::NumericOverflow);
    }
    let product = I256::from_i128(env, a).mul(&I256::from_i128(env, b));
    product
        .div(&I256::from_i128(env, denom))
        .to_i128()
        .ok_or(RewardError::NumericOverflow)
}

/// Apply a basis-point fraction to an amount, rounding down
pub fn apply_bps(amount: i128, bps: u32) -> Result<i128, RewardError> {
    amount
        .checked_mul(bps as i128)
        .ok_or(RewardError::NumericOverflow)
        .map(|scaled| scaled / MAX_BASIS_POINTS as i128)
}
