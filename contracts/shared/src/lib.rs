#![no_std]
//! Shared building blocks for the Laguna governance contracts: protocol
//! constants, epoch arithmetic, overflow-safe math, the reward-per-share
//! accrual engine embedded by gauges and bribes, and typed clients for
//! cross-contract calls.

use soroban_sdk::{Env, IntoVal, Val};

pub mod interfaces;
pub mod math;
pub mod rewards;

// ============================================================================
// Protocol Constants
// ============================================================================

/// Seconds in a day
pub const SECONDS_PER_DAY: u64 = 86400;

/// Epoch granularity: lock expiries, vote cooldown and reward windows all
/// align to week boundaries
pub const WEEK: u64 = 7 * SECONDS_PER_DAY;

/// Maximum lock duration (4 years)
pub const MAX_LOCK_DURATION: u64 = 4 * 365 * SECONDS_PER_DAY;

/// Length of one reward distribution window
pub const REWARD_DURATION: u64 = WEEK;

/// Fixed-point scale for reward-per-share accumulators and the emission index
pub const PRECISION: i128 = 1_000_000_000_000_000_000;

/// Basis points representing 100%
pub const MAX_BASIS_POINTS: u32 = 10_000;

/// Share of the raw deposit that always counts toward gauge weight (40%)
pub const BOOST_BASE_BPS: u32 = 4_000;

/// Share of gauge weight driven by relative voting power (60%)
pub const BOOST_VOTE_BPS: u32 = 6_000;

/// Cap on distinct reward tokens a single gauge or bribe will track
pub const MAX_REWARD_TOKENS: u32 = 16;

// Ledger TTL management (one ledger close every ~5 seconds)
pub const DAY_IN_LEDGERS: u32 = 17280;
pub const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
pub const INSTANCE_LIFETIME_THRESHOLD: u32 = INSTANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
pub const PERSISTENT_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
pub const PERSISTENT_LIFETIME_THRESHOLD: u32 = PERSISTENT_BUMP_AMOUNT - DAY_IN_LEDGERS;

// ============================================================================
// Epoch Arithmetic
// ============================================================================

/// Start of the epoch containing `timestamp`, rounded down to a week boundary
pub fn epoch_start(timestamp: u64) -> u64 {
    (timestamp / WEEK) * WEEK
}

/// Start of the epoch after the one containing `timestamp`
pub fn epoch_next(timestamp: u64) -> u64 {
    epoch_start(timestamp) + WEEK
}

// ============================================================================
// Storage Lifetime Helpers
// ============================================================================

/// Keep the contract instance (config, counters) alive
pub fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
}

/// Keep a persistent entry alive; the entry must exist
pub fn extend_persistent_ttl<K>(env: &Env, key: &K)
where
    K: IntoVal<Env, Val>,
{
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_LIFETIME_THRESHOLD, PERSISTENT_BUMP_AMOUNT);
}
