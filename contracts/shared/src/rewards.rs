//! Reward-per-share accrual engine shared by gauges and bribes.
//!
//! The embedding contract owns the balance source: it reports every balance
//! and total-supply change through [`record_balance`] / [`record_supply`],
//! and the engine keeps per-index checkpoint streams so that accrual stays
//! exact across balance churn without iterating holders. Accumulator
//! catch-up walks supply checkpoints from a persisted cursor and is
//! resumable in bounded steps, so a long-idle contract can be brought
//! current over several calls.
//!
//! While total supply is zero the cursor does not advance: reward scheduled
//! across an empty stretch is realized by whoever holds balance once the
//! cursor moves again, instead of being stranded.

use soroban_sdk::{contracterror, contracttype, Address, Env, Vec};

use crate::{math, MAX_REWARD_TOKENS, PRECISION, REWARD_DURATION};

// ============================================================================
// Types
// ============================================================================

/// Identifies a reward holder. Gauges key accrual by depositor account,
/// bribes by escrow position id so claims follow position ownership.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StakeKey {
    Account(Address),
    Position(u64),
}

/// Streaming state for one reward token.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewardData {
    /// Tokens streamed per second for the current window
    pub reward_rate: i128,
    /// End of the current window
    pub period_finish: u64,
    /// Accrual cursor: the accumulator is exact up to this time
    pub last_update_time: u64,
    /// Monotone reward-per-share accumulator, PRECISION-scaled
    pub reward_per_share_stored: i128,
}

/// One entry of a balance / supply / accumulator checkpoint stream.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewardCheckpoint {
    pub timestamp: u64,
    pub value: i128,
}

/// Per-(token, holder) claim bookkeeping.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HolderRewardState {
    /// Accumulator value already paid out to the holder
    pub reward_per_share_paid: i128,
    /// Time of the holder's last settlement
    pub last_earn_time: u64,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum RewardKey {
    RewardTokens,
    Data(Address),
    RpsCount(Address),
    RpsCheckpoint(Address, u32),
    SupplyCount,
    SupplyCheckpoint(u32),
    BalanceCount(StakeKey),
    BalanceCheckpoint(StakeKey, u32),
    Holder(Address, StakeKey),
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum RewardError {
    NumericOverflow = 1,
    TooManyRewardTokens = 2,
    RewardRateZero = 3,
}

fn zero_checkpoint() -> RewardCheckpoint {
    RewardCheckpoint {
        timestamp: 0,
        value: 0,
    }
}

// ============================================================================
// Reward Token Registry
// ============================================================================

pub fn reward_tokens(env: &Env) -> Vec<Address> {
    env.storage()
        .instance()
        .get(&RewardKey::RewardTokens)
        .unwrap_or(Vec::new(env))
}

pub fn is_reward_token(env: &Env, token: &Address) -> bool {
    reward_tokens(env).contains(token)
}

fn register_reward_token(env: &Env, token: &Address) -> Result<(), RewardError> {
    let mut tokens = reward_tokens(env);
    if tokens.contains(token) {
        return Ok(());
    }
    if tokens.len() >= MAX_REWARD_TOKENS {
        return Err(RewardError::TooManyRewardTokens);
    }
    tokens.push_back(token.clone());
    env.storage().instance().set(&RewardKey::RewardTokens, &tokens);
    Ok(())
}

// ============================================================================
// Reward Window State
// ============================================================================

pub fn reward_data(env: &Env, token: &Address) -> RewardData {
    env.storage()
        .instance()
        .get(&RewardKey::Data(token.clone()))
        .unwrap_or(RewardData {
            reward_rate: 0,
            period_finish: 0,
            last_update_time: 0,
            reward_per_share_stored: 0,
        })
}

fn write_reward_data(env: &Env, token: &Address, data: &RewardData) {
    env.storage()
        .instance()
        .set(&RewardKey::Data(token.clone()), data);
}

pub fn last_time_reward_applicable(env: &Env, token: &Address) -> u64 {
    env.ledger()
        .timestamp()
        .min(reward_data(env, token).period_finish)
}

/// Undistributed remainder of the live window for `token`.
pub fn left(env: &Env, token: &Address) -> i128 {
    let data = reward_data(env, token);
    let now = env.ledger().timestamp();
    if now >= data.period_finish {
        return 0;
    }
    ((data.period_finish - now) as i128) * data.reward_rate
}

// ============================================================================
// Checkpoint Streams
// ============================================================================

fn balance_count(env: &Env, holder: &StakeKey) -> u32 {
    env.storage()
        .persistent()
        .get(&RewardKey::BalanceCount(holder.clone()))
        .unwrap_or(0)
}

fn balance_checkpoint(env: &Env, holder: &StakeKey, index: u32) -> RewardCheckpoint {
    env.storage()
        .persistent()
        .get(&RewardKey::BalanceCheckpoint(holder.clone(), index))
        .unwrap_or(zero_checkpoint())
}

fn supply_count(env: &Env) -> u32 {
    env.storage()
        .instance()
        .get(&RewardKey::SupplyCount)
        .unwrap_or(0)
}

fn supply_checkpoint(env: &Env, index: u32) -> RewardCheckpoint {
    env.storage()
        .persistent()
        .get(&RewardKey::SupplyCheckpoint(index))
        .unwrap_or(zero_checkpoint())
}

fn rps_count(env: &Env, token: &Address) -> u32 {
    env.storage()
        .instance()
        .get(&RewardKey::RpsCount(token.clone()))
        .unwrap_or(0)
}

fn rps_checkpoint(env: &Env, token: &Address, index: u32) -> RewardCheckpoint {
    env.storage()
        .persistent()
        .get(&RewardKey::RpsCheckpoint(token.clone(), index))
        .unwrap_or(zero_checkpoint())
}

/// Record the holder's balance after a change. A second write within the
/// same ledger timestamp overwrites the previous entry.
pub fn record_balance(env: &Env, holder: &StakeKey, balance: i128) {
    let now = env.ledger().timestamp();
    let count = balance_count(env, holder);
    if count > 0 {
        let key = RewardKey::BalanceCheckpoint(holder.clone(), count - 1);
        let mut last: RewardCheckpoint = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(zero_checkpoint());
        if last.timestamp == now {
            last.value = balance;
            env.storage().persistent().set(&key, &last);
            return;
        }
    }
    env.storage().persistent().set(
        &RewardKey::BalanceCheckpoint(holder.clone(), count),
        &RewardCheckpoint {
            timestamp: now,
            value: balance,
        },
    );
    env.storage()
        .persistent()
        .set(&RewardKey::BalanceCount(holder.clone()), &(count + 1));
}

/// Record the total supply after a change. Same overwrite rule as
/// [`record_balance`].
pub fn record_supply(env: &Env, total: i128) {
    let now = env.ledger().timestamp();
    let count = supply_count(env);
    if count > 0 {
        let key = RewardKey::SupplyCheckpoint(count - 1);
        let mut last: RewardCheckpoint = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(zero_checkpoint());
        if last.timestamp == now {
            last.value = total;
            env.storage().persistent().set(&key, &last);
            return;
        }
    }
    env.storage().persistent().set(
        &RewardKey::SupplyCheckpoint(count),
        &RewardCheckpoint {
            timestamp: now,
            value: total,
        },
    );
    env.storage()
        .instance()
        .set(&RewardKey::SupplyCount, &(count + 1));
}

fn write_rps_checkpoint(env: &Env, token: &Address, value: i128, timestamp: u64) {
    let count = rps_count(env, token);
    if count > 0 {
        let key = RewardKey::RpsCheckpoint(token.clone(), count - 1);
        let mut last: RewardCheckpoint = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(zero_checkpoint());
        if last.timestamp == timestamp {
            last.value = value;
            env.storage().persistent().set(&key, &last);
            return;
        }
    }
    env.storage().persistent().set(
        &RewardKey::RpsCheckpoint(token.clone(), count),
        &RewardCheckpoint {
            timestamp,
            value,
        },
    );
    env.storage()
        .instance()
        .set(&RewardKey::RpsCount(token.clone()), &(count + 1));
}

// ============================================================================
// Prior-Checkpoint Lookups (binary search, O(log n))
// ============================================================================

fn prior_balance_index(env: &Env, holder: &StakeKey, timestamp: u64) -> u32 {
    let count = balance_count(env, holder);
    if count == 0 {
        return 0;
    }
    if balance_checkpoint(env, holder, count - 1).timestamp <= timestamp {
        return count - 1;
    }
    if balance_checkpoint(env, holder, 0).timestamp > timestamp {
        return 0;
    }
    let mut lower = 0u32;
    let mut upper = count - 1;
    while upper > lower {
        let center = upper - (upper - lower) / 2;
        let cp = balance_checkpoint(env, holder, center);
        if cp.timestamp == timestamp {
            return center;
        } else if cp.timestamp < timestamp {
            lower = center;
        } else {
            upper = center - 1;
        }
    }
    lower
}

fn prior_supply_index(env: &Env, timestamp: u64) -> u32 {
    let count = supply_count(env);
    if count == 0 {
        return 0;
    }
    if supply_checkpoint(env, count - 1).timestamp <= timestamp {
        return count - 1;
    }
    if supply_checkpoint(env, 0).timestamp > timestamp {
        return 0;
    }
    let mut lower = 0u32;
    let mut upper = count - 1;
    while upper > lower {
        let center = upper - (upper - lower) / 2;
        let cp = supply_checkpoint(env, center);
        if cp.timestamp == timestamp {
            return center;
        } else if cp.timestamp < timestamp {
            lower = center;
        } else {
            upper = center - 1;
        }
    }
    lower
}

fn prior_reward_per_share(env: &Env, token: &Address, timestamp: u64) -> RewardCheckpoint {
    let count = rps_count(env, token);
    if count == 0 {
        return zero_checkpoint();
    }
    let last = rps_checkpoint(env, token, count - 1);
    if last.timestamp <= timestamp {
        return last;
    }
    if rps_checkpoint(env, token, 0).timestamp > timestamp {
        return zero_checkpoint();
    }
    let mut lower = 0u32;
    let mut upper = count - 1;
    while upper > lower {
        let center = upper - (upper - lower) / 2;
        let cp = rps_checkpoint(env, token, center);
        if cp.timestamp == timestamp {
            return cp;
        } else if cp.timestamp < timestamp {
            lower = center;
        } else {
            upper = center - 1;
        }
    }
    rps_checkpoint(env, token, lower)
}

// ============================================================================
// Accumulator Advancement
// ============================================================================

/// Accumulator growth over one interval. `interval_end` is the nominal end
/// of the interval; accrual is measured from the cursor (never from the
/// interval's nominal start) so stretches skipped while supply was zero are
/// made up here, and capped at `period_finish`. Returns the delta and the
/// new cursor position.
fn accrual_over(
    env: &Env,
    data: &RewardData,
    interval_end: u64,
    supply: i128,
    cursor: u64,
) -> Result<(i128, u64), RewardError> {
    let end_time = interval_end.max(cursor);
    let capped_end = end_time.min(data.period_finish);
    let capped_start = cursor.min(data.period_finish);
    let elapsed = capped_end.saturating_sub(capped_start);
    if elapsed == 0 || supply <= 0 {
        return Ok((0, end_time));
    }
    let accrued = (elapsed as i128)
        .checked_mul(data.reward_rate)
        .ok_or(RewardError::NumericOverflow)?;
    let delta = math::mul_div(env, accrued, PRECISION, supply)?;
    Ok((delta, end_time))
}

/// Advance the reward-per-share accumulator for `token` through at most
/// `max_steps` supply-checkpoint intervals, resuming from the persisted
/// cursor. With `finalize` the stretch from the last checkpoint to `now` is
/// closed as well. Idempotent once caught up; callable by anyone through
/// the embedding contract.
pub fn advance_reward_per_share(
    env: &Env,
    token: &Address,
    max_steps: u32,
    finalize: bool,
) -> Result<i128, RewardError> {
    let mut data = reward_data(env, token);
    let now = env.ledger().timestamp();
    let checkpoints = supply_count(env);
    if checkpoints == 0 {
        // nothing has ever been staked; hold the cursor so the window is
        // realized once balance appears
        return Ok(data.reward_per_share_stored);
    }
    if data.reward_rate == 0 {
        data.last_update_time = now;
        write_reward_data(env, token, &data);
        return Ok(data.reward_per_share_stored);
    }

    let mut cursor = data.last_update_time;
    let mut value = data.reward_per_share_stored;
    let end_index = checkpoints - 1;
    let mut index = prior_supply_index(env, cursor);
    let mut steps = 0u32;
    while index < end_index && steps < max_steps {
        let cp = supply_checkpoint(env, index);
        if cp.value > 0 {
            let next = supply_checkpoint(env, index + 1);
            let (delta, end_time) = accrual_over(env, &data, next.timestamp, cp.value, cursor)?;
            value = value
                .checked_add(delta)
                .ok_or(RewardError::NumericOverflow)?;
            write_rps_checkpoint(env, token, value, end_time);
            cursor = end_time;
        }
        index += 1;
        steps += 1;
    }

    if finalize && index == end_index {
        let cp = supply_checkpoint(env, end_index);
        if cp.value > 0 {
            let (delta, end_time) = accrual_over(env, &data, now, cp.value, cursor)?;
            value = value
                .checked_add(delta)
                .ok_or(RewardError::NumericOverflow)?;
            write_rps_checkpoint(env, token, value, end_time);
            cursor = end_time;
        }
        // supply zero at the tail: cursor stays frozen
    }

    data.reward_per_share_stored = value;
    data.last_update_time = cursor;
    write_reward_data(env, token, &data);
    Ok(value)
}

/// Present-time accumulator value: the stored value plus the live stretch
/// since the cursor, against the current supply.
pub fn reward_per_share(env: &Env, token: &Address) -> Result<i128, RewardError> {
    let data = reward_data(env, token);
    let count = supply_count(env);
    if count == 0 {
        return Ok(data.reward_per_share_stored);
    }
    let supply = supply_checkpoint(env, count - 1).value;
    if supply <= 0 {
        return Ok(data.reward_per_share_stored);
    }
    let applicable = last_time_reward_applicable(env, token);
    let elapsed = applicable.saturating_sub(data.last_update_time.min(applicable));
    let accrued = (elapsed as i128)
        .checked_mul(data.reward_rate)
        .ok_or(RewardError::NumericOverflow)?;
    let stretch = math::mul_div(env, accrued, PRECISION, supply)?;
    data.reward_per_share_stored
        .checked_add(stretch)
        .ok_or(RewardError::NumericOverflow)
}

// ============================================================================
// Notify / Earn / Settle
// ============================================================================

/// Start or extend a distribution window. The accumulator is checkpointed
/// up to `now` at the old rate first; whatever the old window has not yet
/// credited folds into the new rate, `(amount + remaining) / REWARD_DURATION`,
/// floor division. The remainder is measured from the cursor, not from
/// `now`, so reward backlogged across a zero-supply stretch survives a
/// renotify. The resulting rate must be nonzero.
pub fn notify_reward(env: &Env, token: &Address, amount: i128) -> Result<i128, RewardError> {
    register_reward_token(env, token)?;
    advance_reward_per_share(env, token, u32::MAX, true)?;

    let mut data = reward_data(env, token);
    let now = env.ledger().timestamp();
    let remaining = (data.period_finish.saturating_sub(data.last_update_time) as i128)
        .checked_mul(data.reward_rate)
        .ok_or(RewardError::NumericOverflow)?;
    let rate = amount
        .checked_add(remaining)
        .ok_or(RewardError::NumericOverflow)?
        / (REWARD_DURATION as i128);
    if rate == 0 {
        return Err(RewardError::RewardRateZero);
    }
    data.reward_rate = rate;
    data.last_update_time = now;
    data.period_finish = now + REWARD_DURATION;
    write_reward_data(env, token, &data);
    Ok(rate)
}

fn holder_state(env: &Env, token: &Address, holder: &StakeKey) -> HolderRewardState {
    env.storage()
        .persistent()
        .get(&RewardKey::Holder(token.clone(), holder.clone()))
        .unwrap_or(HolderRewardState {
            reward_per_share_paid: 0,
            last_earn_time: 0,
        })
}

/// Reward accrued and not yet paid for (token, holder): walks the holder's
/// balance checkpoints since its last settlement, pairing each interval
/// with the accumulator value in force at its boundaries, plus the final
/// stretch at the holder's latest balance.
pub fn earned(env: &Env, token: &Address, holder: &StakeKey) -> Result<i128, RewardError> {
    let count = balance_count(env, holder);
    if count == 0 {
        return Ok(0);
    }
    let state = holder_state(env, token, holder);
    let first_rps_ts = if rps_count(env, token) > 0 {
        rps_checkpoint(env, token, 0).timestamp
    } else {
        0
    };
    let start_ts = state.last_earn_time.max(first_rps_ts);
    let end_index = count - 1;
    let mut reward: i128 = 0;

    if end_index > 0 {
        let mut index = prior_balance_index(env, holder, start_ts);
        while index < end_index {
            let cp0 = balance_checkpoint(env, holder, index);
            let cp1 = balance_checkpoint(env, holder, index + 1);
            if cp0.value > 0 {
                let rps0 = prior_reward_per_share(env, token, cp0.timestamp).value;
                let rps1 = prior_reward_per_share(env, token, cp1.timestamp).value;
                let delta = rps1
                    .checked_sub(rps0)
                    .ok_or(RewardError::NumericOverflow)?;
                if delta > 0 {
                    reward = reward
                        .checked_add(math::mul_div(env, cp0.value, delta, PRECISION)?)
                        .ok_or(RewardError::NumericOverflow)?;
                }
            }
            index += 1;
        }
    }

    let cp = balance_checkpoint(env, holder, end_index);
    if cp.value > 0 {
        let base = prior_reward_per_share(env, token, cp.timestamp)
            .value
            .max(state.reward_per_share_paid);
        let current = reward_per_share(env, token)?;
        let delta = current.checked_sub(base).unwrap_or(0);
        if delta > 0 {
            reward = reward
                .checked_add(math::mul_div(env, cp.value, delta, PRECISION)?)
                .ok_or(RewardError::NumericOverflow)?;
        }
    }
    Ok(reward)
}

/// Fully advance the accumulator, compute the holder's accrued amount and
/// stamp it as paid. The embedding contract performs the payout transfer
/// and re-records the holder's balance checkpoint. Unregistered tokens are
/// a no-op success (nothing can have accrued).
pub fn settle(env: &Env, token: &Address, holder: &StakeKey) -> Result<i128, RewardError> {
    if !is_reward_token(env, token) {
        return Ok(0);
    }
    advance_reward_per_share(env, token, u32::MAX, true)?;
    let amount = earned(env, token, holder)?;
    let data = reward_data(env, token);
    let state = HolderRewardState {
        reward_per_share_paid: data.reward_per_share_stored,
        last_earn_time: env.ledger().timestamp(),
    };
    env.storage().persistent().set(
        &RewardKey::Holder(token.clone(), holder.clone()),
        &state,
    );
    Ok(amount)
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::{PRECISION, REWARD_DURATION};
    use soroban_sdk::testutils::{Address as _, Ledger};
    use soroban_sdk::{contract, contractimpl, Address, Env};

    #[contract]
    struct Harness;

    #[contractimpl]
    impl Harness {}

    fn setup() -> (Env, Address, Address) {
        let env = Env::default();
        let contract_id = env.register_contract(None, Harness);
        let token = Address::generate(&env);
        (env, contract_id, token)
    }

    fn set_time(env: &Env, timestamp: u64) {
        env.ledger().with_mut(|li| {
            li.timestamp = timestamp;
        });
    }

    #[test]
    fn single_holder_collects_whole_window() {
        let (env, id, token) = setup();
        let alice = StakeKey::Account(Address::generate(&env));
        let amount = REWARD_DURATION as i128; // rate of exactly 1/sec

        set_time(&env, 1_000);
        env.as_contract(&id, || {
            record_balance(&env, &alice, 100);
            record_supply(&env, 100);
            let rate = notify_reward(&env, &token, amount).unwrap();
            assert_eq!(rate, 1);
        });

        set_time(&env, 1_000 + REWARD_DURATION + 50);
        env.as_contract(&id, || {
            let paid = settle(&env, &token, &alice).unwrap();
            assert_eq!(paid, amount);
            // immediately settling again yields nothing
            assert_eq!(settle(&env, &token, &alice).unwrap(), 0);
        });
    }

    #[test]
    fn mid_window_joiner_splits_second_half() {
        let (env, id, token) = setup();
        let alice = StakeKey::Account(Address::generate(&env));
        let bob = StakeKey::Account(Address::generate(&env));
        let amount = REWARD_DURATION as i128;

        set_time(&env, 1_000);
        env.as_contract(&id, || {
            record_balance(&env, &alice, 100);
            record_supply(&env, 100);
            notify_reward(&env, &token, amount).unwrap();
        });

        set_time(&env, 1_000 + REWARD_DURATION / 2);
        env.as_contract(&id, || {
            record_balance(&env, &bob, 100);
            record_supply(&env, 200);
        });

        set_time(&env, 1_000 + REWARD_DURATION + 10);
        env.as_contract(&id, || {
            let alice_paid = settle(&env, &token, &alice).unwrap();
            let bob_paid = settle(&env, &token, &bob).unwrap();
            let half = (REWARD_DURATION / 2) as i128;
            assert_eq!(alice_paid, half + half / 2);
            assert_eq!(bob_paid, half / 2);
            assert_eq!(alice_paid + bob_paid, amount);
        });
    }

    #[test]
    fn empty_stretch_is_realized_by_first_staker() {
        let (env, id, token) = setup();
        let alice = StakeKey::Account(Address::generate(&env));
        let amount = REWARD_DURATION as i128;

        // window opens with nothing staked
        set_time(&env, 1_000);
        env.as_contract(&id, || {
            notify_reward(&env, &token, amount).unwrap();
        });

        // alice arrives a third of the way in
        set_time(&env, 1_000 + REWARD_DURATION / 3);
        env.as_contract(&id, || {
            record_balance(&env, &alice, 500);
            record_supply(&env, 500);
        });

        // the pre-stake backlog is not stranded: alice collects the full
        // window amount
        set_time(&env, 1_000 + REWARD_DURATION + 1);
        env.as_contract(&id, || {
            assert_eq!(settle(&env, &token, &alice).unwrap(), amount);
        });
    }

    #[test]
    fn bounded_batches_reach_the_same_state_as_one_walk() {
        let env = Env::default();
        let batched = env.register_contract(None, Harness);
        let direct = env.register_contract(None, Harness);
        let token = Address::generate(&env);
        let alice = StakeKey::Account(Address::generate(&env));

        let mut now = 1_000u64;
        set_time(&env, now);
        for id in [&batched, &direct] {
            env.as_contract(id, || {
                record_balance(&env, &alice, 100);
                record_supply(&env, 100);
                notify_reward(&env, &token, REWARD_DURATION as i128).unwrap();
            });
        }

        // churn produces several supply checkpoints inside the window
        for step in 1..=5u64 {
            now = 1_000 + step * (REWARD_DURATION / 8);
            set_time(&env, now);
            let supply = 100 + (step as i128) * 20;
            for id in [&batched, &direct] {
                env.as_contract(id, || {
                    record_supply(&env, supply);
                });
            }
        }

        set_time(&env, 1_000 + REWARD_DURATION + 5);
        env.as_contract(&direct, || {
            advance_reward_per_share(&env, &token, u32::MAX, true).unwrap();
        });
        env.as_contract(&batched, || {
            // one interval at a time, then the closing stretch
            for _ in 0..10 {
                advance_reward_per_share(&env, &token, 1, false).unwrap();
            }
            advance_reward_per_share(&env, &token, u32::MAX, true).unwrap();
        });

        let direct_data = env.as_contract(&direct, || reward_data(&env, &token));
        let batched_data = env.as_contract(&batched, || reward_data(&env, &token));
        assert_eq!(direct_data, batched_data);
        // caught up: another walk changes nothing
        env.as_contract(&batched, || {
            advance_reward_per_share(&env, &token, u32::MAX, true).unwrap();
            assert_eq!(reward_data(&env, &token), batched_data);
        });
    }

    #[test]
    fn renotify_folds_remainder_with_floor_division() {
        let (env, id, token) = setup();
        let holder = StakeKey::Account(Address::generate(&env));

        set_time(&env, 1_000);
        env.as_contract(&id, || {
            record_balance(&env, &holder, 1);
            record_supply(&env, 1);
            let rate = notify_reward(&env, &token, REWARD_DURATION as i128).unwrap();
            assert_eq!(rate, 1);
        });

        // half the window remains: remainder = REWARD_DURATION / 2
        set_time(&env, 1_000 + REWARD_DURATION / 2);
        env.as_contract(&id, || {
            let remaining = (REWARD_DURATION / 2) as i128;
            let rate = notify_reward(&env, &token, remaining + 100).unwrap();
            // (remaining + remaining + 100) / REWARD_DURATION rounds down
            assert_eq!(rate, 1);
            let data = reward_data(&env, &token);
            assert_eq!(data.period_finish, 1_000 + REWARD_DURATION / 2 + REWARD_DURATION);
        });
    }

    #[test]
    fn renotify_preserves_zero_supply_backlog() {
        let (env, id, token) = setup();
        let alice = StakeKey::Account(Address::generate(&env));
        let amount = REWARD_DURATION as i128;

        // first window runs to completion with nobody staked
        set_time(&env, 1_000);
        env.as_contract(&id, || {
            notify_reward(&env, &token, amount).unwrap();
        });

        // a renotify after expiry folds the whole unserved window in
        set_time(&env, 1_000 + REWARD_DURATION + 500);
        env.as_contract(&id, || {
            let rate = notify_reward(&env, &token, amount).unwrap();
            assert_eq!(rate, 2);
        });

        set_time(&env, 1_000 + REWARD_DURATION + 600);
        env.as_contract(&id, || {
            record_balance(&env, &alice, 100);
            record_supply(&env, 100);
        });

        set_time(&env, 1_000 + 3 * REWARD_DURATION);
        env.as_contract(&id, || {
            assert_eq!(settle(&env, &token, &alice).unwrap(), 2 * amount);
        });
    }

    #[test]
    fn dust_notify_is_rejected() {
        let (env, id, token) = setup();
        set_time(&env, 1_000);
        env.as_contract(&id, || {
            assert_eq!(
                notify_reward(&env, &token, 100),
                Err(RewardError::RewardRateZero)
            );
        });
    }

    #[test]
    fn accumulator_precision_matches_manual_computation() {
        let (env, id, token) = setup();
        let alice = StakeKey::Account(Address::generate(&env));

        set_time(&env, 1_000);
        env.as_contract(&id, || {
            record_balance(&env, &alice, 300);
            record_supply(&env, 300);
            notify_reward(&env, &token, 3 * REWARD_DURATION as i128).unwrap();
        });

        set_time(&env, 1_000 + 1_000);
        env.as_contract(&id, || {
            // 1000s at rate 3 over supply 300
            let expected = 1_000i128 * 3 * PRECISION / 300;
            assert_eq!(reward_per_share(&env, &token).unwrap(), expected);
            assert_eq!(earned(&env, &token, &alice).unwrap(), 3_000);
        });
    }
}
