#![no_std]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, symbol_short, token, Address, Env,
    Vec,
};

use laguna_shared::{
    extend_instance_ttl, extend_persistent_ttl, math, MAX_LOCK_DURATION, WEEK,
};

// Data Types
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockedBalance {
    /// Locked principal
    pub amount: i128,
    /// Absolute expiry, rounded down to a week boundary
    pub end: u64,
}

/// One checkpoint of decaying power: `bias` is the power at `ts`, `slope`
/// the per-second decay until the underlying locks expire.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EscrowConfig {
    pub admin: Address,
    pub token: Address,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Voter,
    NextPositionId,
    Supply,
    Epoch,
    PointHistory(u32),
    SlopeChange(u64),
    Locked(u64),
    Owner(u64),
    OwnerPositions(Address),
    UserEpoch(u64),
    UserPointHistory(u64, u32),
    Voted(u64),
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum EscrowError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    ZeroAmount = 4,
    InvalidDuration = 5,
    LockExpired = 6,
    LockNotExpired = 7,
    PositionNotFound = 8,
    PositionVoted = 9,
    InvalidFraction = 10,
    SamePosition = 11,
    NumericOverflow = 12,
    VoterNotSet = 13,
}

// Events
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateLockEvent {
    pub owner: Address,
    pub position_id: u64,
    pub amount: i128,
    pub unlock_time: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DepositEvent {
    pub position_id: u64,
    pub amount: i128,
    pub unlock_time: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawEvent {
    pub owner: Address,
    pub position_id: u64,
    pub amount: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergeEvent {
    pub source_id: u64,
    pub target_id: u64,
    pub amount: i128,
    pub unlock_time: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SplitEvent {
    pub source_id: u64,
    pub new_id: u64,
    pub amount: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferPositionEvent {
    pub from: Address,
    pub to: Address,
    pub position_id: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VotedStateEvent {
    pub position_id: u64,
    pub voted: bool,
    pub timestamp: u64,
}

#[contract]
pub struct VotingEscrowContract;

#[contractimpl]
impl VotingEscrowContract {
    /// Initialize the escrow with its admin and the token it locks
    pub fn initialize(env: Env, admin: Address, token: Address) -> Result<(), EscrowError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(EscrowError::AlreadyInitialized);
        }
        admin.require_auth();

        let config = EscrowConfig {
            admin: admin.clone(),
            token,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::NextPositionId, &1u64);
        env.storage().instance().set(&DataKey::Supply, &0i128);
        env.storage().instance().set(&DataKey::Epoch, &0u32);

        log!(&env, "Voting escrow initialized by admin: {}", admin);

        Ok(())
    }

    /// Bind the voter contract allowed to flag positions as voted
    pub fn set_voter(env: Env, admin: Address, voter: Address) -> Result<(), EscrowError> {
        admin.require_auth();
        let config = Self::get_config(&env)?;
        if config.admin != admin {
            return Err(EscrowError::Unauthorized);
        }
        env.storage().instance().set(&DataKey::Voter, &voter);
        Ok(())
    }

    /// Lock `amount` of the escrow token for `duration` seconds and mint a
    /// new position to `from`. The expiry rounds down to a week boundary.
    pub fn create_lock(
        env: Env,
        from: Address,
        amount: i128,
        duration: u64,
    ) -> Result<u64, EscrowError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(EscrowError::ZeroAmount);
        }
        if duration == 0 || duration > MAX_LOCK_DURATION {
            return Err(EscrowError::InvalidDuration);
        }
        let now = env.ledger().timestamp();
        let unlock_time = ((now + duration) / WEEK) * WEEK;
        if unlock_time <= now {
            return Err(EscrowError::InvalidDuration);
        }

        let id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextPositionId)
            .unwrap_or(1);
        env.storage()
            .instance()
            .set(&DataKey::NextPositionId, &(id + 1));

        env.storage().persistent().set(&DataKey::Owner(id), &from);
        Self::add_owner_position(&env, &from, id);

        token::Client::new(&env, &config.token).transfer(
            &from,
            &env.current_contract_address(),
            &amount,
        );

        let old = LockedBalance { amount: 0, end: 0 };
        let new = LockedBalance {
            amount,
            end: unlock_time,
        };
        Self::update_lock(&env, id, &old, &new)?;

        env.events().publish(
            (symbol_short!("create"),),
            CreateLockEvent {
                owner: from.clone(),
                position_id: id,
                amount,
                unlock_time,
                timestamp: now,
            },
        );
        log!(&env, "Position {} locked {} until {}", id, amount, unlock_time);

        Ok(id)
    }

    /// Add principal to an unexpired position without touching its expiry
    pub fn increase_amount(
        env: Env,
        from: Address,
        id: u64,
        amount: i128,
    ) -> Result<(), EscrowError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_owner(&env, id, &from)?;

        if amount <= 0 {
            return Err(EscrowError::ZeroAmount);
        }
        let old = Self::locked_balance(&env, id)?;
        let now = env.ledger().timestamp();
        if old.end <= now {
            return Err(EscrowError::LockExpired);
        }

        token::Client::new(&env, &config.token).transfer(
            &from,
            &env.current_contract_address(),
            &amount,
        );

        let new = LockedBalance {
            amount: old
                .amount
                .checked_add(amount)
                .ok_or(EscrowError::NumericOverflow)?,
            end: old.end,
        };
        Self::update_lock(&env, id, &old, &new)?;

        env.events().publish(
            (symbol_short!("deposit"),),
            DepositEvent {
                position_id: id,
                amount,
                unlock_time: new.end,
                timestamp: now,
            },
        );

        Ok(())
    }

    /// Push an unexpired position's expiry further out. The new expiry is
    /// `now + duration` rounded down to a week and must strictly extend the
    /// current one while staying within the maximum lock.
    pub fn increase_unlock_time(
        env: Env,
        from: Address,
        id: u64,
        duration: u64,
    ) -> Result<(), EscrowError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_owner(&env, id, &from)?;

        let old = Self::locked_balance(&env, id)?;
        let now = env.ledger().timestamp();
        if old.end <= now {
            return Err(EscrowError::LockExpired);
        }
        if duration > MAX_LOCK_DURATION {
            return Err(EscrowError::InvalidDuration);
        }
        let unlock_time = ((now + duration) / WEEK) * WEEK;
        if unlock_time <= old.end {
            return Err(EscrowError::InvalidDuration);
        }

        let new = LockedBalance {
            amount: old.amount,
            end: unlock_time,
        };
        Self::update_lock(&env, id, &old, &new)?;

        env.events().publish(
            (symbol_short!("deposit"),),
            DepositEvent {
                position_id: id,
                amount: 0,
                unlock_time,
                timestamp: now,
            },
        );

        Ok(())
    }

    /// Absorb `source_id` into `target_id`: principal adds up, the expiry
    /// becomes the later of the two, the source is burned. The source must
    /// not carry an active vote.
    pub fn merge(
        env: Env,
        from: Address,
        source_id: u64,
        target_id: u64,
    ) -> Result<(), EscrowError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if source_id == target_id {
            return Err(EscrowError::SamePosition);
        }
        Self::require_owner(&env, source_id, &from)?;
        Self::require_owner(&env, target_id, &from)?;
        Self::require_not_voted(&env, source_id)?;

        let source = Self::locked_balance(&env, source_id)?;
        let target = Self::locked_balance(&env, target_id)?;
        let now = env.ledger().timestamp();
        if source.end <= now || target.end <= now {
            return Err(EscrowError::LockExpired);
        }

        let end = source.end.max(target.end);
        let emptied = LockedBalance { amount: 0, end: 0 };
        Self::update_lock(&env, source_id, &source, &emptied)?;
        Self::burn_position(&env, source_id, &from);

        let merged = LockedBalance {
            amount: target
                .amount
                .checked_add(source.amount)
                .ok_or(EscrowError::NumericOverflow)?,
            end,
        };
        Self::update_lock(&env, target_id, &target, &merged)?;

        env.events().publish(
            (symbol_short!("merge"),),
            MergeEvent {
                source_id,
                target_id,
                amount: source.amount,
                unlock_time: end,
                timestamp: now,
            },
        );
        log!(&env, "Merged position {} into {}", source_id, target_id);

        Ok(())
    }

    /// Carve a fraction (basis points, exclusive of 0 and 10000) out of a
    /// position into a fresh one with the same owner and expiry.
    pub fn split(
        env: Env,
        from: Address,
        id: u64,
        fraction_bps: u32,
    ) -> Result<u64, EscrowError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_owner(&env, id, &from)?;
        Self::require_not_voted(&env, id)?;

        let old = Self::locked_balance(&env, id)?;
        let now = env.ledger().timestamp();
        if old.end <= now {
            return Err(EscrowError::LockExpired);
        }
        if fraction_bps == 0 || fraction_bps >= laguna_shared::MAX_BASIS_POINTS {
            return Err(EscrowError::InvalidFraction);
        }
        let split_amount = math::apply_bps(old.amount, fraction_bps)
            .map_err(|_| EscrowError::NumericOverflow)?;
        if split_amount == 0 || split_amount == old.amount {
            return Err(EscrowError::InvalidFraction);
        }

        let reduced = LockedBalance {
            amount: old.amount - split_amount,
            end: old.end,
        };
        Self::update_lock(&env, id, &old, &reduced)?;

        let new_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextPositionId)
            .unwrap_or(1);
        env.storage()
            .instance()
            .set(&DataKey::NextPositionId, &(new_id + 1));
        env.storage()
            .persistent()
            .set(&DataKey::Owner(new_id), &from);
        Self::add_owner_position(&env, &from, new_id);

        let fresh = LockedBalance {
            amount: split_amount,
            end: old.end,
        };
        Self::update_lock(&env, new_id, &LockedBalance { amount: 0, end: 0 }, &fresh)?;

        env.events().publish(
            (symbol_short!("split"),),
            SplitEvent {
                source_id: id,
                new_id,
                amount: split_amount,
                timestamp: now,
            },
        );

        Ok(new_id)
    }

    /// Return the principal of an expired, vote-free position and burn it.
    /// Checkpoint history is retained so historical queries keep answering.
    pub fn withdraw(env: Env, from: Address, id: u64) -> Result<i128, EscrowError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_owner(&env, id, &from)?;
        Self::require_not_voted(&env, id)?;

        let old = Self::locked_balance(&env, id)?;
        let now = env.ledger().timestamp();
        if now < old.end {
            return Err(EscrowError::LockNotExpired);
        }

        Self::update_lock(&env, id, &old, &LockedBalance { amount: 0, end: 0 })?;
        Self::burn_position(&env, id, &from);

        token::Client::new(&env, &config.token).transfer(
            &env.current_contract_address(),
            &from,
            &old.amount,
        );

        env.events().publish(
            (symbol_short!("withdraw"),),
            WithdrawEvent {
                owner: from.clone(),
                position_id: id,
                amount: old.amount,
                timestamp: now,
            },
        );
        log!(&env, "Position {} withdrew {}", id, old.amount);

        Ok(old.amount)
    }

    /// Hand a vote-free position to a new owner
    pub fn transfer_position(
        env: Env,
        from: Address,
        to: Address,
        id: u64,
    ) -> Result<(), EscrowError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_owner(&env, id, &from)?;
        Self::require_not_voted(&env, id)?;

        env.storage().persistent().set(&DataKey::Owner(id), &to);
        Self::remove_owner_position(&env, &from, id);
        Self::add_owner_position(&env, &to, id);

        env.events().publish(
            (symbol_short!("transfer"),),
            TransferPositionEvent {
                from,
                to,
                position_id: id,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Flag a position as carrying (or no longer carrying) an active vote.
    /// Only the bound voter may call this.
    pub fn set_voted(env: Env, id: u64, voted: bool) -> Result<(), EscrowError> {
        let voter: Address = env
            .storage()
            .instance()
            .get(&DataKey::Voter)
            .ok_or(EscrowError::VoterNotSet)?;
        voter.require_auth();

        if !env.storage().persistent().has(&DataKey::Owner(id)) {
            return Err(EscrowError::PositionNotFound);
        }
        env.storage().persistent().set(&DataKey::Voted(id), &voted);

        env.events().publish(
            (symbol_short!("voted"),),
            VotedStateEvent {
                position_id: id,
                voted,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Advance the global checkpoint history to the present
    pub fn checkpoint(env: Env) {
        extend_instance_ttl(&env);
        Self::checkpoint_global(&env, None);
    }

    // -- views -------------------------------------------------------------

    pub fn owner_of(env: Env, id: u64) -> Result<Address, EscrowError> {
        env.storage()
            .persistent()
            .get(&DataKey::Owner(id))
            .ok_or(EscrowError::PositionNotFound)
    }

    pub fn locked(env: Env, id: u64) -> Result<LockedBalance, EscrowError> {
        Self::locked_balance(&env, id)
    }

    pub fn voted(env: Env, id: u64) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::Voted(id))
            .unwrap_or(false)
    }

    pub fn positions_of(env: Env, owner: Address) -> Vec<u64> {
        env.storage()
            .persistent()
            .get(&DataKey::OwnerPositions(owner))
            .unwrap_or(Vec::new(&env))
    }

    /// Total locked principal
    pub fn total_locked(env: Env) -> i128 {
        env.storage().instance().get(&DataKey::Supply).unwrap_or(0)
    }

    pub fn current_epoch(env: Env) -> u32 {
        env.storage().instance().get(&DataKey::Epoch).unwrap_or(0)
    }

    /// Present-time decayed power of a position
    pub fn voting_power(env: Env, id: u64) -> Result<i128, EscrowError> {
        let now = env.ledger().timestamp();
        Self::voting_power_at(env, id, now)
    }

    /// Power of a position at time `t`, answered from checkpoint history.
    /// Fails only for identifiers that never existed.
    pub fn voting_power_at(env: Env, id: u64, t: u64) -> Result<i128, EscrowError> {
        let user_epoch: u32 = env
            .storage()
            .persistent()
            .get(&DataKey::UserEpoch(id))
            .unwrap_or(0);
        if user_epoch == 0 {
            return Err(EscrowError::PositionNotFound);
        }
        let target = Self::find_user_epoch(&env, id, t, user_epoch);
        if target == 0 {
            return Ok(0);
        }
        let point = Self::user_point(&env, id, target);
        let bias = point.bias - point.slope * ((t - point.ts) as i128);
        Ok(bias.max(0))
    }

    /// Present-time total decayed power
    pub fn total_power(env: Env) -> i128 {
        let now = env.ledger().timestamp();
        Self::total_power_at(env, now)
    }

    /// Total decayed power at time `t`: latest checkpoint at or before `t`,
    /// then a week walk applying scheduled slope changes.
    pub fn total_power_at(env: Env, t: u64) -> i128 {
        let epoch: u32 = env.storage().instance().get(&DataKey::Epoch).unwrap_or(0);
        if epoch == 0 {
            return 0;
        }
        let target = Self::find_global_epoch(&env, t, epoch);
        let point = Self::global_point(&env, target);
        if point.ts > t {
            return 0;
        }
        Self::supply_at(&env, point, t)
    }

    pub fn get_voter(env: Env) -> Option<Address> {
        env.storage().instance().get(&DataKey::Voter)
    }

    pub fn get_config(env: &Env) -> Result<EscrowConfig, EscrowError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(EscrowError::NotInitialized)
    }

    // -- internals ---------------------------------------------------------

    fn require_owner(env: &Env, id: u64, who: &Address) -> Result<(), EscrowError> {
        let owner: Address = env
            .storage()
            .persistent()
            .get(&DataKey::Owner(id))
            .ok_or(EscrowError::PositionNotFound)?;
        if owner != *who {
            return Err(EscrowError::Unauthorized);
        }
        Ok(())
    }

    fn require_not_voted(env: &Env, id: u64) -> Result<(), EscrowError> {
        let voted: bool = env
            .storage()
            .persistent()
            .get(&DataKey::Voted(id))
            .unwrap_or(false);
        if voted {
            return Err(EscrowError::PositionVoted);
        }
        Ok(())
    }

    fn locked_balance(env: &Env, id: u64) -> Result<LockedBalance, EscrowError> {
        env.storage()
            .persistent()
            .get(&DataKey::Locked(id))
            .ok_or(EscrowError::PositionNotFound)
    }

    fn add_owner_position(env: &Env, owner: &Address, id: u64) {
        let key = DataKey::OwnerPositions(owner.clone());
        let mut positions: Vec<u64> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(Vec::new(env));
        positions.push_back(id);
        env.storage().persistent().set(&key, &positions);
    }

    fn remove_owner_position(env: &Env, owner: &Address, id: u64) {
        let key = DataKey::OwnerPositions(owner.clone());
        let mut positions: Vec<u64> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(Vec::new(env));
        if let Some(index) = positions.first_index_of(id) {
            positions.remove(index);
            env.storage().persistent().set(&key, &positions);
        }
    }

    fn burn_position(env: &Env, id: u64, owner: &Address) {
        env.storage().persistent().remove(&DataKey::Locked(id));
        env.storage().persistent().remove(&DataKey::Owner(id));
        env.storage().persistent().remove(&DataKey::Voted(id));
        Self::remove_owner_position(env, owner, id);
    }

    /// Write the new lock state, adjust total principal and checkpoint both
    /// the position and the global aggregate. Single mutation point for the
    /// supply/power invariants.
    fn update_lock(
        env: &Env,
        id: u64,
        old: &LockedBalance,
        new: &LockedBalance,
    ) -> Result<(), EscrowError> {
        if new.amount > 0 {
            env.storage().persistent().set(&DataKey::Locked(id), new);
            extend_persistent_ttl(env, &DataKey::Locked(id));
        }
        let supply: i128 = env.storage().instance().get(&DataKey::Supply).unwrap_or(0);
        let new_supply = supply
            .checked_add(new.amount - old.amount)
            .ok_or(EscrowError::NumericOverflow)?;
        env.storage().instance().set(&DataKey::Supply, &new_supply);

        Self::checkpoint_global(env, Some((id, old.clone(), new.clone())));
        Ok(())
    }

    fn slope_for(amount: i128) -> i128 {
        amount / (MAX_LOCK_DURATION as i128)
    }

    fn slope_change(env: &Env, ts: u64) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::SlopeChange(ts))
            .unwrap_or(0)
    }

    fn global_point(env: &Env, epoch: u32) -> Point {
        env.storage()
            .persistent()
            .get(&DataKey::PointHistory(epoch))
            .unwrap_or(Point {
                bias: 0,
                slope: 0,
                ts: 0,
            })
    }

    fn user_point(env: &Env, id: u64, epoch: u32) -> Point {
        env.storage()
            .persistent()
            .get(&DataKey::UserPointHistory(id, epoch))
            .unwrap_or(Point {
                bias: 0,
                slope: 0,
                ts: 0,
            })
    }

    /// Advance the global power history week by week (at most 255 weeks per
    /// call), applying scheduled slope drops, then fold in a position delta
    /// if one is supplied. Per-position history and the slope-change
    /// schedule are maintained here as well.
    fn checkpoint_global(env: &Env, position: Option<(u64, LockedBalance, LockedBalance)>) {
        let now = env.ledger().timestamp();
        let mut u_old = Point {
            bias: 0,
            slope: 0,
            ts: now,
        };
        let mut u_new = Point {
            bias: 0,
            slope: 0,
            ts: now,
        };
        let mut old_dslope: i128 = 0;
        let mut new_dslope: i128 = 0;

        if let Some((_, ref old, ref new)) = position {
            if old.end > now && old.amount > 0 {
                u_old.slope = Self::slope_for(old.amount);
                u_old.bias = u_old.slope * ((old.end - now) as i128);
            }
            if new.end > now && new.amount > 0 {
                u_new.slope = Self::slope_for(new.amount);
                u_new.bias = u_new.slope * ((new.end - now) as i128);
            }
            old_dslope = Self::slope_change(env, old.end);
            if new.end != 0 {
                new_dslope = if new.end == old.end {
                    old_dslope
                } else {
                    Self::slope_change(env, new.end)
                };
            }
        }

        let mut epoch: u32 = env.storage().instance().get(&DataKey::Epoch).unwrap_or(0);
        let mut last_point = if epoch > 0 {
            Self::global_point(env, epoch)
        } else {
            Point {
                bias: 0,
                slope: 0,
                ts: now,
            }
        };
        let mut last_checkpoint = last_point.ts;

        let mut t_i = (last_checkpoint / WEEK) * WEEK;
        for _ in 0..255 {
            t_i += WEEK;
            let mut d_slope: i128 = 0;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = Self::slope_change(env, t_i);
            }
            last_point.bias -= last_point.slope * ((t_i - last_checkpoint) as i128);
            last_point.slope += d_slope;
            if last_point.bias < 0 {
                last_point.bias = 0;
            }
            if last_point.slope < 0 {
                last_point.slope = 0;
            }
            last_checkpoint = t_i;
            last_point.ts = t_i;
            epoch += 1;
            if t_i == now {
                break;
            }
            env.storage()
                .persistent()
                .set(&DataKey::PointHistory(epoch), &last_point);
        }

        if position.is_some() {
            last_point.slope += u_new.slope - u_old.slope;
            last_point.bias += u_new.bias - u_old.bias;
            if last_point.slope < 0 {
                last_point.slope = 0;
            }
            if last_point.bias < 0 {
                last_point.bias = 0;
            }
        }

        env.storage().instance().set(&DataKey::Epoch, &epoch);
        env.storage()
            .persistent()
            .set(&DataKey::PointHistory(epoch), &last_point);

        if let Some((id, old, new)) = position {
            // schedule the slope drops at the old and new expiries
            if old.end > now {
                old_dslope += u_old.slope;
                if new.end == old.end {
                    old_dslope -= u_new.slope;
                }
                env.storage()
                    .persistent()
                    .set(&DataKey::SlopeChange(old.end), &old_dslope);
            }
            if new.end > now && new.end > old.end {
                new_dslope -= u_new.slope;
                env.storage()
                    .persistent()
                    .set(&DataKey::SlopeChange(new.end), &new_dslope);
            }

            let user_epoch: u32 = env
                .storage()
                .persistent()
                .get(&DataKey::UserEpoch(id))
                .unwrap_or(0)
                + 1;
            env.storage()
                .persistent()
                .set(&DataKey::UserEpoch(id), &user_epoch);
            u_new.ts = now;
            env.storage()
                .persistent()
                .set(&DataKey::UserPointHistory(id, user_epoch), &u_new);
        }
    }

    /// Largest global epoch whose checkpoint is at or before `ts`
    fn find_global_epoch(env: &Env, ts: u64, max_epoch: u32) -> u32 {
        let mut min = 0u32;
        let mut max = max_epoch;
        for _ in 0..128 {
            if min >= max {
                break;
            }
            let mid = (min + max + 1) / 2;
            if Self::global_point(env, mid).ts <= ts {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min
    }

    /// Largest user epoch whose checkpoint is at or before `ts`; 0 when the
    /// position has no checkpoint that early
    fn find_user_epoch(env: &Env, id: u64, ts: u64, max_epoch: u32) -> u32 {
        let mut min = 0u32;
        let mut max = max_epoch;
        for _ in 0..128 {
            if min >= max {
                break;
            }
            let mid = (min + max + 1) / 2;
            if Self::user_point(env, id, mid).ts <= ts {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min
    }

    /// Decay a global checkpoint forward to `t`, applying scheduled slope
    /// drops at each week boundary in between
    fn supply_at(env: &Env, point: Point, t: u64) -> i128 {
        let mut last_point = point;
        let mut t_i = (last_point.ts / WEEK) * WEEK;
        for _ in 0..255 {
            t_i += WEEK;
            let mut d_slope: i128 = 0;
            if t_i > t {
                t_i = t;
            } else {
                d_slope = Self::slope_change(env, t_i);
            }
            last_point.bias -= last_point.slope * ((t_i - last_point.ts) as i128);
            if t_i == t {
                break;
            }
            last_point.slope += d_slope;
            last_point.ts = t_i;
        }
        last_point.bias.max(0)
    }
}
