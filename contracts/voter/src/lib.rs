#![no_std]
//! Voter: the emission router. Locked positions commit their decaying
//! voting power across pools; each pool's share of the weekly emission
//! follows its share of the total committed weight, accounted through a
//! PRECISION-scaled emission index so distribution never iterates over
//! positions. The voter also writes per-position weight into each pool's
//! bribe and forwards the pool's trading fees there.

use soroban_sdk::{
    auth::{ContractContext, InvokerContractAuthEntry, SubContractInvocation},
    contract, contracterror, contractimpl, contracttype, log, symbol_short, token, vec, Address,
    Env, IntoVal, Symbol, Vec,
};

use laguna_shared::{
    epoch_start, extend_instance_ttl,
    interfaces::{
        BribeClient, EmissionScheduleClient, GaugeClient, LiquidityPoolClient, VotingEscrowClient,
    },
    math, PRECISION, WEEK,
};

// Data Types
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoterConfig {
    pub admin: Address,
    pub escrow: Address,
    pub emission_token: Address,
    pub schedule: Address,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Pools,
    GaugeForPool(Address),
    PoolForGauge(Address),
    BribeForGauge(Address),
    IsGauge(Address),
    Weight(Address),
    TotalWeight,
    PoolVote(u64),
    Votes(u64, Address),
    UsedWeight(u64),
    LastVoted(u64),
    Index,
    SupplyIndex(Address),
    Claimable(Address),
    PendingEmission,
    FeesAccrued(Address, Address),
    ActivePeriod,
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum VoterError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    NotPositionOwner = 4,
    LengthMismatch = 5,
    InvalidWeight = 6,
    ZeroAllocation = 7,
    DuplicatePool = 8,
    GaugeNotFound = 9,
    GaugeExists = 10,
    GaugeMismatch = 11,
    EpochCooldown = 12,
    ZeroAmount = 13,
    NumericOverflow = 14,
}

// Events
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GaugeCreatedEvent {
    pub pool: Address,
    pub gauge: Address,
    pub bribe: Address,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VoteEvent {
    pub position_id: u64,
    pub used_weight: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbstainEvent {
    pub position_id: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotifyEmissionEvent {
    pub amount: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DistributeEvent {
    pub gauge: Address,
    pub amount: i128,
    pub timestamp: u64,
}

#[contract]
pub struct VoterContract;

#[contractimpl]
impl VoterContract {
    pub fn initialize(
        env: Env,
        admin: Address,
        escrow: Address,
        emission_token: Address,
        schedule: Address,
    ) -> Result<(), VoterError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(VoterError::AlreadyInitialized);
        }
        admin.require_auth();

        let config = VoterConfig {
            admin: admin.clone(),
            escrow,
            emission_token,
            schedule,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::TotalWeight, &0i128);
        env.storage().instance().set(&DataKey::Index, &0i128);

        log!(&env, "Voter initialized by admin: {}", admin);

        Ok(())
    }

    /// Bind a gauge/bribe pair to a pool. The pair is deployed out of band;
    /// binding verifies both point back at this voter and the gauge stakes
    /// the pool's share token. Admin only.
    pub fn create_gauge(
        env: Env,
        admin: Address,
        pool: Address,
        gauge: Address,
        bribe: Address,
    ) -> Result<(), VoterError> {
        admin.require_auth();
        let config = Self::get_config(&env)?;
        if config.admin != admin {
            return Err(VoterError::Unauthorized);
        }
        extend_instance_ttl(&env);

        if env
            .storage()
            .persistent()
            .has(&DataKey::GaugeForPool(pool.clone()))
        {
            return Err(VoterError::GaugeExists);
        }

        let this = env.current_contract_address();
        let gauge_client = GaugeClient::new(&env, &gauge);
        match gauge_client.try_voter() {
            Ok(Ok(voter)) if voter == this => {}
            _ => return Err(VoterError::GaugeMismatch),
        }
        match gauge_client.try_stake_token() {
            Ok(Ok(stake_token)) if stake_token == pool => {}
            _ => return Err(VoterError::GaugeMismatch),
        }
        match BribeClient::new(&env, &bribe).try_voter() {
            Ok(Ok(voter)) if voter == this => {}
            _ => return Err(VoterError::GaugeMismatch),
        }

        env.storage()
            .persistent()
            .set(&DataKey::GaugeForPool(pool.clone()), &gauge);
        env.storage()
            .persistent()
            .set(&DataKey::PoolForGauge(gauge.clone()), &pool);
        env.storage()
            .persistent()
            .set(&DataKey::BribeForGauge(gauge.clone()), &bribe);
        env.storage()
            .persistent()
            .set(&DataKey::IsGauge(gauge.clone()), &true);
        let mut pools = Self::pools(env.clone());
        pools.push_back(pool.clone());
        env.storage().instance().set(&DataKey::Pools, &pools);
        // new gauges start at the current index: no claim on past emissions
        let index: i128 = env.storage().instance().get(&DataKey::Index).unwrap_or(0);
        env.storage()
            .persistent()
            .set(&DataKey::SupplyIndex(gauge.clone()), &index);

        env.events().publish(
            (symbol_short!("gauge"),),
            GaugeCreatedEvent {
                pool,
                gauge,
                bribe,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Commit a position's voting power across `pools` in proportion to
    /// `weights` (relative, normalized internally). The previous allocation
    /// is fully released first. Once per epoch per position.
    pub fn vote(
        env: Env,
        from: Address,
        position_id: u64,
        pools: Vec<Address>,
        weights: Vec<i128>,
    ) -> Result<(), VoterError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_position_owner(&env, &config, position_id, &from)?;
        Self::require_fresh_epoch(&env, position_id)?;

        if pools.is_empty() || pools.len() != weights.len() {
            return Err(VoterError::LengthMismatch);
        }
        for i in 0..pools.len() {
            let pool = pools.get_unchecked(i);
            if !env
                .storage()
                .persistent()
                .has(&DataKey::GaugeForPool(pool.clone()))
            {
                return Err(VoterError::GaugeNotFound);
            }
            for j in (i + 1)..pools.len() {
                if pools.get_unchecked(j) == pool {
                    return Err(VoterError::DuplicatePool);
                }
            }
            if weights.get_unchecked(i) <= 0 {
                return Err(VoterError::InvalidWeight);
            }
        }

        Self::reset_votes(&env, position_id)?;

        let escrow = VotingEscrowClient::new(&env, &config.escrow);
        let power = escrow.voting_power(&position_id);
        let used = Self::cast_votes(&env, position_id, &pools, &weights, power, true)?;
        escrow.set_voted(&position_id, &true);
        env.storage()
            .persistent()
            .set(&DataKey::LastVoted(position_id), &env.ledger().timestamp());

        env.events().publish(
            (symbol_short!("vote"),),
            VoteEvent {
                position_id,
                used_weight: used,
                timestamp: env.ledger().timestamp(),
            },
        );
        log!(&env, "Position {} voted weight {}", position_id, used);

        Ok(())
    }

    /// Release a position's allocation entirely and clear its voted mark.
    /// Subject to the same per-epoch cooldown as `vote`.
    pub fn reset(env: Env, from: Address, position_id: u64) -> Result<(), VoterError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);
        Self::require_position_owner(&env, &config, position_id, &from)?;
        Self::require_fresh_epoch(&env, position_id)?;

        Self::reset_votes(&env, position_id)?;
        VotingEscrowClient::new(&env, &config.escrow).set_voted(&position_id, &false);
        env.storage()
            .persistent()
            .set(&DataKey::LastVoted(position_id), &env.ledger().timestamp());

        env.events().publish(
            (symbol_short!("abstain"),),
            AbstainEvent {
                position_id,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Re-apply a position's recorded pool allocation at its current
    /// (decayed) voting power. Permissionless and free of the cooldown, so
    /// keepers can keep weight totals honest.
    pub fn poke(env: Env, position_id: u64) -> Result<(), VoterError> {
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        let pools: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::PoolVote(position_id))
            .unwrap_or(Vec::new(&env));
        if pools.is_empty() {
            return Ok(());
        }
        let mut weights: Vec<i128> = Vec::new(&env);
        for pool in pools.iter() {
            weights.push_back(Self::votes(env.clone(), position_id, pool));
        }

        Self::reset_votes(&env, position_id)?;

        let escrow = VotingEscrowClient::new(&env, &config.escrow);
        let power = match escrow.try_voting_power(&position_id) {
            Ok(Ok(power)) => power,
            _ => 0,
        };
        let used = Self::cast_votes(&env, position_id, &pools, &weights, power, false)?;
        if used == 0 {
            // fully decayed or burned: nothing left to commit
            escrow.set_voted(&position_id, &false);
        }

        env.events().publish(
            (symbol_short!("vote"),),
            VoteEvent {
                position_id,
                used_weight: used,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Pull emission tokens from `from` and fold them into the emission
    /// index. Open top-up path alongside the weekly schedule.
    pub fn notify_emission(env: Env, from: Address, amount: i128) -> Result<(), VoterError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(VoterError::ZeroAmount);
        }
        token::Client::new(&env, &config.emission_token).transfer(
            &from,
            &env.current_contract_address(),
            &amount,
        );
        Self::apply_emission(&env, amount)?;

        env.events().publish(
            (symbol_short!("notify"),),
            NotifyEmissionEvent {
                amount,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Serve the weekly emission (once per epoch), settle each listed gauge
    /// against the emission index and push anything claimable into its
    /// reward stream; claim the pool's trading fees and forward them to its
    /// bribe. Idempotent within an epoch up to amounts already distributed.
    pub fn distribute(env: Env, gauges: Vec<Address>) -> Result<(), VoterError> {
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        let period = epoch_start(env.ledger().timestamp());
        let active: u64 = env
            .storage()
            .instance()
            .get(&DataKey::ActivePeriod)
            .unwrap_or(0);
        if period > active {
            env.storage().instance().set(&DataKey::ActivePeriod, &period);
            let amount = match EmissionScheduleClient::new(&env, &config.schedule)
                .try_weekly_emission()
            {
                Ok(Ok(amount)) => amount,
                _ => 0,
            };
            if amount > 0 {
                Self::apply_emission(&env, amount)?;
            }
        }

        for gauge in gauges.iter() {
            if !Self::is_gauge(env.clone(), gauge.clone()) {
                return Err(VoterError::GaugeNotFound);
            }
            Self::update_for_gauge(&env, &gauge)?;

            let claimable: i128 = env
                .storage()
                .persistent()
                .get(&DataKey::Claimable(gauge.clone()))
                .unwrap_or(0);
            let gauge_client = GaugeClient::new(&env, &gauge);
            let left = gauge_client.left(&config.emission_token);
            if claimable > left && claimable / (WEEK as i128) > 0 {
                env.storage()
                    .persistent()
                    .set(&DataKey::Claimable(gauge.clone()), &0i128);
                Self::authorize_transfer(&env, &config.emission_token, &gauge, claimable);
                gauge_client.notify_reward_amount(
                    &env.current_contract_address(),
                    &config.emission_token,
                    &claimable,
                );
                env.events().publish(
                    (symbol_short!("distro"),),
                    DistributeEvent {
                        gauge: gauge.clone(),
                        amount: claimable,
                        timestamp: env.ledger().timestamp(),
                    },
                );
            }

            Self::forward_fees(&env, &gauge)?;
        }

        Ok(())
    }

    /// Settle listed gauges against the emission index without paying out
    pub fn update_for(env: Env, gauges: Vec<Address>) -> Result<(), VoterError> {
        Self::get_config(&env)?;
        extend_instance_ttl(&env);
        for gauge in gauges.iter() {
            if !Self::is_gauge(env.clone(), gauge.clone()) {
                return Err(VoterError::GaugeNotFound);
            }
            Self::update_for_gauge(&env, &gauge)?;
        }
        Ok(())
    }

    // -- views -------------------------------------------------------------

    pub fn gauge_for_pool(env: Env, pool: Address) -> Result<Address, VoterError> {
        env.storage()
            .persistent()
            .get(&DataKey::GaugeForPool(pool))
            .ok_or(VoterError::GaugeNotFound)
    }

    pub fn pool_for_gauge(env: Env, gauge: Address) -> Result<Address, VoterError> {
        env.storage()
            .persistent()
            .get(&DataKey::PoolForGauge(gauge))
            .ok_or(VoterError::GaugeNotFound)
    }

    pub fn bribe_for_gauge(env: Env, gauge: Address) -> Result<Address, VoterError> {
        env.storage()
            .persistent()
            .get(&DataKey::BribeForGauge(gauge))
            .ok_or(VoterError::GaugeNotFound)
    }

    pub fn is_gauge(env: Env, gauge: Address) -> bool {
        env.storage()
            .persistent()
            .get(&DataKey::IsGauge(gauge))
            .unwrap_or(false)
    }

    pub fn pools(env: Env) -> Vec<Address> {
        env.storage()
            .instance()
            .get(&DataKey::Pools)
            .unwrap_or(Vec::new(&env))
    }

    pub fn weight_of(env: Env, pool: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Weight(pool))
            .unwrap_or(0)
    }

    pub fn total_weight(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalWeight)
            .unwrap_or(0)
    }

    pub fn pool_vote(env: Env, position_id: u64) -> Vec<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::PoolVote(position_id))
            .unwrap_or(Vec::new(&env))
    }

    pub fn votes(env: Env, position_id: u64, pool: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Votes(position_id, pool))
            .unwrap_or(0)
    }

    pub fn used_weight(env: Env, position_id: u64) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::UsedWeight(position_id))
            .unwrap_or(0)
    }

    pub fn last_voted(env: Env, position_id: u64) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::LastVoted(position_id))
            .unwrap_or(0)
    }

    pub fn claimable(env: Env, gauge: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Claimable(gauge))
            .unwrap_or(0)
    }

    pub fn index(env: Env) -> i128 {
        env.storage().instance().get(&DataKey::Index).unwrap_or(0)
    }

    pub fn pending_emission(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::PendingEmission)
            .unwrap_or(0)
    }

    pub fn active_period(env: Env) -> u64 {
        env.storage()
            .instance()
            .get(&DataKey::ActivePeriod)
            .unwrap_or(0)
    }

    pub fn get_config(env: &Env) -> Result<VoterConfig, VoterError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(VoterError::NotInitialized)
    }

    // -- internals ---------------------------------------------------------

    fn require_position_owner(
        env: &Env,
        config: &VoterConfig,
        position_id: u64,
        who: &Address,
    ) -> Result<(), VoterError> {
        let escrow = VotingEscrowClient::new(env, &config.escrow);
        match escrow.try_owner_of(&position_id) {
            Ok(Ok(owner)) if owner == *who => Ok(()),
            _ => Err(VoterError::NotPositionOwner),
        }
    }

    fn require_fresh_epoch(env: &Env, position_id: u64) -> Result<(), VoterError> {
        let last: u64 = env
            .storage()
            .persistent()
            .get(&DataKey::LastVoted(position_id))
            .unwrap_or(0);
        if last != 0 && last >= epoch_start(env.ledger().timestamp()) {
            return Err(VoterError::EpochCooldown);
        }
        Ok(())
    }

    /// Release every pool allocation a position holds. Each touched gauge
    /// is settled against the emission index before its weight moves.
    fn reset_votes(env: &Env, position_id: u64) -> Result<(), VoterError> {
        let pools: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::PoolVote(position_id))
            .unwrap_or(Vec::new(env));
        for pool in pools.iter() {
            let votes: i128 = env
                .storage()
                .persistent()
                .get(&DataKey::Votes(position_id, pool.clone()))
                .unwrap_or(0);
            if votes > 0 {
                let gauge: Address = env
                    .storage()
                    .persistent()
                    .get(&DataKey::GaugeForPool(pool.clone()))
                    .ok_or(VoterError::GaugeNotFound)?;
                Self::update_for_gauge(env, &gauge)?;

                let weight = Self::weight_of(env.clone(), pool.clone()) - votes;
                env.storage()
                    .persistent()
                    .set(&DataKey::Weight(pool.clone()), &weight);
                let total = Self::total_weight(env.clone()) - votes;
                env.storage().instance().set(&DataKey::TotalWeight, &total);
                env.storage()
                    .persistent()
                    .remove(&DataKey::Votes(position_id, pool.clone()));

                let bribe: Address = env
                    .storage()
                    .persistent()
                    .get(&DataKey::BribeForGauge(gauge))
                    .ok_or(VoterError::GaugeNotFound)?;
                BribeClient::new(env, &bribe).withdraw(&position_id, &votes);
            }
        }
        env.storage()
            .persistent()
            .remove(&DataKey::PoolVote(position_id));
        env.storage()
            .persistent()
            .remove(&DataKey::UsedWeight(position_id));
        Ok(())
    }

    /// Allocate `power` across `pools` proportionally to `weights` and
    /// write the result into pool weights, vote records and bribes. Strict
    /// mode fails on any zero allocation; lax mode (poke) skips them.
    fn cast_votes(
        env: &Env,
        position_id: u64,
        pools: &Vec<Address>,
        weights: &Vec<i128>,
        power: i128,
        strict: bool,
    ) -> Result<i128, VoterError> {
        let mut weight_sum: i128 = 0;
        for weight in weights.iter() {
            weight_sum = weight_sum
                .checked_add(weight)
                .ok_or(VoterError::NumericOverflow)?;
        }
        if power <= 0 || weight_sum <= 0 {
            if strict {
                return Err(VoterError::ZeroAllocation);
            }
            return Ok(0);
        }

        let mut used: i128 = 0;
        let mut voted_pools: Vec<Address> = Vec::new(env);
        for i in 0..pools.len() {
            let pool = pools.get_unchecked(i);
            let weight = weights.get_unchecked(i);
            let allocation = math::mul_div(env, power, weight, weight_sum)
                .map_err(|_| VoterError::NumericOverflow)?;
            if allocation == 0 {
                if strict {
                    return Err(VoterError::ZeroAllocation);
                }
                continue;
            }
            let gauge: Address = env
                .storage()
                .persistent()
                .get(&DataKey::GaugeForPool(pool.clone()))
                .ok_or(VoterError::GaugeNotFound)?;
            Self::update_for_gauge(env, &gauge)?;

            let pool_weight = Self::weight_of(env.clone(), pool.clone())
                .checked_add(allocation)
                .ok_or(VoterError::NumericOverflow)?;
            env.storage()
                .persistent()
                .set(&DataKey::Weight(pool.clone()), &pool_weight);
            let total = Self::total_weight(env.clone())
                .checked_add(allocation)
                .ok_or(VoterError::NumericOverflow)?;
            env.storage().instance().set(&DataKey::TotalWeight, &total);
            env.storage()
                .persistent()
                .set(&DataKey::Votes(position_id, pool.clone()), &allocation);

            let bribe: Address = env
                .storage()
                .persistent()
                .get(&DataKey::BribeForGauge(gauge))
                .ok_or(VoterError::GaugeNotFound)?;
            BribeClient::new(env, &bribe).deposit(&position_id, &allocation);

            used += allocation;
            voted_pools.push_back(pool);
        }
        env.storage()
            .persistent()
            .set(&DataKey::PoolVote(position_id), &voted_pools);
        env.storage()
            .persistent()
            .set(&DataKey::UsedWeight(position_id), &used);
        Ok(used)
    }

    /// Fold emission into the index; while no weight exists the amount
    /// parks in a pending bucket instead of being stranded.
    fn apply_emission(env: &Env, amount: i128) -> Result<(), VoterError> {
        let pending: i128 = env
            .storage()
            .instance()
            .get(&DataKey::PendingEmission)
            .unwrap_or(0);
        let total_amount = pending
            .checked_add(amount)
            .ok_or(VoterError::NumericOverflow)?;
        let total_weight = Self::total_weight(env.clone());
        if total_weight > 0 {
            let ratio = math::mul_div(env, total_amount, PRECISION, total_weight)
                .map_err(|_| VoterError::NumericOverflow)?;
            if ratio > 0 {
                let index: i128 = env.storage().instance().get(&DataKey::Index).unwrap_or(0);
                let index = index.checked_add(ratio).ok_or(VoterError::NumericOverflow)?;
                env.storage().instance().set(&DataKey::Index, &index);
                env.storage()
                    .instance()
                    .set(&DataKey::PendingEmission, &0i128);
                return Ok(());
            }
        }
        env.storage()
            .instance()
            .set(&DataKey::PendingEmission, &total_amount);
        Ok(())
    }

    /// Accrue a gauge's share of the index growth since its last
    /// settlement into its claimable balance
    fn update_for_gauge(env: &Env, gauge: &Address) -> Result<(), VoterError> {
        let pool: Address = env
            .storage()
            .persistent()
            .get(&DataKey::PoolForGauge(gauge.clone()))
            .ok_or(VoterError::GaugeNotFound)?;
        let supply = Self::weight_of(env.clone(), pool);
        let index: i128 = env.storage().instance().get(&DataKey::Index).unwrap_or(0);
        let supply_index: i128 = env
            .storage()
            .persistent()
            .get(&DataKey::SupplyIndex(gauge.clone()))
            .unwrap_or(0);
        env.storage()
            .persistent()
            .set(&DataKey::SupplyIndex(gauge.clone()), &index);

        if supply > 0 {
            let delta = index - supply_index;
            if delta > 0 {
                let share = math::mul_div(env, supply, delta, PRECISION)
                    .map_err(|_| VoterError::NumericOverflow)?;
                let claimable: i128 = env
                    .storage()
                    .persistent()
                    .get(&DataKey::Claimable(gauge.clone()))
                    .unwrap_or(0);
                let claimable = claimable
                    .checked_add(share)
                    .ok_or(VoterError::NumericOverflow)?;
                env.storage()
                    .persistent()
                    .set(&DataKey::Claimable(gauge.clone()), &claimable);
            }
        }
        Ok(())
    }

    /// Claim the pool's trading fees and forward each fee token to the
    /// bribe once the accumulated amount sustains a nonzero stream rate.
    /// Pools without a fee surface are silently skipped.
    fn forward_fees(env: &Env, gauge: &Address) -> Result<(), VoterError> {
        let pool: Address = env
            .storage()
            .persistent()
            .get(&DataKey::PoolForGauge(gauge.clone()))
            .ok_or(VoterError::GaugeNotFound)?;
        let bribe: Address = env
            .storage()
            .persistent()
            .get(&DataKey::BribeForGauge(gauge.clone()))
            .ok_or(VoterError::GaugeNotFound)?;

        let pool_client = LiquidityPoolClient::new(env, &pool);
        let (fee0, fee1) = match pool_client.try_claim_fees() {
            Ok(Ok(fees)) => fees,
            _ => return Ok(()),
        };
        let (token0, token1) = match pool_client.try_tokens() {
            Ok(Ok(tokens)) => tokens,
            _ => return Ok(()),
        };
        Self::route_fee(env, &pool, &bribe, &token0, fee0)?;
        Self::route_fee(env, &pool, &bribe, &token1, fee1)?;
        Ok(())
    }

    fn route_fee(
        env: &Env,
        pool: &Address,
        bribe: &Address,
        token: &Address,
        claimed: i128,
    ) -> Result<(), VoterError> {
        let key = DataKey::FeesAccrued(pool.clone(), token.clone());
        let accrued: i128 = env.storage().persistent().get(&key).unwrap_or(0);
        let accrued = accrued
            .checked_add(claimed.max(0))
            .ok_or(VoterError::NumericOverflow)?;
        if accrued == 0 {
            return Ok(());
        }

        let bribe_client = BribeClient::new(env, bribe);
        let left = bribe_client.left(token);
        if accrued > left && accrued / (WEEK as i128) > 0 {
            env.storage().persistent().set(&key, &0i128);
            Self::authorize_transfer(env, token, bribe, accrued);
            bribe_client.notify_reward_amount(&env.current_contract_address(), token, &accrued);
        } else {
            env.storage().persistent().set(&key, &accrued);
        }
        Ok(())
    }

    /// Pre-authorize the token pull a gauge or bribe performs inside its
    /// `notify_reward_amount` when the funds come from this contract
    fn authorize_transfer(env: &Env, token: &Address, to: &Address, amount: i128) {
        env.authorize_as_current_contract(vec![
            env,
            InvokerContractAuthEntry::Contract(SubContractInvocation {
                context: ContractContext {
                    contract: token.clone(),
                    fn_name: Symbol::new(env, "transfer"),
                    args: (env.current_contract_address(), to.clone(), amount).into_val(env),
                },
                sub_invocations: vec![env],
            }),
        ]);
    }
}
