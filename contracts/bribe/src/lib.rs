#![no_std]
//! Bribe: streams incentive tokens to the escrow positions whose voting
//! weight is committed to one pool. Weight is written exclusively by the
//! voter when votes are cast or reset; rewards are claimed by whoever owns
//! the position at claim time. Anyone may supply incentives, and the voter
//! forwards the pool's trading fees through the same entry point.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, symbol_short, token, Address, Env,
    Vec,
};

use laguna_shared::{
    extend_instance_ttl,
    interfaces::VotingEscrowClient,
    rewards::{self, RewardData, RewardError, StakeKey},
};

// Data Types
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BribeConfig {
    pub voter: Address,
    pub escrow: Address,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Balance(u64),
    TotalWeight,
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum BribeError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    ZeroAmount = 3,
    InsufficientBalance = 4,
    NotPositionOwner = 5,
    NumericOverflow = 6,
    TooManyRewardTokens = 7,
    RewardRateZero = 8,
}

fn engine_error(error: RewardError) -> BribeError {
    match error {
        RewardError::NumericOverflow => BribeError::NumericOverflow,
        RewardError::TooManyRewardTokens => BribeError::TooManyRewardTokens,
        RewardError::RewardRateZero => BribeError::RewardRateZero,
    }
}

// Events
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WeightEvent {
    pub position_id: u64,
    pub amount: i128,
    pub total_weight: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimEvent {
    pub position_id: u64,
    pub owner: Address,
    pub token: Address,
    pub amount: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotifyEvent {
    pub token: Address,
    pub amount: i128,
    pub rate: i128,
    pub timestamp: u64,
}

#[contract]
pub struct BribeContract;

#[contractimpl]
impl BribeContract {
    pub fn initialize(env: Env, voter: Address, escrow: Address) -> Result<(), BribeError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(BribeError::AlreadyInitialized);
        }
        let config = BribeConfig { voter, escrow };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::TotalWeight, &0i128);

        log!(&env, "Bribe initialized for voter {}", config.voter);

        Ok(())
    }

    /// Credit voting weight to a position. Voter only.
    pub fn deposit(env: Env, position_id: u64, amount: i128) -> Result<(), BribeError> {
        let config = Self::get_config(&env)?;
        config.voter.require_auth();
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(BribeError::ZeroAmount);
        }
        let balance = Self::balance(&env, position_id)
            .checked_add(amount)
            .ok_or(BribeError::NumericOverflow)?;
        let total = Self::total_weight(env.clone())
            .checked_add(amount)
            .ok_or(BribeError::NumericOverflow)?;
        Self::write_weight(&env, position_id, balance, total);

        env.events().publish(
            (symbol_short!("deposit"),),
            WeightEvent {
                position_id,
                amount,
                total_weight: total,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Release voting weight from a position. Voter only.
    pub fn withdraw(env: Env, position_id: u64, amount: i128) -> Result<(), BribeError> {
        let config = Self::get_config(&env)?;
        config.voter.require_auth();
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(BribeError::ZeroAmount);
        }
        let balance = Self::balance(&env, position_id);
        if balance < amount {
            return Err(BribeError::InsufficientBalance);
        }
        let total = Self::total_weight(env.clone()) - amount;
        Self::write_weight(&env, position_id, balance - amount, total);

        env.events().publish(
            (symbol_short!("withdraw"),),
            WeightEvent {
                position_id,
                amount,
                total_weight: total,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Pay out the listed reward tokens accrued by `position_id` to its
    /// current owner, who must be the caller.
    pub fn get_reward(
        env: Env,
        from: Address,
        position_id: u64,
        tokens: Vec<Address>,
    ) -> Result<(), BribeError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        let escrow = VotingEscrowClient::new(&env, &config.escrow);
        match escrow.try_owner_of(&position_id) {
            Ok(Ok(owner)) if owner == from => {}
            _ => return Err(BribeError::NotPositionOwner),
        }

        let holder = StakeKey::Position(position_id);
        for token_address in tokens.iter() {
            let amount = rewards::settle(&env, &token_address, &holder).map_err(engine_error)?;
            if amount > 0 {
                token::Client::new(&env, &token_address).transfer(
                    &env.current_contract_address(),
                    &from,
                    &amount,
                );
                env.events().publish(
                    (symbol_short!("claim"),),
                    ClaimEvent {
                        position_id,
                        owner: from.clone(),
                        token: token_address,
                        amount,
                        timestamp: env.ledger().timestamp(),
                    },
                );
            }
        }
        // restamp so the next accrual walk starts at the settlement time
        rewards::record_balance(&env, &holder, Self::balance(&env, position_id));

        Ok(())
    }

    /// Pull `amount` of `token` from `from` and stream it over the next
    /// window. Open to anyone: third-party incentives and forwarded trading
    /// fees both arrive here.
    pub fn notify_reward_amount(
        env: Env,
        from: Address,
        token: Address,
        amount: i128,
    ) -> Result<(), BribeError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(BribeError::ZeroAmount);
        }
        token::Client::new(&env, &token).transfer(
            &from,
            &env.current_contract_address(),
            &amount,
        );
        let rate = rewards::notify_reward(&env, &token, amount).map_err(engine_error)?;

        env.events().publish(
            (symbol_short!("notify"),),
            NotifyEvent {
                token: token.clone(),
                amount,
                rate,
                timestamp: env.ledger().timestamp(),
            },
        );
        log!(&env, "Bribe notified {} of token {}", amount, token);

        Ok(())
    }

    /// Bounded catch-up of the reward accumulator; callable by anyone
    pub fn batch_update_rewards(
        env: Env,
        token: Address,
        max_steps: u32,
    ) -> Result<i128, BribeError> {
        extend_instance_ttl(&env);
        rewards::advance_reward_per_share(&env, &token, max_steps, false).map_err(engine_error)
    }

    // -- views -------------------------------------------------------------

    pub fn balance_of(env: Env, position_id: u64) -> i128 {
        Self::balance(&env, position_id)
    }

    pub fn total_weight(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalWeight)
            .unwrap_or(0)
    }

    pub fn earned(env: Env, token: Address, position_id: u64) -> Result<i128, BribeError> {
        rewards::earned(&env, &token, &StakeKey::Position(position_id)).map_err(engine_error)
    }

    pub fn reward_data(env: Env, token: Address) -> RewardData {
        rewards::reward_data(&env, &token)
    }

    pub fn reward_tokens(env: Env) -> Vec<Address> {
        rewards::reward_tokens(&env)
    }

    /// Undistributed remainder of the live window for `token`
    pub fn left(env: Env, token: Address) -> i128 {
        rewards::left(&env, &token)
    }

    pub fn voter(env: Env) -> Result<Address, BribeError> {
        Ok(Self::get_config(&env)?.voter)
    }

    pub fn get_config(env: &Env) -> Result<BribeConfig, BribeError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(BribeError::NotInitialized)
    }

    // -- internals ---------------------------------------------------------

    fn balance(env: &Env, position_id: u64) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Balance(position_id))
            .unwrap_or(0)
    }

    /// Persist a weight change and record both checkpoints with the reward
    /// engine. Single mutation point for the weight invariant.
    fn write_weight(env: &Env, position_id: u64, balance: i128, total: i128) {
        env.storage()
            .persistent()
            .set(&DataKey::Balance(position_id), &balance);
        env.storage().instance().set(&DataKey::TotalWeight, &total);
        rewards::record_balance(env, &StakeKey::Position(position_id), balance);
        rewards::record_supply(env, total);
    }
}

mod test;
