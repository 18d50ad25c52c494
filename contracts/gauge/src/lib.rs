#![no_std]
//! Staking gauge: holds liquidity-pool share deposits and streams reward
//! tokens to stakers. An account's share of the stream is its derived
//! balance, which starts at 40% of the raw deposit and is boosted toward
//! the full deposit by the voting power of an attached escrow position.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, symbol_short, token, Address, Env,
    Vec,
};

use laguna_shared::{
    extend_instance_ttl,
    interfaces::VotingEscrowClient,
    math,
    rewards::{self, RewardData, RewardError, StakeKey},
    BOOST_BASE_BPS, BOOST_VOTE_BPS,
};

// Data Types
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GaugeConfig {
    pub voter: Address,
    pub escrow: Address,
    pub stake_token: Address,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Balance(Address),
    TotalSupply,
    Derived(Address),
    DerivedSupply,
    Attached(Address),
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GaugeError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    ZeroAmount = 3,
    InsufficientBalance = 4,
    NotPositionOwner = 5,
    PositionMismatch = 6,
    NumericOverflow = 7,
    TooManyRewardTokens = 8,
    RewardRateZero = 9,
}

fn engine_error(error: RewardError) -> GaugeError {
    match error {
        RewardError::NumericOverflow => GaugeError::NumericOverflow,
        RewardError::TooManyRewardTokens => GaugeError::TooManyRewardTokens,
        RewardError::RewardRateZero => GaugeError::RewardRateZero,
    }
}

// Events
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StakeEvent {
    pub account: Address,
    pub amount: i128,
    pub position_id: u64,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnstakeEvent {
    pub account: Address,
    pub amount: i128,
    pub timestamp: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimEvent {
    pub account: Address,
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

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KickEvent {
    pub account: Address,
    pub derived_balance: i128,
    pub timestamp: u64,
}

#[contract]
pub struct GaugeContract;

#[contractimpl]
impl GaugeContract {
    /// Bind the gauge to its voter, the escrow it reads boosts from and the
    /// LP share token it stakes
    pub fn initialize(
        env: Env,
        voter: Address,
        escrow: Address,
        stake_token: Address,
    ) -> Result<(), GaugeError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(GaugeError::AlreadyInitialized);
        }
        let config = GaugeConfig {
            voter,
            escrow,
            stake_token,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::TotalSupply, &0i128);
        env.storage().instance().set(&DataKey::DerivedSupply, &0i128);

        log!(&env, "Gauge initialized for stake token {}", config.stake_token);

        Ok(())
    }

    /// Stake LP shares. A nonzero `position_id` attaches the caller's
    /// escrow position for boost; it must be owned by the caller and match
    /// any position already attached.
    pub fn deposit(
        env: Env,
        from: Address,
        amount: i128,
        position_id: u64,
    ) -> Result<(), GaugeError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(GaugeError::ZeroAmount);
        }
        if position_id != 0 {
            let escrow = VotingEscrowClient::new(&env, &config.escrow);
            match escrow.try_owner_of(&position_id) {
                Ok(Ok(owner)) if owner == from => {}
                _ => return Err(GaugeError::NotPositionOwner),
            }
            let attached = Self::attached(&env, &from);
            if attached != 0 && attached != position_id {
                return Err(GaugeError::PositionMismatch);
            }
            env.storage()
                .persistent()
                .set(&DataKey::Attached(from.clone()), &position_id);
        }

        token::Client::new(&env, &config.stake_token).transfer(
            &from,
            &env.current_contract_address(),
            &amount,
        );

        let balance = Self::balance(&env, &from)
            .checked_add(amount)
            .ok_or(GaugeError::NumericOverflow)?;
        env.storage()
            .persistent()
            .set(&DataKey::Balance(from.clone()), &balance);
        let total = Self::total_staked(env.clone())
            .checked_add(amount)
            .ok_or(GaugeError::NumericOverflow)?;
        env.storage().instance().set(&DataKey::TotalSupply, &total);

        Self::update_derived(&env, &config, &from)?;

        env.events().publish(
            (symbol_short!("deposit"),),
            StakeEvent {
                account: from,
                amount,
                position_id,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Return staked LP shares to the caller. A balance reaching zero
    /// detaches the boost position.
    pub fn withdraw(env: Env, from: Address, amount: i128) -> Result<(), GaugeError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(GaugeError::ZeroAmount);
        }
        let balance = Self::balance(&env, &from);
        if balance < amount {
            return Err(GaugeError::InsufficientBalance);
        }
        let remaining = balance - amount;
        env.storage()
            .persistent()
            .set(&DataKey::Balance(from.clone()), &remaining);
        if remaining == 0 {
            env.storage()
                .persistent()
                .remove(&DataKey::Attached(from.clone()));
        }
        let total = Self::total_staked(env.clone()) - amount;
        env.storage().instance().set(&DataKey::TotalSupply, &total);

        token::Client::new(&env, &config.stake_token).transfer(
            &env.current_contract_address(),
            &from,
            &amount,
        );

        Self::update_derived(&env, &config, &from)?;

        env.events().publish(
            (symbol_short!("withdraw"),),
            UnstakeEvent {
                account: from,
                amount,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(())
    }

    /// Pay out every listed reward token accrued by the caller. Tokens with
    /// nothing pending are skipped, not failed.
    pub fn get_reward(env: Env, from: Address, tokens: Vec<Address>) -> Result<(), GaugeError> {
        from.require_auth();
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        let holder = StakeKey::Account(from.clone());
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
                        account: from.clone(),
                        token: token_address,
                        amount,
                        timestamp: env.ledger().timestamp(),
                    },
                );
            }
        }
        // restamp the claimer's checkpoints so the next accrual walk starts
        // at the settlement time
        Self::update_derived(&env, &config, &from)?;

        Ok(())
    }

    /// Refresh an account's derived balance against its current voting
    /// power. Public: anyone may kick an account whose boost has decayed or
    /// whose position moved away.
    pub fn kick(env: Env, account: Address) -> Result<i128, GaugeError> {
        let config = Self::get_config(&env)?;
        extend_instance_ttl(&env);

        Self::update_derived(&env, &config, &account)?;
        let derived = Self::derived(&env, &account);

        env.events().publish(
            (symbol_short!("kick"),),
            KickEvent {
                account,
                derived_balance: derived,
                timestamp: env.ledger().timestamp(),
            },
        );

        Ok(derived)
    }

    /// Pull `amount` of `token` from `from` and stream it over the next
    /// window. Open to anyone; the voter routes emissions through here.
    pub fn notify_reward_amount(
        env: Env,
        from: Address,
        token: Address,
        amount: i128,
    ) -> Result<(), GaugeError> {
        from.require_auth();
        Self::get_config(&env)?;
        extend_instance_ttl(&env);

        if amount <= 0 {
            return Err(GaugeError::ZeroAmount);
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
        log!(&env, "Gauge notified {} of token {}", amount, token);

        Ok(())
    }

    /// Bounded catch-up of the reward accumulator; callable by anyone
    pub fn batch_update_rewards(
        env: Env,
        token: Address,
        max_steps: u32,
    ) -> Result<i128, GaugeError> {
        extend_instance_ttl(&env);
        rewards::advance_reward_per_share(&env, &token, max_steps, false).map_err(engine_error)
    }

    // -- views -------------------------------------------------------------

    pub fn balance_of(env: Env, account: Address) -> i128 {
        Self::balance(&env, &account)
    }

    pub fn total_staked(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::TotalSupply)
            .unwrap_or(0)
    }

    pub fn derived_balance_of(env: Env, account: Address) -> i128 {
        Self::derived(&env, &account)
    }

    pub fn derived_supply(env: Env) -> i128 {
        env.storage()
            .instance()
            .get(&DataKey::DerivedSupply)
            .unwrap_or(0)
    }

    pub fn attached_position(env: Env, account: Address) -> u64 {
        Self::attached(&env, &account)
    }

    pub fn earned(env: Env, token: Address, account: Address) -> Result<i128, GaugeError> {
        rewards::earned(&env, &token, &StakeKey::Account(account)).map_err(engine_error)
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

    pub fn voter(env: Env) -> Result<Address, GaugeError> {
        Ok(Self::get_config(&env)?.voter)
    }

    pub fn stake_token(env: Env) -> Result<Address, GaugeError> {
        Ok(Self::get_config(&env)?.stake_token)
    }

    pub fn get_config(env: &Env) -> Result<GaugeConfig, GaugeError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(GaugeError::NotInitialized)
    }

    // -- internals ---------------------------------------------------------

    fn balance(env: &Env, account: &Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Balance(account.clone()))
            .unwrap_or(0)
    }

    fn derived(env: &Env, account: &Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Derived(account.clone()))
            .unwrap_or(0)
    }

    fn attached(env: &Env, account: &Address) -> u64 {
        env.storage()
            .persistent()
            .get(&DataKey::Attached(account.clone()))
            .unwrap_or(0)
    }

    /// Recompute one account's derived balance, fold the delta into the
    /// derived supply and record both with the reward engine. Every
    /// balance- or boost-affecting entry point funnels through here.
    fn update_derived(env: &Env, config: &GaugeConfig, account: &Address) -> Result<(), GaugeError> {
        let balance = Self::balance(env, account);
        let total = Self::total_staked(env.clone());
        let old = Self::derived(env, account);
        let new = Self::compute_derived(env, config, account, balance, total)?;

        env.storage()
            .persistent()
            .set(&DataKey::Derived(account.clone()), &new);
        let supply: i128 = env
            .storage()
            .instance()
            .get(&DataKey::DerivedSupply)
            .unwrap_or(0);
        let supply = supply
            .checked_sub(old)
            .and_then(|s| s.checked_add(new))
            .ok_or(GaugeError::NumericOverflow)?;
        env.storage().instance().set(&DataKey::DerivedSupply, &supply);

        rewards::record_balance(env, &StakeKey::Account(account.clone()), new);
        rewards::record_supply(env, supply);
        Ok(())
    }

    /// `min(bal, bal * 40% + total_supply * power / total_power * 60%)`.
    /// The attached position contributes only while the depositor still
    /// owns it; a burned or transferred position simply yields no boost.
    fn compute_derived(
        env: &Env,
        config: &GaugeConfig,
        account: &Address,
        balance: i128,
        total_supply: i128,
    ) -> Result<i128, GaugeError> {
        if balance == 0 {
            return Ok(0);
        }
        let mut derived = math::apply_bps(balance, BOOST_BASE_BPS).map_err(engine_error)?;

        let attached = Self::attached(env, account);
        if attached != 0 {
            let escrow = VotingEscrowClient::new(env, &config.escrow);
            let owns = matches!(
                escrow.try_owner_of(&attached),
                Ok(Ok(ref owner)) if owner == account
            );
            if owns {
                let power = match escrow.try_voting_power(&attached) {
                    Ok(Ok(power)) => power,
                    _ => 0,
                };
                let total_power = escrow.total_power();
                if power > 0 && total_power > 0 {
                    let share = math::mul_div(env, total_supply, power, total_power)
                        .map_err(engine_error)?;
                    let boost = math::apply_bps(share, BOOST_VOTE_BPS).map_err(engine_error)?;
                    derived = derived
                        .checked_add(boost)
                        .ok_or(GaugeError::NumericOverflow)?;
                }
            }
        }
        Ok(derived.min(balance))
    }
}

mod test;
