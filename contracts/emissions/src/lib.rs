#![no_std]
//! Emission schedule: a pre-funded reserve that serves one decaying weekly
//! emission per epoch to the voter. The first served epoch pays the
//! configured amount; every epoch crossed after that decays it by a fixed
//! basis-point fraction. There is no minting here, the reserve is topped up
//! by the protocol treasury.

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, symbol_short, token, Address, Env,
};

use laguna_shared::{epoch_start, extend_instance_ttl, math, WEEK};

// Data Types
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmissionsConfig {
    pub admin: Address,
    pub token: Address,
    pub voter: Address,
    pub decay_bps: u32,
}

// Storage Keys
#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Weekly,
    ActivePeriod,
}

// Error Types
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum EmissionsError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    ZeroAmount = 4,
    InvalidDecay = 5,
    NumericOverflow = 6,
}

// Events
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmissionEvent {
    pub period: u64,
    pub amount: i128,
    pub timestamp: u64,
}

/// Decay walks are capped so a long-dormant schedule stays bounded per
/// call; past this many epochs the remaining decay is negligible anyway.
const MAX_DECAY_STEPS: u64 = 255;

#[contract]
pub struct EmissionsContract;

#[contractimpl]
impl EmissionsContract {
    pub fn initialize(
        env: Env,
        admin: Address,
        token: Address,
        voter: Address,
        weekly: i128,
        decay_bps: u32,
    ) -> Result<(), EmissionsError> {
        if env.storage().instance().has(&DataKey::Config) {
            return Err(EmissionsError::AlreadyInitialized);
        }
        admin.require_auth();

        if weekly <= 0 {
            return Err(EmissionsError::ZeroAmount);
        }
        if decay_bps > laguna_shared::MAX_BASIS_POINTS {
            return Err(EmissionsError::InvalidDecay);
        }
        let config = EmissionsConfig {
            admin,
            token,
            voter,
            decay_bps,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::Weekly, &weekly);
        env.storage().instance().set(&DataKey::ActivePeriod, &0u64);

        log!(&env, "Emission schedule initialized, weekly {}", weekly);

        Ok(())
    }

    /// Serve this epoch's emission: transfer it to the voter and report the
    /// amount. Voter only. Returns 0 when the epoch has already been
    /// served, which keeps the voter's distribution idempotent.
    pub fn weekly_emission(env: Env) -> Result<i128, EmissionsError> {
        let config = Self::get_config(&env)?;
        config.voter.require_auth();
        extend_instance_ttl(&env);

        let period = epoch_start(env.ledger().timestamp());
        let active = Self::active_period(env.clone());
        if active != 0 && period <= active {
            return Ok(0);
        }

        let weekly = Self::decayed_weekly(&env, &config, active, period)?;
        env.storage().instance().set(&DataKey::ActivePeriod, &period);
        env.storage().instance().set(&DataKey::Weekly, &weekly);

        let token = token::Client::new(&env, &config.token);
        let reserve = token.balance(&env.current_contract_address());
        let amount = weekly.min(reserve);
        if amount > 0 {
            token.transfer(&env.current_contract_address(), &config.voter, &amount);
        }

        env.events().publish(
            (symbol_short!("emission"),),
            EmissionEvent {
                period,
                amount,
                timestamp: env.ledger().timestamp(),
            },
        );
        log!(&env, "Emitted {} for period {}", amount, period);

        Ok(amount)
    }

    /// Re-anchor the weekly amount
    pub fn set_weekly(env: Env, admin: Address, amount: i128) -> Result<(), EmissionsError> {
        admin.require_auth();
        let config = Self::get_config(&env)?;
        if config.admin != admin {
            return Err(EmissionsError::Unauthorized);
        }
        if amount <= 0 {
            return Err(EmissionsError::ZeroAmount);
        }
        env.storage().instance().set(&DataKey::Weekly, &amount);
        Ok(())
    }

    // -- views -------------------------------------------------------------

    /// What the next `weekly_emission` call would pay, before the reserve
    /// cap
    pub fn preview_emission(env: Env) -> Result<i128, EmissionsError> {
        let config = Self::get_config(&env)?;
        let period = epoch_start(env.ledger().timestamp());
        let active = Self::active_period(env.clone());
        if active != 0 && period <= active {
            return Ok(0);
        }
        Self::decayed_weekly(&env, &config, active, period)
    }

    pub fn active_period(env: Env) -> u64 {
        env.storage()
            .instance()
            .get(&DataKey::ActivePeriod)
            .unwrap_or(0)
    }

    pub fn weekly(env: Env) -> i128 {
        env.storage().instance().get(&DataKey::Weekly).unwrap_or(0)
    }

    pub fn get_config(env: &Env) -> Result<EmissionsConfig, EmissionsError> {
        env.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(EmissionsError::NotInitialized)
    }

    // -- internals ---------------------------------------------------------

    /// The weekly amount after decaying once per epoch crossed since the
    /// last served period. The very first served epoch pays undecayed.
    fn decayed_weekly(
        env: &Env,
        config: &EmissionsConfig,
        active: u64,
        period: u64,
    ) -> Result<i128, EmissionsError> {
        let mut weekly: i128 = env.storage().instance().get(&DataKey::Weekly).unwrap_or(0);
        if active == 0 {
            return Ok(weekly);
        }
        let crossed = ((period - active) / WEEK).min(MAX_DECAY_STEPS);
        for _ in 0..crossed {
            let cut = math::apply_bps(weekly, config.decay_bps)
                .map_err(|_| EmissionsError::NumericOverflow)?;
            weekly -= cut;
        }
        Ok(weekly)
    }
}

mod test;
