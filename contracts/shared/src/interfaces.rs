//! Typed clients for the contract surfaces the Laguna contracts consume
//! from one another. Only success-shaped signatures are declared here;
//! callers that need to treat a failure as a branch (for example a boost
//! lookup of a burned position) go through the generated `try_` variants.

use soroban_sdk::{contractclient, Address, Env};

/// Voting-escrow surface consumed by the voter, gauges and bribes.
#[contractclient(name = "VotingEscrowClient")]
pub trait VotingEscrowInterface {
    /// Current owner of a position. Fails for unknown or burned positions.
    fn owner_of(env: Env, id: u64) -> Address;

    /// Present-time decayed voting power of a position.
    fn voting_power(env: Env, id: u64) -> i128;

    /// Present-time decayed total voting power.
    fn total_power(env: Env) -> i128;

    /// Mark a position as carrying (or no longer carrying) an active vote.
    /// Restricted to the bound voter.
    fn set_voted(env: Env, id: u64, voted: bool);
}

/// Gauge surface consumed by the voter.
#[contractclient(name = "GaugeClient")]
pub trait GaugeInterface {
    fn notify_reward_amount(env: Env, from: Address, token: Address, amount: i128);

    /// Undistributed remainder of the live window for `token`.
    fn left(env: Env, token: Address) -> i128;

    fn voter(env: Env) -> Address;

    fn stake_token(env: Env) -> Address;
}

/// Bribe surface consumed by the voter.
#[contractclient(name = "BribeClient")]
pub trait BribeInterface {
    fn deposit(env: Env, position_id: u64, amount: i128);

    fn withdraw(env: Env, position_id: u64, amount: i128);

    fn notify_reward_amount(env: Env, from: Address, token: Address, amount: i128);

    fn left(env: Env, token: Address) -> i128;

    fn voter(env: Env) -> Address;
}

/// Weekly emission collaborator consumed by the voter.
#[contractclient(name = "EmissionScheduleClient")]
pub trait EmissionScheduleInterface {
    /// Transfer this epoch's emission to the caller and report the amount.
    /// Returns 0 when the epoch has already been served.
    fn weekly_emission(env: Env) -> i128;
}

/// Liquidity-pool surface consumed by the voter when routing trading fees.
#[contractclient(name = "LiquidityPoolClient")]
pub trait LiquidityPoolInterface {
    /// Pay out accrued trading fees to the caller.
    fn claim_fees(env: Env) -> (i128, i128);

    /// The pool's two tokens, in fee order.
    fn tokens(env: Env) -> (Address, Address);
}
