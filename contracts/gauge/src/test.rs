#![cfg(test)]
use super::*;
use laguna_escrow::{VotingEscrowContract, VotingEscrowContractClient};
use laguna_shared::{MAX_LOCK_DURATION, REWARD_DURATION, WEEK};
use soroban_sdk::testutils::{Address as _, Ledger};
use soroban_sdk::token::StellarAssetClient;
use soroban_sdk::{vec, Env};

const START: u64 = WEEK * 520;
const ONE: i128 = 1_000_000_000_000_000_000;
const DURATION: i128 = REWARD_DURATION as i128;

struct GaugeTest {
    env: Env,
    voter: Address,
    lp_token: Address,
    reward_token: Address,
    base_token: Address,
    escrow: VotingEscrowContractClient<'static>,
    client: GaugeContractClient<'static>,
}

fn setup() -> GaugeTest {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = START);

    let admin = Address::generate(&env);
    let voter = Address::generate(&env);
    let lp_token = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let reward_token = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let base_token = env.register_stellar_asset_contract_v2(admin.clone()).address();

    let escrow_id = env.register_contract(None, VotingEscrowContract);
    let escrow = VotingEscrowContractClient::new(&env, &escrow_id);
    escrow.initialize(&admin, &base_token);

    let gauge_id = env.register_contract(None, GaugeContract);
    let client = GaugeContractClient::new(&env, &gauge_id);
    client.initialize(&voter, &escrow_id, &lp_token);

    GaugeTest {
        env,
        voter,
        lp_token,
        reward_token,
        base_token,
        escrow,
        client,
    }
}

fn mint(env: &Env, token: &Address, to: &Address, amount: i128) {
    StellarAssetClient::new(env, token).mint(to, &amount);
}

fn set_time(env: &Env, timestamp: u64) {
    env.ledger().with_mut(|li| {
        li.timestamp = timestamp;
    });
}

#[test]
fn test_initialize_twice_fails() {
    let test = setup();
    let result = test
        .client
        .try_initialize(&test.voter, &test.base_token, &test.lp_token);
    assert_eq!(result, Err(Ok(GaugeError::AlreadyInitialized)));
}

#[test]
fn test_deposit_and_withdraw() {
    let test = setup();
    let alice = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 1_000);

    test.client.deposit(&alice, &1_000, &0);
    assert_eq!(test.client.balance_of(&alice), 1_000);
    assert_eq!(test.client.total_staked(), 1_000);
    // no attached position: derived balance is the 40% floor
    assert_eq!(test.client.derived_balance_of(&alice), 400);
    assert_eq!(test.client.derived_supply(), 400);

    test.client.withdraw(&alice, &400);
    assert_eq!(test.client.balance_of(&alice), 600);
    assert_eq!(test.client.derived_balance_of(&alice), 240);

    assert_eq!(
        test.client.try_withdraw(&alice, &700),
        Err(Ok(GaugeError::InsufficientBalance))
    );
    assert_eq!(
        test.client.try_deposit(&alice, &0, &0),
        Err(Ok(GaugeError::ZeroAmount))
    );

    test.client.withdraw(&alice, &600);
    assert_eq!(test.client.balance_of(&alice), 0);
    assert_eq!(test.client.derived_supply(), 0);
    assert_eq!(
        token::Client::new(&test.env, &test.lp_token).balance(&alice),
        1_000
    );
}

#[test]
fn test_deposit_position_checks() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 3_000);
    mint(&test.env, &test.base_token, &alice, 2 * ONE);
    mint(&test.env, &test.base_token, &bob, ONE);

    let bob_lock = test.escrow.create_lock(&bob, &ONE, &MAX_LOCK_DURATION);
    assert_eq!(
        test.client.try_deposit(&alice, &1_000, &bob_lock),
        Err(Ok(GaugeError::NotPositionOwner))
    );
    assert_eq!(
        test.client.try_deposit(&alice, &1_000, &99),
        Err(Ok(GaugeError::NotPositionOwner))
    );

    let first = test.escrow.create_lock(&alice, &ONE, &MAX_LOCK_DURATION);
    let second = test.escrow.create_lock(&alice, &ONE, &MAX_LOCK_DURATION);
    test.client.deposit(&alice, &1_000, &first);
    assert_eq!(test.client.attached_position(&alice), first);
    assert_eq!(
        test.client.try_deposit(&alice, &1_000, &second),
        Err(Ok(GaugeError::PositionMismatch))
    );
}

#[test]
fn test_single_staker_collects_stream() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let funder = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 1_000);
    mint(&test.env, &test.reward_token, &funder, DURATION);

    test.client.deposit(&alice, &1_000, &0);
    test.client
        .notify_reward_amount(&funder, &test.reward_token, &DURATION);
    assert_eq!(test.client.reward_data(&test.reward_token).reward_rate, 1);

    set_time(&test.env, START + REWARD_DURATION + 10);
    assert_eq!(test.client.earned(&test.reward_token, &alice), DURATION);

    test.client
        .get_reward(&alice, &vec![&test.env, test.reward_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.reward_token).balance(&alice),
        DURATION
    );

    // immediately claiming again pays nothing
    test.client
        .get_reward(&alice, &vec![&test.env, test.reward_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.reward_token).balance(&alice),
        DURATION
    );
}

#[test]
fn test_boost_tilts_reward_shares() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    let funder = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 1_000);
    mint(&test.env, &test.lp_token, &bob, 1_000);
    mint(&test.env, &test.base_token, &alice, ONE);
    mint(&test.env, &test.reward_token, &funder, 14 * DURATION);

    let lock = test.escrow.create_lock(&alice, &ONE, &MAX_LOCK_DURATION);
    test.client.deposit(&alice, &1_000, &lock);
    test.client.deposit(&bob, &1_000, &0);

    // alice holds all voting power: boosted up to the raw-deposit cap;
    // bob sits at the 40% floor
    assert_eq!(test.client.derived_balance_of(&alice), 1_000);
    assert_eq!(test.client.derived_balance_of(&bob), 400);
    assert_eq!(test.client.derived_supply(), 1_400);

    test.client
        .notify_reward_amount(&funder, &test.reward_token, &(14 * DURATION));

    set_time(&test.env, START + REWARD_DURATION + 10);
    let alice_earned = test.client.earned(&test.reward_token, &alice);
    let bob_earned = test.client.earned(&test.reward_token, &bob);
    assert_eq!(alice_earned, 10 * DURATION);
    assert_eq!(bob_earned, 4 * DURATION);
    // equal deposits, larger share to the voter, full amount conserved
    assert!(alice_earned > bob_earned);
    assert_eq!(alice_earned + bob_earned, 14 * DURATION);
}

#[test]
fn test_kick_refreshes_lost_boost() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 1_000);
    mint(&test.env, &test.base_token, &alice, ONE);

    let lock = test.escrow.create_lock(&alice, &ONE, &MAX_LOCK_DURATION);
    test.client.deposit(&alice, &1_000, &lock);
    assert_eq!(test.client.derived_balance_of(&alice), 1_000);

    // the position walks away; the stale boost stands until someone kicks
    test.escrow.transfer_position(&alice, &bob, &lock);
    assert_eq!(test.client.derived_balance_of(&alice), 1_000);

    assert_eq!(test.client.kick(&alice), 400);
    assert_eq!(test.client.derived_balance_of(&alice), 400);
    assert_eq!(test.client.derived_supply(), 400);
}

#[test]
fn test_stream_is_conserved_under_stake_churn() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    let funder = Address::generate(&test.env);
    mint(&test.env, &test.lp_token, &alice, 1_000);
    mint(&test.env, &test.lp_token, &bob, 3_000);
    mint(&test.env, &test.reward_token, &funder, 10 * DURATION);

    test.client.deposit(&alice, &1_000, &0);
    test.client
        .notify_reward_amount(&funder, &test.reward_token, &(10 * DURATION));

    // churn creates supply checkpoints inside the window
    for step in 1..=4u64 {
        set_time(&test.env, START + step * (REWARD_DURATION / 8));
        test.client.deposit(&bob, &500, &0);
    }

    set_time(&test.env, START + REWARD_DURATION + 1);
    // bounded catch-up, one interval at a time, then claims
    for _ in 0..8 {
        test.client.batch_update_rewards(&test.reward_token, &1);
    }
    test.client
        .get_reward(&alice, &vec![&test.env, test.reward_token.clone()]);
    test.client
        .get_reward(&bob, &vec![&test.env, test.reward_token.clone()]);

    let reward = token::Client::new(&test.env, &test.reward_token);
    assert_eq!(reward.balance(&alice) + reward.balance(&bob), 10 * DURATION);
    assert!(reward.balance(&alice) > reward.balance(&bob) / 2);
    assert_eq!(test.client.earned(&test.reward_token, &alice), 0);
    assert_eq!(test.client.earned(&test.reward_token, &bob), 0);
}
