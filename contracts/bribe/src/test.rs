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

struct BribeTest {
    env: Env,
    voter: Address,
    base_token: Address,
    incentive_token: Address,
    escrow: VotingEscrowContractClient<'static>,
    client: BribeContractClient<'static>,
}

fn setup() -> BribeTest {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = START);

    let admin = Address::generate(&env);
    let voter = Address::generate(&env);
    let base_token = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let incentive_token = env.register_stellar_asset_contract_v2(admin.clone()).address();

    let escrow_id = env.register_contract(None, VotingEscrowContract);
    let escrow = VotingEscrowContractClient::new(&env, &escrow_id);
    escrow.initialize(&admin, &base_token);

    let bribe_id = env.register_contract(None, BribeContract);
    let client = BribeContractClient::new(&env, &bribe_id);
    client.initialize(&voter, &escrow_id);

    BribeTest {
        env,
        voter,
        base_token,
        incentive_token,
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

fn lock_for(test: &BribeTest, owner: &Address) -> u64 {
    mint(&test.env, &test.base_token, owner, ONE);
    test.escrow.create_lock(owner, &ONE, &MAX_LOCK_DURATION)
}

#[test]
fn test_initialize_twice_fails() {
    let test = setup();
    let result = test.client.try_initialize(&test.voter, &test.base_token);
    assert_eq!(result, Err(Ok(BribeError::AlreadyInitialized)));
}

#[test]
fn test_weight_bookkeeping() {
    let test = setup();

    test.client.deposit(&7, &1_000);
    test.client.deposit(&9, &500);
    assert_eq!(test.client.balance_of(&7), 1_000);
    assert_eq!(test.client.balance_of(&9), 500);
    assert_eq!(test.client.total_weight(), 1_500);

    test.client.withdraw(&7, &1_000);
    assert_eq!(test.client.balance_of(&7), 0);
    assert_eq!(test.client.total_weight(), 500);

    assert_eq!(
        test.client.try_withdraw(&9, &600),
        Err(Ok(BribeError::InsufficientBalance))
    );
    assert_eq!(
        test.client.try_deposit(&7, &0),
        Err(Ok(BribeError::ZeroAmount))
    );
}

#[test]
fn test_owner_claims_accrued_incentives() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let briber = Address::generate(&test.env);
    let id = lock_for(&test, &alice);
    mint(&test.env, &test.incentive_token, &briber, DURATION);

    test.client.deposit(&id, &1_000);
    test.client
        .notify_reward_amount(&briber, &test.incentive_token, &DURATION);

    set_time(&test.env, START + REWARD_DURATION + 10);
    assert_eq!(test.client.earned(&test.incentive_token, &id), DURATION);

    test.client
        .get_reward(&alice, &id, &vec![&test.env, test.incentive_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.incentive_token).balance(&alice),
        DURATION
    );

    // immediately claiming again pays nothing
    test.client
        .get_reward(&alice, &id, &vec![&test.env, test.incentive_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.incentive_token).balance(&alice),
        DURATION
    );
}

#[test]
fn test_only_current_owner_claims() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    let briber = Address::generate(&test.env);
    let id = lock_for(&test, &alice);
    mint(&test.env, &test.incentive_token, &briber, DURATION);

    test.client.deposit(&id, &1_000);
    test.client
        .notify_reward_amount(&briber, &test.incentive_token, &DURATION);

    set_time(&test.env, START + REWARD_DURATION + 10);
    assert_eq!(
        test.client
            .try_get_reward(&bob, &id, &vec![&test.env, test.incentive_token.clone()]),
        Err(Ok(BribeError::NotPositionOwner))
    );

    // rewards follow the position: after a transfer the new owner claims
    // everything accrued while it held weight
    test.escrow.transfer_position(&alice, &bob, &id);
    test.client
        .get_reward(&bob, &id, &vec![&test.env, test.incentive_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.incentive_token).balance(&bob),
        DURATION
    );
    assert_eq!(
        token::Client::new(&test.env, &test.incentive_token).balance(&alice),
        0
    );
}

#[test]
fn test_weights_split_the_stream_proportionally() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let bob = Address::generate(&test.env);
    let briber = Address::generate(&test.env);
    let a = lock_for(&test, &alice);
    let b = lock_for(&test, &bob);
    mint(&test.env, &test.incentive_token, &briber, 4 * DURATION);

    test.client.deposit(&a, &3_000);
    test.client.deposit(&b, &1_000);
    test.client
        .notify_reward_amount(&briber, &test.incentive_token, &(4 * DURATION));

    set_time(&test.env, START + REWARD_DURATION + 10);
    assert_eq!(test.client.earned(&test.incentive_token, &a), 3 * DURATION);
    assert_eq!(test.client.earned(&test.incentive_token, &b), DURATION);
}

#[test]
fn test_unregistered_token_claim_is_noop() {
    let test = setup();
    let alice = Address::generate(&test.env);
    let id = lock_for(&test, &alice);
    test.client.deposit(&id, &1_000);

    // claiming a token nobody ever notified succeeds and pays nothing
    test.client
        .get_reward(&alice, &id, &vec![&test.env, test.incentive_token.clone()]);
    assert_eq!(
        token::Client::new(&test.env, &test.incentive_token).balance(&alice),
        0
    );
}
