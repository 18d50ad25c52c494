#![cfg(test)]
use super::*;
use laguna_shared::WEEK;
use soroban_sdk::testutils::{Address as _, Ledger};
use soroban_sdk::token::StellarAssetClient;
use soroban_sdk::Env;

const START: u64 = WEEK * 520;
const WEEKLY: i128 = 1_000_000;

struct EmissionsTest {
    env: Env,
    admin: Address,
    token: Address,
    voter: Address,
    contract_id: Address,
    client: EmissionsContractClient<'static>,
}

fn setup(decay_bps: u32) -> EmissionsTest {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = START);

    let admin = Address::generate(&env);
    let voter = Address::generate(&env);
    let token = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let contract_id = env.register_contract(None, EmissionsContract);
    let client = EmissionsContractClient::new(&env, &contract_id);
    client.initialize(&admin, &token, &voter, &WEEKLY, &decay_bps);

    // pre-funded reserve
    StellarAssetClient::new(&env, &token).mint(&contract_id, &(100 * WEEKLY));

    EmissionsTest {
        env,
        admin,
        token,
        voter,
        contract_id,
        client,
    }
}

fn set_time(env: &Env, timestamp: u64) {
    env.ledger().with_mut(|li| {
        li.timestamp = timestamp;
    });
}

#[test]
fn test_initialize_validation() {
    let test = setup(200);
    assert_eq!(
        test.client
            .try_initialize(&test.admin, &test.token, &test.voter, &WEEKLY, &200),
        Err(Ok(EmissionsError::AlreadyInitialized))
    );

    let env = Env::default();
    env.mock_all_auths();
    let admin = Address::generate(&env);
    let token = Address::generate(&env);
    let voter = Address::generate(&env);
    let client =
        EmissionsContractClient::new(&env, &env.register_contract(None, EmissionsContract));
    assert_eq!(
        client.try_initialize(&admin, &token, &voter, &0, &200),
        Err(Ok(EmissionsError::ZeroAmount))
    );
    assert_eq!(
        client.try_initialize(&admin, &token, &voter, &WEEKLY, &10_001),
        Err(Ok(EmissionsError::InvalidDecay))
    );
}

#[test]
fn test_first_epoch_pays_full_weekly() {
    let test = setup(200);
    assert_eq!(test.client.preview_emission(), WEEKLY);
    assert_eq!(test.client.weekly_emission(), WEEKLY);
    assert_eq!(
        token::Client::new(&test.env, &test.token).balance(&test.voter),
        WEEKLY
    );
    assert_eq!(test.client.active_period(), START);
}

#[test]
fn test_second_call_in_same_epoch_pays_zero() {
    let test = setup(200);
    assert_eq!(test.client.weekly_emission(), WEEKLY);

    set_time(&test.env, START + WEEK / 2);
    assert_eq!(test.client.preview_emission(), 0);
    assert_eq!(test.client.weekly_emission(), 0);
    assert_eq!(
        token::Client::new(&test.env, &test.token).balance(&test.voter),
        WEEKLY
    );
}

#[test]
fn test_weekly_decays_per_epoch() {
    let test = setup(200); // 2% per epoch
    assert_eq!(test.client.weekly_emission(), WEEKLY);

    set_time(&test.env, START + WEEK);
    let decayed = WEEKLY - WEEKLY * 200 / 10_000;
    assert_eq!(test.client.weekly_emission(), decayed);

    // a skipped epoch decays twice
    set_time(&test.env, START + 3 * WEEK);
    let twice = {
        let once = decayed - decayed * 200 / 10_000;
        once - once * 200 / 10_000
    };
    assert_eq!(test.client.weekly_emission(), twice);
}

#[test]
fn test_emission_capped_by_reserve() {
    let env = Env::default();
    env.mock_all_auths();
    env.ledger().with_mut(|li| li.timestamp = START);

    let admin = Address::generate(&env);
    let voter = Address::generate(&env);
    let token = env.register_stellar_asset_contract_v2(admin.clone()).address();
    let contract_id = env.register_contract(None, EmissionsContract);
    let client = EmissionsContractClient::new(&env, &contract_id);
    client.initialize(&admin, &token, &voter, &WEEKLY, &0);

    // reserve holds only half a weekly payment
    StellarAssetClient::new(&env, &token).mint(&contract_id, &(WEEKLY / 2));

    assert_eq!(client.weekly_emission(), WEEKLY / 2);
    assert_eq!(token::Client::new(&env, &token).balance(&contract_id), 0);
}

#[test]
fn test_set_weekly_admin_only() {
    let test = setup(200);
    let stranger = Address::generate(&test.env);
    assert_eq!(
        test.client.try_set_weekly(&stranger, &2_000_000),
        Err(Ok(EmissionsError::Unauthorized))
    );
    test.client.set_weekly(&test.admin, &2_000_000);
    assert_eq!(test.client.weekly(), 2_000_000);
}
