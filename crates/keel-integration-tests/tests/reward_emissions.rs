//! Integration test: reward emissions across pools and schedule changes.
//!
//! Exercises the complete reward lifecycle:
//! 1. Register pools with unequal allocation weights
//! 2. Stake from several users and cross emission boundaries
//! 3. Re-weight pools mid-stream
//! 4. Claim to receivers, with onward incentives attached
//! 5. Verify the minted total equals the emitted total exactly
//! 6. Saturate the supply cap

use keel_incentives::hooks::RecordingHook;
use keel_incentives::minter::InMemoryMinter;
use keel_incentives::{ControllerConfig, IncentivesController, IncentivesError};
use keel_types::{address_from_byte, Address, U256};
use proptest::prelude::*;

/// Base timestamp for test scenarios.
const BASE_TIME: u64 = 1_700_000_000;

const OWNER: Address = address_from_byte(0x01);
const CONFIGURATOR: Address = address_from_byte(0x02);
const POOL_A: Address = address_from_byte(0x0a);
const POOL_B: Address = address_from_byte(0x0b);
const ALICE: Address = address_from_byte(0xa1);
const BOB: Address = address_from_byte(0xb0);
const VAULT: Address = address_from_byte(0xee);

fn u(v: u64) -> U256 {
    U256::from(v)
}

/// Helper: a controller with pools A and B registered at `BASE_TIME`.
fn two_pool_controller(
    offsets: &[u128],
    rates: &[u128],
    weights: (u64, u64),
    cap: U256,
) -> IncentivesController<InMemoryMinter> {
    let mut controller = IncentivesController::initialize(
        ControllerConfig {
            owner: OWNER,
            pool_configurator: CONFIGURATOR,
            start_time: BASE_TIME,
            max_mintable: cap,
            emission_offsets: offsets.to_vec(),
            emission_rates: rates.to_vec(),
        },
        InMemoryMinter::new(),
    )
    .expect("Controller initialisation should succeed");
    controller
        .add_pool(&CONFIGURATOR, BASE_TIME, POOL_A, u(weights.0))
        .expect("Pool A registration should succeed");
    controller
        .add_pool(&CONFIGURATOR, BASE_TIME, POOL_B, u(weights.1))
        .expect("Pool B registration should succeed");
    controller
}

#[test]
fn rewards_follow_weights_and_schedule() {
    let mut c = two_pool_controller(&[0, 1_000], &[100, 40], (1, 3), U256::MAX);

    // First call after start activates the 100/s rate
    c.handle_action(&POOL_A, BASE_TIME + 1, ALICE, u(100), u(100))
        .expect("Alice stakes in A");
    c.handle_action(&POOL_B, BASE_TIME + 1, BOB, u(100), u(100))
        .expect("Bob stakes in B");
    assert_eq!(c.rewards_per_second(), 100);

    // 500s at 100/s split 1:3, then re-weight to 2:2
    c.batch_update_allocation_weights(&OWNER, BASE_TIME + 501, &[POOL_A, POOL_B], &[u(2), u(2)])
        .expect("Owner re-weights pools");
    assert_eq!(c.total_allocation_weight(), u(4));

    // Crossing offset 1000: the final 500s still accrue at 100/s
    let alice_first = c.claim(BASE_TIME + 1_001, ALICE, &[POOL_A]).expect("Alice claims");
    assert_eq!(alice_first, u(12_500 + 25_000));
    assert_eq!(c.rewards_per_second(), 40);
    assert!(c.pending_emissions().is_empty());

    // 100s at 40/s split 2:2
    let bob = c.claim(BASE_TIME + 1_101, BOB, &[POOL_B]).expect("Bob claims");
    assert_eq!(bob, u(37_500 + 25_000 + 2_000));
    let alice_second = c.claim(BASE_TIME + 1_101, ALICE, &[POOL_A]).expect("Alice claims again");
    assert_eq!(alice_second, u(2_000));

    // Everything emitted since activation has been minted
    let emitted = u(100 * 1_000 + 40 * 100);
    assert_eq!(c.minted_tokens(), emitted);
    assert_eq!(c.minter().total_supply(), emitted);
}

#[test]
fn receivers_hooks_and_parked_rewards() {
    let mut c = two_pool_controller(&[0], &[10], (1, 1), U256::MAX);
    let hook = RecordingHook::new();
    c.set_onward_incentives(&OWNER, POOL_A, Some(Box::new(hook.clone())))
        .expect("Owner installs hook");
    c.set_claim_receiver(&ALICE, ALICE, VAULT).expect("Alice sets receiver");

    c.handle_action(&POOL_A, BASE_TIME + 1, ALICE, u(50), u(50))
        .expect("Alice stakes");
    // Leaving the pool parks 10s * 5/s of rewards
    c.handle_action(&POOL_A, BASE_TIME + 11, ALICE, U256::ZERO, U256::ZERO)
        .expect("Alice exits");
    assert_eq!(c.user_base_claimable(&ALICE), u(50));
    assert_eq!(hook.actions().len(), 2);

    let minted = c.claim(BASE_TIME + 500, ALICE, &[POOL_A, POOL_B]).expect("Alice claims");
    assert_eq!(minted, u(50));
    assert_eq!(c.minter().balance_of(&VAULT), u(50));
    assert_eq!(c.minter().balance_of(&ALICE), U256::ZERO);
    assert!(c.minter().calls().iter().all(|call| call.apply_penalty));

    // A failing hook rolls the balance change back
    hook.fail(true);
    let err = c
        .handle_action(&POOL_A, BASE_TIME + 600, BOB, u(5), u(5))
        .expect_err("Hook failure should abort");
    assert!(matches!(err, IncentivesError::OnwardIncentives(_)));
    assert_eq!(c.user_info(&POOL_A, &BOB).staked_amount, U256::ZERO);

    // Removing the hook lets the action through
    c.set_onward_incentives(&OWNER, POOL_A, None).expect("Owner removes hook");
    c.handle_action(&POOL_A, BASE_TIME + 600, BOB, u(5), u(5))
        .expect("Bob stakes");
    assert_eq!(c.user_info(&POOL_A, &BOB).staked_amount, u(5));
}

#[test]
fn supply_cap_saturates_across_users() {
    let mut c = two_pool_controller(&[0], &[1_000], (1, 1), u(1_500));
    c.handle_action(&POOL_A, BASE_TIME + 1, ALICE, u(1), u(1)).expect("Alice stakes");
    c.handle_action(&POOL_B, BASE_TIME + 1, BOB, u(1), u(1)).expect("Bob stakes");

    // Each pool has accrued 1000 by now
    assert_eq!(c.claim(BASE_TIME + 3, ALICE, &[POOL_A]).expect("Alice claims"), u(1_000));
    assert_eq!(c.claim(BASE_TIME + 3, BOB, &[POOL_B]).expect("Bob claims"), u(500));
    assert_eq!(c.minted_tokens(), c.max_mintable_tokens());

    // Nothing left; claims still succeed
    assert_eq!(c.claim(BASE_TIME + 10, ALICE, &[POOL_A]).expect("Alice claims"), U256::ZERO);
}

#[test]
fn stale_time_is_rejected_without_side_effects() {
    let mut c = two_pool_controller(&[0], &[10], (1, 1), U256::MAX);
    c.handle_action(&POOL_A, BASE_TIME + 100, ALICE, u(1), u(1)).expect("Alice stakes");
    let before = c.pool_info(&POOL_A);

    let err = c
        .handle_action(&POOL_A, BASE_TIME + 99, BOB, u(1), u(2))
        .expect_err("Earlier timestamp should be rejected");
    assert!(matches!(err, IncentivesError::NonMonotonicTime { .. }));
    assert_eq!(c.pool_info(&POOL_A), before);
}

proptest! {
    #[test]
    fn prop_minted_never_exceeds_emitted(
        rate in 1u128..10_000,
        reweights in prop::collection::vec((1u64..200, 0u64..10, 0u64..10), 1..10),
    ) {
        let mut c = two_pool_controller(&[0], &[rate], (1, 1), U256::MAX);
        c.handle_action(&POOL_A, BASE_TIME + 1, ALICE, u(7), u(7)).expect("Alice stakes");
        c.handle_action(&POOL_B, BASE_TIME + 1, BOB, u(3), u(3)).expect("Bob stakes");

        let mut now = BASE_TIME + 1;
        for (dt, wa, wb) in reweights {
            now += dt;
            c.batch_update_allocation_weights(&OWNER, now, &[POOL_A, POOL_B], &[u(wa), u(wb)])
                .expect("re-weight");
        }
        now += 1;
        c.claim(now, ALICE, &[POOL_A]).expect("Alice claims");
        c.claim(now, BOB, &[POOL_B]).expect("Bob claims");

        let emitted = U256::from(rate) * U256::from(now - BASE_TIME - 1);
        prop_assert!(c.minted_tokens() <= emitted);
    }
}
