//! Integration test: Allocation validation and flow state machine.
//!
//! Drives malformed and out-of-order flow events through a live valve
//! and verifies that every rejection leaves the ledger exactly as it
//! was. Covers:
//! - the one-flow-per-account state machine
//! - inbound rate positivity
//! - payload shape, registry membership, duplicates, range, sum rule
//! - rate drift between the event and the ledger
//! - floor division in per-pipe rate derivation
//! - the all-zero payload that unroutes without closing the flow

use flowvalve_alloc::AllocError;
use flowvalve_engine::{EngineError, Valve};
use flowvalve_types::flow::{AllocationPayload, FlowEvent};
use flowvalve_types::{AccountId, PipeId};

/// Base timestamp for test scenarios.
const BASE_TIME: u64 = 1_700_000_000;

const ADMIN: AccountId = [0xAD; 32];
const PIPE_1: PipeId = [0x01; 32];
const PIPE_2: PipeId = [0x02; 32];
const UNREGISTERED: PipeId = [0x99; 32];

/// Helper: a valve with PIPE_1 and PIPE_2 registered.
fn valve() -> Valve {
    let mut valve = Valve::open_memory(ADMIN).expect("open valve");
    for pipe in [PIPE_1, PIPE_2] {
        valve
            .add_pipe_address(&ADMIN, &pipe, BASE_TIME)
            .expect("pipe registration should succeed");
    }
    valve
}

/// Helper: a creation event routing 100% of `rate` into PIPE_1.
fn simple_created(account: AccountId, rate: i128) -> FlowEvent {
    FlowEvent::Created {
        account,
        rate,
        payload: AllocationPayload::new(vec![PIPE_1], vec![100]),
    }
}

#[tokio::test]
#[ignore]
async fn one_flow_per_account() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    valve
        .apply_flow_event(&simple_created(account, 100), BASE_TIME)
        .expect("first creation should succeed");

    // ==============================================
    // Second creation for the same account is refused
    // ==============================================
    let err = valve
        .apply_flow_event(&simple_created(account, 500), BASE_TIME + 10)
        .expect_err("second creation must be rejected");
    assert!(matches!(err, EngineError::FlowAlreadyActive { .. }));

    // The original flow is untouched
    let flow = valve
        .account_flow(&account)
        .expect("flow read")
        .expect("flow must still exist");
    assert_eq!(flow.flow_rate, 100);
    assert_eq!(flow.started_at, BASE_TIME);

    // ==============================================
    // Update and delete need an active flow
    // ==============================================
    let stranger: AccountId = rand::random();
    let err = valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account: stranger,
                old_rate: 100,
                new_rate: 200,
                payload: AllocationPayload::new(vec![PIPE_1], vec![100]),
            },
            BASE_TIME + 10,
        )
        .expect_err("update without a flow must be rejected");
    assert!(matches!(err, EngineError::NoActiveFlow { .. }));

    let err = valve
        .apply_flow_event(
            &FlowEvent::Deleted {
                account: stranger,
                old_rate: 100,
                payload: AllocationPayload::zeroed(&[PIPE_1]),
            },
            BASE_TIME + 10,
        )
        .expect_err("delete without a flow must be rejected");
    assert!(matches!(err, EngineError::NoActiveFlow { .. }));
}

#[tokio::test]
#[ignore]
async fn inbound_rate_must_be_positive() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    for bad_rate in [0i128, -1, -1_000_000] {
        let err = valve
            .apply_flow_event(&simple_created(account, bad_rate), BASE_TIME)
            .expect_err("nonpositive rate must be rejected");
        assert!(
            matches!(err, EngineError::InvalidFlowRate { rate } if rate == bad_rate),
            "expected InvalidFlowRate for {bad_rate}"
        );
    }
    assert!(
        valve.account_flow(&account).expect("flow read").is_none(),
        "no flow row may exist after rejected creations"
    );

    // Updates are held to the same rule
    valve
        .apply_flow_event(&simple_created(account, 100), BASE_TIME)
        .expect("create");
    let err = valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account,
                old_rate: 100,
                new_rate: 0,
                payload: AllocationPayload::new(vec![PIPE_1], vec![100]),
            },
            BASE_TIME + 5,
        )
        .expect_err("zero-rate update must be rejected");
    assert!(matches!(err, EngineError::InvalidFlowRate { rate: 0 }));
}

#[tokio::test]
#[ignore]
async fn payload_rules_are_enforced_in_order() {
    let mut valve = valve();

    // Mismatched sequence lengths
    let err = valve
        .apply_flow_event(
            &FlowEvent::Created {
                account: rand::random(),
                rate: 100,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![100]),
            },
            BASE_TIME,
        )
        .expect_err("length mismatch must be rejected");
    assert!(matches!(
        err,
        EngineError::Alloc(AllocError::LengthMismatch {
            pipes: 2,
            percentages: 1
        })
    ));

    // Unregistered pipe wins over its out-of-range percentage
    let err = valve
        .apply_flow_event(
            &FlowEvent::Created {
                account: rand::random(),
                rate: 100,
                payload: AllocationPayload::new(vec![UNREGISTERED], vec![200]),
            },
            BASE_TIME,
        )
        .expect_err("unregistered pipe must be rejected");
    assert!(
        matches!(err, EngineError::Alloc(AllocError::InvalidPipeAddress { .. })),
        "registry membership is checked before the percentage range"
    );

    // Same pipe twice in one batch
    let err = valve
        .apply_flow_event(
            &FlowEvent::Created {
                account: rand::random(),
                rate: 100,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_1], vec![50, 50]),
            },
            BASE_TIME,
        )
        .expect_err("duplicate pipe must be rejected");
    assert!(matches!(
        err,
        EngineError::Alloc(AllocError::DuplicatePipe { .. })
    ));

    // Percentage outside 0..=100
    for bad_pct in [-1i64, 101, 1_000] {
        let err = valve
            .apply_flow_event(
                &FlowEvent::Created {
                    account: rand::random(),
                    rate: 100,
                    payload: AllocationPayload::new(vec![PIPE_1], vec![bad_pct]),
                },
                BASE_TIME,
            )
            .expect_err("out-of-range percentage must be rejected");
        assert!(matches!(
            err,
            EngineError::Alloc(AllocError::PercentageOutOfRange { percentage, .. })
                if percentage == bad_pct
        ));
    }

    // Sum must be exactly 0 or 100
    for (a, b) in [(60, 50), (60, 30), (1, 0)] {
        let err = valve
            .apply_flow_event(
                &FlowEvent::Created {
                    account: rand::random(),
                    rate: 100,
                    payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![a, b]),
                },
                BASE_TIME,
            )
            .expect_err("partial allocation must be rejected");
        assert!(matches!(
            err,
            EngineError::Alloc(AllocError::AllocationsNotFullOrZero { total }) if total == a + b
        ));
    }
}

#[tokio::test]
#[ignore]
async fn rejected_event_leaves_ledger_untouched() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    valve
        .apply_flow_event(
            &FlowEvent::Created {
                account,
                rate: 100,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![60, 40]),
            },
            BASE_TIME,
        )
        .expect("create");

    // A bad update 50 seconds in: right shape, wrong sum
    valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account,
                old_rate: 100,
                new_rate: 300,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![60, 50]),
            },
            BASE_TIME + 50,
        )
        .expect_err("sum 110 must be rejected");

    // Nothing moved: old rates still apply and accrual is seamless
    assert_eq!(
        valve.user_pipe_flow_rate(&account, &PIPE_1).expect("rate"),
        60
    );
    assert_eq!(
        valve.user_pipe_allocation(&account, &PIPE_2).expect("pct"),
        40
    );
    let (total, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 100)
        .expect("balance read");
    assert_eq!(
        total, 10_000,
        "a rejected update must not freeze any checkpoint"
    );
    assert!(
        valve
            .check_booked_totals(BASE_TIME + 100)
            .expect("consistency")
            .is_empty()
    );
}

#[tokio::test]
#[ignore]
async fn ledger_rate_wins_over_event_rate_drift() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    valve
        .apply_flow_event(&simple_created(account, 100), BASE_TIME)
        .expect("create");

    // The event claims the old rate was 999; the ledger knows better.
    // The update still applies, from the ledger's frozen figures.
    valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account,
                old_rate: 999,
                new_rate: 300,
                payload: AllocationPayload::new(vec![PIPE_1], vec![100]),
            },
            BASE_TIME + 100,
        )
        .expect("drifted update should still apply");

    let (total, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 200)
        .expect("balance read");
    assert_eq!(
        total,
        100 * 100 + 300 * 100,
        "accrued history must come from the ledger rate, not the event"
    );

    // Same for delete: the echoed rate is advisory
    valve
        .apply_flow_event(
            &FlowEvent::Deleted {
                account,
                old_rate: 12_345,
                payload: AllocationPayload::zeroed(&[PIPE_1]),
            },
            BASE_TIME + 300,
        )
        .expect("drifted delete should still apply");
    let (total, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 1_000)
        .expect("balance read");
    assert_eq!(total, 100 * 100 + 300 * 200);
}

#[tokio::test]
#[ignore]
async fn per_pipe_rates_floor_toward_zero() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    // 101 split 50/50: each side gets floor(50.5) = 50
    valve
        .apply_flow_event(
            &FlowEvent::Created {
                account,
                rate: 101,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![50, 50]),
            },
            BASE_TIME,
        )
        .expect("create");

    assert_eq!(
        valve.user_pipe_flow_rate(&account, &PIPE_1).expect("rate"),
        50
    );
    assert_eq!(
        valve.user_pipe_flow_rate(&account, &PIPE_2).expect("rate"),
        50
    );

    let (_, aggregate) = valve.total_valve_balance(BASE_TIME).expect("valve read");
    assert_eq!(aggregate, 100, "the floored remainder never streams");

    let (total, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 1_000)
        .expect("balance read");
    assert_eq!(total, 100_000, "accrual follows the floored rates");
}

#[tokio::test]
#[ignore]
async fn zero_sum_payload_unroutes_without_closing() {
    let mut valve = valve();
    let account: AccountId = rand::random();

    valve
        .apply_flow_event(
            &FlowEvent::Created {
                account,
                rate: 100,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![60, 40]),
            },
            BASE_TIME,
        )
        .expect("create");

    // ==============================================
    // Park the flow: keep it open, route nothing
    // ==============================================
    valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account,
                old_rate: 100,
                new_rate: 100,
                payload: AllocationPayload::new(vec![PIPE_1, PIPE_2], vec![0, 0]),
            },
            BASE_TIME + 100,
        )
        .expect("all-zero update should apply");

    let flow = valve
        .account_flow(&account)
        .expect("flow read")
        .expect("flow must stay active");
    assert_eq!(flow.flow_rate, 100);
    assert_eq!(
        valve.user_pipe_allocation(&account, &PIPE_1).expect("pct"),
        0
    );

    // Parked: balances hold still
    let (parked, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 500)
        .expect("balance read");
    assert_eq!(parked, 10_000, "a parked flow accrues nothing");

    // ==============================================
    // Re-route and resume accruing
    // ==============================================
    valve
        .apply_flow_event(
            &FlowEvent::Updated {
                account,
                old_rate: 100,
                new_rate: 100,
                payload: AllocationPayload::new(vec![PIPE_2], vec![100]),
            },
            BASE_TIME + 500,
        )
        .expect("re-route should apply");
    let (total, _) = valve
        .user_total_flowed_balance(&account, BASE_TIME + 600)
        .expect("balance read");
    assert_eq!(total, 10_000 + 100 * 100);
    assert!(
        valve
            .check_booked_totals(BASE_TIME + 600)
            .expect("consistency")
            .is_empty()
    );
}
