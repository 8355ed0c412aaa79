//! End-to-end scenarios driving a deployed ledger.
//!
//! Coverage:
//! - Template -> agreement -> condition binding
//! - Global condition-id uniqueness across agreements
//! - All-or-nothing agreement creation
//! - Forward-only condition state transitions
//! - Delegated authorization for state changes
//! - Event log contents and live subscription
//! - Snapshot and restore

use agreement_store::prelude::*;
use std::sync::{Arc, Mutex};

fn owner() -> Address {
    Address::derive("owner")
}

fn x() -> Address {
    Address::derive("condition-type-x")
}

fn y() -> Address {
    Address::derive("condition-type-y")
}

fn id(n: u64) -> Id {
    Id::from_u64(n)
}

/// Ledger with template `T1 = [X, Y]` already created.
fn ledger_with_t1() -> Ledger {
    let mut ledger = Ledger::with_owner(owner()).unwrap();
    ledger.create_template(owner(), id(1), vec![x(), y()]).unwrap();
    ledger
}

fn a1() -> NewAgreement {
    NewAgreement::new(id(1), "did:op:0", id(1), vec![id(0), id(1)], vec![0, 1], vec![2, 3])
}

// ═══════════════════════════════════════════════════════════════════
// CREATION
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_create_agreement_and_conditions_exist() {
    let mut ledger = ledger_with_t1();
    ledger.create_agreement(owner(), a1()).unwrap();

    assert!(ledger.agreements().exists(&id(1)));

    let template = ledger.templates().get_template(&id(1)).unwrap().clone();
    for (i, cid) in [id(0), id(1)].iter().enumerate() {
        let c = ledger.conditions().get_condition(cid).unwrap();
        assert_eq!(c.type_ref, template.condition_types[i]);
        assert_eq!(c.state, ConditionState::Unfulfilled);
        assert_eq!(c.time_lock, [0, 1][i]);
        assert_eq!(c.time_out, [2, 3][i]);
    }

    let c0 = ledger.conditions().get_condition(&id(0)).unwrap();
    assert_eq!(c0.type_ref, x());
    assert_eq!(c0.time_lock, 0);
    assert_eq!(c0.time_out, 2);
}

#[test]
fn test_get_agreement() {
    let mut ledger = ledger_with_t1();
    ledger.advance(17);
    let creator = Address::derive("consumer");
    ledger.create_agreement(creator, a1()).unwrap();

    let stored = ledger.agreements().get_agreement(&id(1)).unwrap();
    assert_eq!(stored.did, Did::from("did:op:0"));
    assert_eq!(stored.template_id, id(1));
    assert_eq!(stored.condition_ids, vec![id(0), id(1)]);
    assert_eq!(stored.time_locks, vec![0, 1]);
    assert_eq!(stored.time_outs, vec![2, 3]);
    assert_eq!(stored.creator, creator);
    assert_eq!(stored.block_number_created, 17);
}

#[test]
fn test_exists() {
    let mut ledger = ledger_with_t1();
    assert!(!ledger.agreements().exists(&id(1)));
    assert!(ledger.agreements().get_agreement(&id(1)).is_err());

    ledger.create_agreement(owner(), a1()).unwrap();
    assert!(ledger.agreements().exists(&id(1)));
    assert!(!ledger.agreements().exists(&id(2)));
}

#[test]
fn test_reused_condition_id_rejects_whole_agreement() {
    let mut ledger = Ledger::with_owner(owner()).unwrap();
    ledger.create_template(owner(), id(1), vec![x()]).unwrap();
    ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(0), "did:op:0", id(1), vec![id(0)], vec![0], vec![2]),
        )
        .unwrap();

    let err = ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(2), "did:op:0", id(1), vec![id(0)], vec![0], vec![2]),
        )
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::IdentifierAlreadyExists);
    assert!(!ledger.agreements().exists(&id(2)));
}

#[test]
fn test_no_partial_commit_on_second_condition_collision() {
    let mut ledger = ledger_with_t1();
    ledger.create_agreement(owner(), a1()).unwrap();
    let conditions_before = ledger.conditions().condition_count();
    let events_before = ledger.events().len();

    // first id is fresh, second collides with A1's c1
    let err = ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(2), "did:op:1", id(1), vec![id(5), id(1)], vec![0, 0], vec![0, 0]),
        )
        .unwrap_err();

    assert_eq!(err, StoreError::already_exists(Entity::Condition, id(1)));
    assert!(!ledger.agreements().exists(&id(2)));
    assert!(!ledger.conditions().exists(&id(5)));
    assert_eq!(ledger.conditions().condition_count(), conditions_before);
    assert_eq!(ledger.events().len(), events_before);
}

#[test]
fn test_non_existing_template() {
    let mut ledger = Ledger::with_owner(owner()).unwrap();
    let err = ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(0), "did:op:0", id(2), vec![id(0)], vec![0], vec![2]),
        )
        .unwrap_err();

    assert_eq!(err, StoreError::TemplateMustExist(id(2)));
    assert!(!ledger.conditions().exists(&id(0)));
}

#[test]
fn test_time_locks_length_mismatch() {
    let mut ledger = ledger_with_t1();
    let err = ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(1), "did:op:0", id(1), vec![id(0), id(1)], vec![0], vec![2, 3]),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LengthMismatch);
    assert_eq!(ledger.conditions().condition_count(), 0);
}

#[test]
fn test_revoked_template_blocks_only_future_agreements() {
    let mut ledger = ledger_with_t1();
    ledger.create_agreement(owner(), a1()).unwrap();
    ledger.revoke_template(owner(), id(1)).unwrap();

    let err = ledger
        .create_agreement(
            owner(),
            NewAgreement::new(id(2), "did", id(1), vec![id(8), id(9)], vec![0, 0], vec![0, 0]),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TemplateMustExist);

    assert!(ledger.agreements().exists(&id(1)));
    ledger.fulfill_condition(x(), id(0)).unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// CONDITION STATE
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_forward_only_transitions() {
    let mut ledger = ledger_with_t1();
    ledger.create_agreement(owner(), a1()).unwrap();

    assert_eq!(
        ledger.fulfill_condition(x(), id(0)).unwrap(),
        ConditionState::Unfulfilled
    );
    assert_eq!(
        ledger.abort_condition(y(), id(1)).unwrap(),
        ConditionState::Unfulfilled
    );

    for (cid, handler) in [(id(0), x()), (id(1), y())] {
        for next in [
            ConditionState::Uninitialized,
            ConditionState::Unfulfilled,
            ConditionState::Fulfilled,
            ConditionState::Aborted,
        ] {
            let err = ledger.update_condition_state(handler, cid, next).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidTransition);
        }
    }

    assert_eq!(ledger.conditions().condition_state(&id(0)), ConditionState::Fulfilled);
    assert_eq!(ledger.conditions().condition_state(&id(1)), ConditionState::Aborted);
}

#[test]
fn test_only_bound_handler_may_update() {
    let mut ledger = ledger_with_t1();
    ledger.create_agreement(owner(), a1()).unwrap();

    // c0 is bound to X, so Y may not touch it
    let err = ledger.fulfill_condition(y(), id(0)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    let err = ledger.fulfill_condition(owner(), id(0)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthorized);

    assert_eq!(ledger.conditions().condition_state(&id(0)), ConditionState::Unfulfilled);
}

#[test]
fn test_update_missing_condition() {
    let mut ledger = ledger_with_t1();
    let err = ledger.fulfill_condition(x(), id(42)).unwrap_err();
    assert_eq!(err, StoreError::not_found(Entity::Condition, id(42)));
}

/// Access control that records every check it answers.
struct RecordingAccess {
    allowed: Address,
    checks: Mutex<Vec<(Address, Action, Address)>>,
}

impl AccessControl for RecordingAccess {
    fn can(&self, actor: &Address, action: Action, resource: &Address) -> bool {
        self.checks.lock().unwrap().push((*actor, action, *resource));
        *actor == self.allowed
    }
}

#[test]
fn test_injected_access_control() {
    let oracle = Address::derive("oracle");
    let access = Arc::new(RecordingAccess {
        allowed: oracle,
        checks: Mutex::new(vec![]),
    });
    let mut ledger = Ledger::deploy(owner(), StoreConfig::default(), access.clone()).unwrap();
    ledger.create_template(owner(), id(1), vec![x(), y()]).unwrap();
    ledger.create_agreement(owner(), a1()).unwrap();

    assert!(ledger.fulfill_condition(x(), id(0)).is_err());
    ledger.fulfill_condition(oracle, id(0)).unwrap();

    let checks = access.checks.lock().unwrap();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[1], (oracle, Action::UpdateConditionState, x()));
}

#[test]
fn test_explicit_handler_registry() {
    let signer = Address::derive("sign-handler");
    let registry = HandlerRegistry::explicit_only().register(x(), signer);
    let mut ledger = Ledger::deploy(owner(), StoreConfig::default(), Arc::new(registry)).unwrap();
    ledger.create_template(owner(), id(1), vec![x()]).unwrap();
    ledger
        .create_agreement(owner(), NewAgreement::new(id(1), "did", id(1), vec![id(3)], vec![0], vec![0]))
        .unwrap();

    assert!(ledger.fulfill_condition(x(), id(3)).is_err());
    ledger.fulfill_condition(signer, id(3)).unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// TIME WINDOWS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_condition_windows_follow_the_clock() {
    let mut ledger = ledger_with_t1();
    ledger.advance(10);
    ledger.create_agreement(owner(), a1()).unwrap();

    // c1: lock 1, out 3, created at block 10
    assert!(!ledger.is_condition_actionable(&id(1)).unwrap());
    assert!(ledger.conditions().is_condition_time_locked(&id(1), 10).unwrap());

    ledger.advance(1);
    assert!(ledger.is_condition_actionable(&id(1)).unwrap());

    ledger.advance(2);
    assert!(!ledger.is_condition_actionable(&id(1)).unwrap());
    assert!(ledger.conditions().is_condition_timed_out(&id(1), ledger.block_number()).unwrap());
}

// ═══════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_event_log_records_every_commit() {
    let mut ledger = ledger_with_t1();
    ledger.advance(3);
    ledger.create_agreement(owner(), a1()).unwrap();
    ledger.fulfill_condition(x(), id(0)).unwrap();
    let _ = ledger.fulfill_condition(x(), id(0));

    let names: Vec<_> = ledger
        .events()
        .entries()
        .iter()
        .map(|e| e.kind.name())
        .collect();
    assert_eq!(
        names,
        vec![
            "template_created",
            "condition_created",
            "condition_created",
            "agreement_created",
            "condition_updated",
        ]
    );

    let agreement_events = ledger
        .events()
        .matching(&EventFilter::new().of_type("agreement_created"));
    assert_eq!(agreement_events.len(), 1);
    match &agreement_events[0].kind {
        EventKind::AgreementCreated { agreement } => {
            assert_eq!(agreement.id, id(1));
            assert_eq!(agreement.did, Did::from("did:op:0"));
            assert_eq!(agreement.template_id, id(1));
            assert_eq!(agreement.condition_ids, vec![id(0), id(1)]);
            assert_eq!(agreement.creator, owner());
            assert_eq!(agreement.block_number_created, 3);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(agreement_events[0].block_number, 3);
}

#[tokio::test]
async fn test_live_subscription() {
    let mut ledger = ledger_with_t1();
    let mut rx = ledger.subscribe();

    ledger.create_agreement(owner(), a1()).unwrap();

    let mut names = vec![];
    for _ in 0..3 {
        names.push(rx.recv().await.unwrap().kind.name());
    }
    assert_eq!(
        names,
        vec!["condition_created", "condition_created", "agreement_created"]
    );
}

// ═══════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_snapshot_restore_preserves_invariants() {
    let mut ledger = ledger_with_t1();
    ledger.advance(5);
    ledger.create_agreement(owner(), a1()).unwrap();
    ledger.fulfill_condition(x(), id(0)).unwrap();

    let snapshot = ledger.snapshot().unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();
    let snapshot: LedgerSnapshot = serde_json::from_str(&json).unwrap();

    let mut restored = Ledger::restore(
        &snapshot,
        StoreConfig::default(),
        Arc::new(HandlerRegistry::default()),
    )
    .unwrap();

    assert_eq!(restored.block_number(), 5);
    assert_eq!(restored.owner(), owner());
    assert!(restored.events().is_empty());
    assert_eq!(
        restored.agreements().get_agreement(&id(1)).unwrap(),
        ledger.agreements().get_agreement(&id(1)).unwrap()
    );
    assert_eq!(restored.conditions().condition_state(&id(0)), ConditionState::Fulfilled);

    // condition ids remain reserved after restore
    let err = restored
        .create_agreement(
            owner(),
            NewAgreement::new(id(2), "did", id(1), vec![id(1), id(7)], vec![0, 0], vec![0, 0]),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdentifierAlreadyExists);

    // and the restored wiring still accepts new agreements
    restored
        .create_agreement(
            owner(),
            NewAgreement::new(id(2), "did", id(1), vec![id(6), id(7)], vec![0, 0], vec![0, 0]),
        )
        .unwrap();
    assert_eq!(restored.events().len(), 3);
}

#[test]
fn test_content_addressed_template_ids() {
    let mut ledger = Ledger::with_owner(owner()).unwrap();
    let types = vec![x(), y()];
    let template_id = Template::derive_id(&types);
    ledger.create_template(owner(), template_id, types.clone()).unwrap();

    let err = ledger
        .create_template(owner(), Template::derive_id(&types), types)
        .unwrap_err();
    assert_eq!(err, StoreError::already_exists(Entity::Template, template_id));
    assert_eq!(ledger.templates().template_ids(), &[template_id]);
}
