//! Navigation, resumption, and concurrency behavior of the wizard driver.
// crates/reply-triage-core/tests/navigation.rs
// =============================================================================
// Module: Wizard Navigation Tests
// Description: Stale steps, going back, replay, resumption, and version conflicts.
// Purpose: Ensure the resolver stays the single authority on the current step.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use reply_triage_core::ActionType;
use reply_triage_core::CommitOutcome;
use reply_triage_core::DEFAULT_BASE_PATH;
use reply_triage_core::InputSource;
use reply_triage_core::InstanceId;
use reply_triage_core::OpenRequest;
use reply_triage_core::StepCursor;
use reply_triage_core::StepKey;
use reply_triage_core::StoreError;
use reply_triage_core::ThreadId;
use reply_triage_core::WizardError;
use reply_triage_core::WizardStore;
use reply_triage_core::parse_step_address;
use reply_triage_core::step_address;
use serde_json::Value;
use serde_json::json;

mod common;

use common::Harness;

/// Answers of a refusal flow ending in Categorized.
fn refusal_answers() -> Vec<(StepKey, Value)> {
    vec![
        (StepKey::Basics, json!({"branch": common::BRANCH, "delivered_date": "2024-03-01"})),
        (StepKey::IsOnTopic, json!({"is_on_topic": true})),
        (StepKey::ContainsInfo, json!({"contains_info": "none"})),
        (StepKey::IsDecision, json!({"is_decision": true})),
        (StepKey::RefusalReasons, json!({"refusal_reason": ["does_not_have"]})),
        (StepKey::Categorized, json!({"legal_date": "2024-03-01"})),
    ]
}

/// Applies answers in order.
fn answer_all(harness: &Harness, id: &InstanceId, answers: &[(StepKey, Value)]) {
    for (step, value) in answers {
        harness.advance(id, *step, value.clone());
    }
}

// ============================================================================
// SECTION: Stale Steps
// ============================================================================

#[test]
fn submitting_a_non_current_step_is_stale() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    let err = harness.submit(&id, StepKey::Categorized, json!({"legal_date": "2024-03-01"})).unwrap_err();
    match err {
        WizardError::StaleStep {
            requested,
            current,
        } => {
            assert_eq!(requested, StepKey::Categorized);
            assert_eq!(current, StepCursor::Step(StepKey::Basics));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        harness.wizard.step_view(&id, StepKey::IsOnTopic).unwrap_err(),
        WizardError::StaleStep { .. }
    ));
    let events = harness.audit.events();
    let stale: Vec<_> = events.iter().filter(|event| event.event == "stale_step").collect();
    assert_eq!(stale.len(), 2);
    assert_eq!(stale[0].step, Some(StepKey::Categorized));
}

#[test]
fn answered_step_cannot_be_resubmitted_without_going_back() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    harness.advance(&id, StepKey::Basics, json!({"branch": common::BRANCH, "delivered_date": "2024-03-01"}));
    let err = harness
        .submit(&id, StepKey::Basics, json!({"branch": common::BRANCH, "delivered_date": "2024-03-02"}))
        .unwrap_err();
    assert!(matches!(err, WizardError::StaleStep { .. }));
}

#[test]
fn unknown_instance_is_not_found() {
    let harness = Harness::new(&[]);
    let missing = InstanceId::from_raw("obligee-action-404");
    assert!(matches!(harness.wizard.resolve_current_step(&missing).unwrap_err(), WizardError::NotFound(_)));
}

#[test]
fn opening_an_unknown_thread_fails() {
    let harness = Harness::new(&[]);
    let err = harness
        .wizard
        .open(OpenRequest {
            thread_id: ThreadId::new("t-404"),
            source: InputSource::Manual,
            draft: common::draft_ref(),
        })
        .unwrap_err();
    assert!(matches!(err, WizardError::Thread(_)));
}

// ============================================================================
// SECTION: Going Back
// ============================================================================

#[test]
fn going_back_discards_later_answers() {
    let harness = Harness::new(&[ActionType::Refusal, ActionType::Disclosure]);
    let id = harness.open(InputSource::Manual);
    answer_all(&harness, &id, &refusal_answers()[.. 4]);
    assert_eq!(harness.wizard.resolve_current_step(&id).unwrap(), StepCursor::Step(StepKey::RefusalReasons));

    assert_eq!(harness.wizard.go_back(&id, StepKey::ContainsInfo).unwrap(), StepCursor::Step(StepKey::ContainsInfo));
    let instance = harness.store.load(&id).unwrap().unwrap();
    assert_eq!(instance.completed(), vec![StepKey::Basics, StepKey::IsOnTopic]);
    assert!(instance.state().action().is_none());

    assert_eq!(
        harness.advance(&id, StepKey::ContainsInfo, json!({"contains_info": "full"})),
        StepCursor::Step(StepKey::Categorized)
    );
    assert_eq!(harness.store.load(&id).unwrap().unwrap().state().action(), Some(ActionType::Disclosure));
}

#[test]
fn going_back_to_the_current_step_is_a_no_op() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    let version = harness.store.load(&id).unwrap().unwrap().version;
    assert_eq!(harness.wizard.go_back(&id, StepKey::Basics).unwrap(), StepCursor::Step(StepKey::Basics));
    assert_eq!(harness.store.load(&id).unwrap().unwrap().version, version);
    assert!(matches!(harness.wizard.go_back(&id, StepKey::Categorized).unwrap_err(), WizardError::StaleStep { .. }));
}

#[test]
fn replayed_answers_commit_the_same_record() {
    let first = Harness::new(&[ActionType::Refusal, ActionType::Disclosure]);
    let id = first.open(InputSource::Manual);
    answer_all(&first, &id, &refusal_answers());
    first.wizard.go_back(&id, StepKey::IsOnTopic).unwrap();
    answer_all(&first, &id, &refusal_answers()[1 ..]);
    let CommitOutcome::Action {
        record: replayed, ..
    } = first.wizard.commit(&id).unwrap()
    else {
        panic!("expected an action outcome");
    };

    let second = Harness::new(&[ActionType::Refusal, ActionType::Disclosure]);
    let id = second.open(InputSource::Manual);
    answer_all(&second, &id, &refusal_answers());
    let CommitOutcome::Action {
        record: direct, ..
    } = second.wizard.commit(&id).unwrap()
    else {
        panic!("expected an action outcome");
    };
    assert_eq!(replayed, direct);
}

// ============================================================================
// SECTION: Resumption And Concurrency
// ============================================================================

#[test]
fn reopening_with_the_same_source_resumes() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    answer_all(&harness, &id, &refusal_answers()[.. 2]);
    let resumed = harness.open(InputSource::Manual);
    assert_eq!(resumed, id);
    assert_eq!(harness.wizard.resolve_current_step(&id).unwrap(), StepCursor::Step(StepKey::ContainsInfo));
    assert!(harness.audit.events().iter().any(|event| event.event == "wizard_resumed"));
}

#[test]
fn reopening_with_a_different_source_starts_over() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    answer_all(&harness, &id, &refusal_answers()[.. 2]);
    let reopened = harness.open(common::message());
    assert_eq!(reopened, id);
    let instance = harness.store.load(&id).unwrap().unwrap();
    assert!(instance.completed().is_empty());
    assert_eq!(instance.source, common::message());
}

#[test]
fn concurrent_submission_loses_with_a_conflict() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    let stale = harness.store.load(&id).unwrap().unwrap();
    harness.advance(&id, StepKey::Basics, json!({"branch": common::BRANCH, "delivered_date": "2024-03-01"}));

    let err = harness.store.save(&stale, stale.version).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert_eq!(WizardError::from(err).kind(), "store_conflict");
}

#[test]
fn committed_flow_is_removed_and_cannot_commit_twice() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    answer_all(&harness, &id, &refusal_answers());
    harness.wizard.commit(&id).unwrap();
    assert!(matches!(harness.wizard.commit(&id).unwrap_err(), WizardError::NotFound(_)));
    assert_eq!(harness.wizard.ledger(&harness.thread()).unwrap().records.len(), 1);
}

// ============================================================================
// SECTION: Step Addresses
// ============================================================================

#[test]
fn current_step_address_parses_back() {
    let harness = Harness::new(&[ActionType::Refusal]);
    let id = harness.open(InputSource::Manual);
    let StepCursor::Step(step) = harness.wizard.resolve_current_step(&id).unwrap() else {
        panic!("fresh flow must be at a step");
    };
    let address = step_address(DEFAULT_BASE_PATH, &id, step);
    assert_eq!(address, "/obligee-action/obligee-action-t-1/basics");
    assert_eq!(parse_step_address(DEFAULT_BASE_PATH, &address), Some((id, step)));
}

#[test]
fn address_of_thread_with_slash_resolves_to_the_same_flow() {
    let harness = Harness::new(&[ActionType::Refusal]);
    harness.threads.set("2024/17", vec![common::branch(&[ActionType::Refusal])]);
    let instance = harness
        .wizard
        .open(OpenRequest {
            thread_id: ThreadId::new("2024/17"),
            source: InputSource::Manual,
            draft: common::draft_ref(),
        })
        .unwrap();

    let address = step_address(DEFAULT_BASE_PATH, &instance.instance_id, StepKey::Basics);
    assert_eq!(address, "/obligee-action/obligee-action-2024%2F17/basics");
    let (parsed, step) = parse_step_address(DEFAULT_BASE_PATH, &address).unwrap();
    assert_eq!(parsed, instance.instance_id);
    assert_eq!(harness.wizard.step_view(&parsed, step).unwrap().step, StepKey::Basics);
}
