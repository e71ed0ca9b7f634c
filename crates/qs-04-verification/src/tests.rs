//! Tests for the Verification Engine

use super::*;
use qs_03_admission::{AdmissionConfig, AdmissionRejection, DropReason};
use shared_types::{Channel, GroupId, PrincipalId, RemoteId, SessionTag, Timestamp};

const SEC: Timestamp = 1_000;

fn principal(name: &str) -> PrincipalId {
    PrincipalId::new(name)
}

fn session(tag: &str) -> SessionTag {
    SessionTag::new(tag)
}

fn engine_with_codes(codes: &[&str]) -> VerificationEngine {
    engine_with(AdmissionConfig::default(), codes)
}

fn engine_with(admission: AdmissionConfig, codes: &[&str]) -> VerificationEngine {
    VerificationEngine::with_generator(
        VerificationConfig::default(),
        admission,
        Box::new(ScriptedCodeGenerator::new(codes.iter().copied())),
    )
}

fn issue(
    engine: &mut VerificationEngine,
    who: &str,
    remote: u64,
    now: Timestamp,
) -> Issued {
    match engine.issue(&principal(who), RemoteId(remote), session(who), now) {
        IssueOutcome::Issued(issued) => issued,
        other => panic!("expected issuance, got {other:?}"),
    }
}

// =============================================================================
// TEST GROUP 1: Redemption
// =============================================================================

#[test]
fn test_two_wrong_codes_then_success() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    issue(&mut engine, "alice", 1000, 0);

    for expected_remaining in [2, 1] {
        let outcome = engine.redeem(&alice, &session("alice"), "000000", Channel::Game, SEC);
        assert!(matches!(
            outcome,
            RedeemOutcome::Retry { remaining, .. } if remaining == expected_remaining
        ));
    }

    match engine.redeem(&alice, &session("alice"), "123456", Channel::Game, 2 * SEC) {
        RedeemOutcome::Verified(verified) => {
            assert_eq!(verified.remote, RemoteId(1000));
            assert_eq!(verified.attempts, 2);
            assert_eq!(verified.channel, Channel::Game);
            assert!(verified
                .side_effects
                .iter()
                .any(|effect| matches!(effect, SideEffect::Retract { .. })));
        }
        other => panic!("expected verification, got {other:?}"),
    }

    assert!(engine.request(&alice).is_none());
    assert_eq!(engine.stage(&alice), Some(BindingStage::Bound));
    assert_eq!(engine.stats().verified_total, 1);
    assert!(!engine.admission().is_active(&alice));
}

#[test]
fn test_third_wrong_code_exhausts() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    let issued = issue(&mut engine, "alice", 1000, 0);

    engine.redeem(&alice, &session("alice"), "111111", Channel::Game, SEC);
    engine.redeem(&alice, &session("alice"), "222222", Channel::Game, SEC);
    let outcome = engine.redeem(&alice, &session("alice"), "333333", Channel::Game, SEC);

    assert_eq!(
        outcome,
        RedeemOutcome::Failed(VerificationFailure::Exhausted {
            ticket: issued.ticket,
            remote: RemoteId(1000),
            cooldown_secs: 10,
        })
    );
    assert!(engine.request(&alice).is_none());

    // The correct code no longer helps.
    let late = engine.redeem(&alice, &session("alice"), "123456", Channel::Game, SEC);
    assert_eq!(
        late,
        RedeemOutcome::Failed(VerificationFailure::NoActiveRequest)
    );

    // And the account is locked for everyone.
    let other = engine.issue(&principal("bob"), RemoteId(1000), session("bob"), 5 * SEC);
    assert!(matches!(
        other,
        IssueOutcome::Rejected(AdmissionRejection::RemoteCooldown { remaining_secs: 6, .. })
    ));
}

#[test]
fn test_racing_channels_verify_once() {
    let mut engine = engine_with_codes(&["654321"]);
    let alice = principal("alice");
    issue(&mut engine, "alice", 1000, 0);

    let group = Channel::Group(GroupId(42));
    let first = engine.redeem(&alice, &session("alice"), "654321", group, SEC);
    let second = engine.redeem(&alice, &session("alice"), "654321", Channel::Game, SEC);

    assert!(matches!(first, RedeemOutcome::Verified(_)));
    assert_eq!(
        second,
        RedeemOutcome::Failed(VerificationFailure::AlreadyUsed)
    );
}

#[test]
fn test_only_the_redeemed_code_reports_already_used() {
    let mut engine = engine_with_codes(&["654321"]);
    let alice = principal("alice");
    issue(&mut engine, "alice", 1000, 0);

    let outcome = engine.redeem(&alice, &session("alice"), "654321", Channel::Game, SEC);
    assert!(matches!(outcome, RedeemOutcome::Verified(_)));
    assert!(engine.request(&alice).is_none());

    let other = engine.redeem(&alice, &session("alice"), "111111", Channel::Game, 2 * SEC);
    assert_eq!(
        other,
        RedeemOutcome::Failed(VerificationFailure::NoActiveRequest)
    );

    // The spent record lapses with the validity window.
    engine.sweep(62 * SEC);
    let late = engine.redeem(&alice, &session("alice"), "654321", Channel::Game, 62 * SEC);
    assert_eq!(
        late,
        RedeemOutcome::Failed(VerificationFailure::NoActiveRequest)
    );
}

#[test]
fn test_other_session_is_rejected() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    issue(&mut engine, "alice", 1000, 0);

    let outcome = engine.redeem(&alice, &session("intruder"), "123456", Channel::Game, SEC);
    assert_eq!(
        outcome,
        RedeemOutcome::Failed(VerificationFailure::IdentityMismatch)
    );
    assert_eq!(engine.request(&alice).map(|r| r.attempts), Some(0));
}

#[test]
fn test_code_expires_after_validity_window() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    let issued = issue(&mut engine, "alice", 1000, 0);
    assert_eq!(issued.expires_at, 60 * SEC);

    let outcome = engine.redeem(&alice, &session("alice"), "123456", Channel::Game, 60 * SEC + 1);
    assert_eq!(
        outcome,
        RedeemOutcome::Failed(VerificationFailure::Expired {
            ticket: issued.ticket
        })
    );
    assert!(engine.request(&alice).is_none());
}

#[test]
fn test_malformed_code_costs_no_attempt() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    issue(&mut engine, "alice", 1000, 0);

    for input in ["12345", "abcdef", "1234567", ""] {
        assert_eq!(
            engine.redeem(&alice, &session("alice"), input, Channel::Game, SEC),
            RedeemOutcome::Failed(VerificationFailure::InvalidFormat)
        );
    }
    assert_eq!(engine.request(&alice).map(|r| r.attempts), Some(0));
}

#[test]
fn test_redeem_without_request() {
    let mut engine = engine_with_codes(&[]);
    let outcome = engine.redeem(
        &principal("nobody"),
        &session("nobody"),
        "123456",
        Channel::Game,
        0,
    );
    assert_eq!(
        outcome,
        RedeemOutcome::Failed(VerificationFailure::NoActiveRequest)
    );
}

// =============================================================================
// TEST GROUP 2: Issuance and invalidation
// =============================================================================

#[test]
fn test_new_issuance_for_same_remote_invalidates_old() {
    let mut engine = engine_with_codes(&["111111", "222222"]);
    let first = issue(&mut engine, "alice", 1000, 0);
    let second = issue(&mut engine, "bob", 1000, SEC);

    assert_eq!(second.invalidated.len(), 1);
    assert_eq!(second.invalidated[0].ticket, first.ticket);
    assert!(engine.request(&principal("alice")).is_none());
    assert_eq!(
        engine.principal_for_remote(RemoteId(1000)),
        Some(principal("bob"))
    );
    assert_ne!(first.ticket, second.ticket);
}

#[test]
fn test_queued_issuance_is_drained_later() {
    let admission = AdmissionConfig {
        max_concurrent: 1,
        ..AdmissionConfig::default()
    };
    let mut engine = engine_with(admission, &["111111", "222222"]);
    issue(&mut engine, "alice", 1000, 0);

    let queued = engine.issue(&principal("bob"), RemoteId(2000), session("bob"), SEC);
    assert!(matches!(queued, IssueOutcome::Queued(placement) if placement.position == 1));
    assert_eq!(engine.stage(&principal("bob")), Some(BindingStage::Queued));

    engine.redeem(
        &principal("alice"),
        &session("alice"),
        "111111",
        Channel::Game,
        2 * SEC,
    );

    let events = engine.drain_queue(3 * SEC, |_| true);
    assert!(matches!(
        events.as_slice(),
        [DrainEvent::Issued(issued)] if issued.principal == principal("bob") && issued.code == "222222"
    ));
    assert_eq!(engine.stage(&principal("bob")), Some(BindingStage::AwaitingCode));
}

#[test]
fn test_offline_queue_head_is_dropped() {
    let admission = AdmissionConfig {
        max_concurrent: 1,
        ..AdmissionConfig::default()
    };
    let mut engine = engine_with(admission, &[]);
    issue(&mut engine, "alice", 1000, 0);
    engine.issue(&principal("bob"), RemoteId(2000), session("bob"), SEC);

    let events = engine.drain_queue(2 * SEC, |p| p.as_str() != "bob");
    assert!(events.contains(&DrainEvent::Dropped {
        principal: principal("bob"),
        reason: DropReason::Offline,
    }));
    assert_eq!(engine.stage(&principal("bob")), None);
}

// =============================================================================
// TEST GROUP 3: Binding flow
// =============================================================================

#[test]
fn test_full_flow_to_code() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");

    engine.begin(&alice).unwrap();
    assert_eq!(engine.stage(&alice), Some(BindingStage::AwaitingInput));

    let remote = engine
        .submit_remote_id(&alice, " 123456789 ", None, Membership::Member, 0)
        .unwrap();
    assert_eq!(remote, RemoteId(123_456_789));
    assert!(engine.attach_display_name(&alice, remote, "Alice QQ"));
    assert_eq!(
        engine
            .pending_confirmation(&alice)
            .and_then(|p| p.display_name.clone()),
        Some("Alice QQ".to_string())
    );

    assert_eq!(engine.confirmation_for_remote(remote), Some(alice.clone()));
    assert_eq!(engine.confirmation_for_remote(RemoteId(55555)), None);

    let outcome = engine.confirm(&alice, session("alice"), None, SEC).unwrap();
    assert!(matches!(outcome, IssueOutcome::Issued(ref issued) if issued.code == "123456"));
    assert_eq!(engine.begin(&alice), Err(FlowError::VerificationInProgress));
}

#[test]
fn test_submit_rejects_bad_accounts() {
    let mut engine = engine_with_codes(&[]);
    let alice = principal("alice");

    assert!(matches!(
        engine.submit_remote_id(&alice, "0123456", None, Membership::Unknown, 0),
        Err(FlowError::InvalidRemoteId { .. })
    ));
    assert!(matches!(
        engine.submit_remote_id(&alice, "1234", None, Membership::Unknown, 0),
        Err(FlowError::InvalidRemoteId { .. })
    ));
    assert_eq!(
        engine.submit_remote_id(&alice, "12345", Some(&principal("bob")), Membership::Member, 0),
        Err(FlowError::RemoteAlreadyBound {
            remote: RemoteId(12345)
        })
    );
    assert_eq!(
        engine.submit_remote_id(&alice, "12345", None, Membership::NotMember, 0),
        Err(FlowError::NotGroupMember {
            remote: RemoteId(12345)
        })
    );
    // Rebinding the account the principal already holds is allowed.
    assert!(engine
        .submit_remote_id(&alice, "12345", Some(&alice), Membership::Unknown, 0)
        .is_ok());
}

#[test]
fn test_confirmation_expires() {
    let mut engine = engine_with_codes(&[]);
    let alice = principal("alice");
    engine
        .submit_remote_id(&alice, "12345", None, Membership::Member, 0)
        .unwrap();

    assert_eq!(
        engine.confirm(&alice, session("alice"), None, 61 * SEC),
        Err(FlowError::ConfirmationExpired)
    );
    assert_eq!(
        engine.confirm(&alice, session("alice"), None, 62 * SEC),
        Err(FlowError::NoPendingConfirmation)
    );
}

#[test]
fn test_confirm_refuses_account_bound_since_entry() {
    let mut engine = engine_with_codes(&["123456"]);
    let alice = principal("alice");
    engine
        .submit_remote_id(&alice, "12345", None, Membership::Member, 0)
        .unwrap();

    assert_eq!(
        engine.confirm(&alice, session("alice"), Some(&principal("bob")), SEC),
        Err(FlowError::RemoteAlreadyBound {
            remote: RemoteId(12345)
        })
    );
    assert!(engine.pending_confirmation(&alice).is_none());
    assert!(engine.request(&alice).is_none());
    assert_eq!(engine.stage(&alice), None);
}

#[test]
fn test_cancel_starts_principal_cooldown() {
    let mut engine = engine_with_codes(&[]);
    let alice = principal("alice");
    engine
        .submit_remote_id(&alice, "12345", None, Membership::Member, 0)
        .unwrap();

    assert!(engine.cancel(&alice, 0));
    assert!(engine.pending_confirmation(&alice).is_none());

    let outcome = engine.issue(&alice, RemoteId(12345), session("alice"), 30 * SEC);
    assert!(matches!(
        outcome,
        IssueOutcome::Rejected(AdmissionRejection::PrincipalCooldown { remaining_secs: 30 })
    ));
}

// =============================================================================
// TEST GROUP 4: Sweeps and teardown
// =============================================================================

#[test]
fn test_sweep_expires_requests_and_confirmations() {
    let mut engine = engine_with_codes(&[]);
    let issued = issue(&mut engine, "alice", 1000, 0);
    engine
        .submit_remote_id(&principal("bob"), "20000", None, Membership::Member, 0)
        .unwrap();

    assert!(engine.sweep(60 * SEC).is_empty());

    let events = engine.sweep(61 * SEC);
    assert!(events.contains(&SweepEvent::RequestExpired {
        ticket: issued.ticket,
        principal: principal("alice"),
        remote: RemoteId(1000),
    }));
    assert!(events.contains(&SweepEvent::ConfirmationExpired {
        principal: principal("bob"),
    }));
    assert_eq!(engine.stats().live_requests, 0);
}

#[test]
fn test_abandon_and_forget() {
    let mut engine = engine_with_codes(&[]);
    let issued = issue(&mut engine, "alice", 1000, 0);
    issue(&mut engine, "bob", 2000, 0);

    let abandoned = engine.abandon(issued.ticket, SEC).unwrap();
    assert_eq!(abandoned.principal, principal("alice"));
    assert!(engine.abandon(issued.ticket, SEC).is_none());

    assert!(engine.forget_principal(&principal("bob"), SEC).is_some());
    assert_eq!(engine.stats().live_requests, 0);
    assert_eq!(engine.stats().issued_total, 2);
}

#[test]
fn test_principal_for_remote_survives_redemption() {
    let mut engine = engine_with_codes(&["123456"]);
    issue(&mut engine, "alice", 1000, 0);
    engine.redeem(
        &principal("alice"),
        &session("alice"),
        "123456",
        Channel::Game,
        SEC,
    );

    assert_eq!(
        engine.principal_for_remote(RemoteId(1000)),
        Some(principal("alice"))
    );
    engine.sweep(120 * SEC);
    assert_eq!(engine.principal_for_remote(RemoteId(1000)), None);
}
