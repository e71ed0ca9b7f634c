//! # Verification Scenarios
//!
//! The verification engine, its admission controller and the retraction
//! scheduler exercised together, the way the bridge drives them.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use qs_03_admission::{AdmissionConfig, AdmissionRejection};
    use qs_04_verification::{
        BindingStage, IssueOutcome, Issued, RedeemOutcome, ScriptedCodeGenerator,
        VerificationConfig, VerificationEngine, VerificationFailure,
    };
    use qs_05_retraction::{RetractionConfig, RetractionScheduler, Terminal};
    use shared_types::{Channel, GroupId, MessageId, PrincipalId, RemoteId, SessionTag, Timestamp};

    const SEC: Timestamp = 1_000;
    const T0: Timestamp = 10_000_000;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn engine(admission: AdmissionConfig, codes: &[&str]) -> VerificationEngine {
        VerificationEngine::with_generator(
            VerificationConfig::default(),
            admission,
            Box::new(ScriptedCodeGenerator::new(codes.iter().copied())),
        )
    }

    fn session(principal: &PrincipalId) -> SessionTag {
        SessionTag::new(format!("xuid-{principal}"))
    }

    fn issue(engine: &mut VerificationEngine, name: &str, remote: u64, now: Timestamp) -> IssueOutcome {
        let principal = PrincipalId::new(name);
        let tag = session(&principal);
        engine.issue(&principal, RemoteId(remote), tag, now)
    }

    fn issued(outcome: IssueOutcome) -> Issued {
        match outcome {
            IssueOutcome::Issued(issued) => issued,
            other => panic!("expected issuance, got {other:?}"),
        }
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    /// Remote "1000", code "123456", two wrong codes, then the right one.
    #[test]
    fn test_two_wrong_codes_then_verified() {
        let mut engine = engine(AdmissionConfig::default(), &["123456"]);
        let a = PrincipalId::new("A");
        issued(engine.issue(&a, RemoteId(1000), session(&a), T0));

        for (i, wrong) in ["111111", "222222"].into_iter().enumerate() {
            let outcome = engine.redeem(&a, &session(&a), wrong, Channel::Game, T0 + i as u64 * SEC);
            assert!(matches!(outcome, RedeemOutcome::Retry { .. }));
        }

        let outcome = engine.redeem(&a, &session(&a), "123456", Channel::Game, T0 + 5 * SEC);
        let RedeemOutcome::Verified(verified) = outcome else {
            panic!("expected verification, got {outcome:?}");
        };
        assert_eq!(verified.attempts, 2);
        assert_eq!(verified.remote, RemoteId(1000));
        assert!(engine.request(&a).is_none());
        assert_eq!(engine.stage(&a), Some(BindingStage::Bound));
    }

    #[test]
    fn test_queued_third_waits_eight_seconds() {
        let admission = AdmissionConfig {
            max_concurrent: 1,
            wait_per_position_secs: 4,
            ..AdmissionConfig::default()
        };
        let mut engine = engine(admission, &[]);
        issued(issue(&mut engine, "head", 10_001, T0));

        let mut placements = Vec::new();
        for (i, name) in ["X", "Y", "B"].into_iter().enumerate() {
            match issue(&mut engine, name, 20_001 + i as u64, T0) {
                IssueOutcome::Queued(placement) => placements.push(placement),
                other => panic!("expected queueing, got {other:?}"),
            }
        }
        assert_eq!(placements[2].position, 3);
        assert_eq!(placements[2].estimated_wait_secs, 8);
    }

    #[test]
    fn test_twenty_sixth_request_is_queued_first() {
        let mut engine = engine(AdmissionConfig::default(), &[]);
        for i in 0..25 {
            issued(issue(&mut engine, &format!("p{i}"), 10_000 + i, T0));
        }

        match issue(&mut engine, "p25", 10_025, T0) {
            IssueOutcome::Queued(placement) => {
                assert_eq!(placement.position, 1);
                assert!(placement.newly_enqueued);
            }
            other => panic!("expected queueing, got {other:?}"),
        }
        assert_eq!(engine.stats().queued, 1);
        assert_eq!(engine.stats().active, 25);
    }

    #[test]
    fn test_second_issuance_within_a_minute_is_rejected() {
        let mut engine = engine(AdmissionConfig::default(), &[]);
        issued(issue(&mut engine, "A", 10_001, T0));

        match issue(&mut engine, "A", 10_001, T0 + 15 * SEC) {
            IssueOutcome::Rejected(AdmissionRejection::PrincipalCooldown { remaining_secs }) => {
                assert!(remaining_secs > 0 && remaining_secs <= 60);
                assert_eq!(remaining_secs, 45);
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[test]
    fn test_reissue_keeps_one_live_request() {
        let admission = AdmissionConfig {
            principal_cooldown_secs: 0,
            ..AdmissionConfig::default()
        };
        let mut engine = engine(admission, &["111111", "222222"]);
        let a = PrincipalId::new("A");
        let first = issued(issue(&mut engine, "A", 10_001, T0));
        let second = issued(issue(&mut engine, "A", 10_002, T0 + SEC));

        assert_eq!(second.invalidated.len(), 1);
        assert_eq!(second.invalidated[0].ticket, first.ticket);
        assert_eq!(engine.stats().live_requests, 1);
        assert_eq!(engine.request(&a).map(|r| r.ticket), Some(second.ticket));

        let outcome = engine.redeem(&a, &session(&a), "111111", Channel::Game, T0 + 2 * SEC);
        assert!(matches!(outcome, RedeemOutcome::Retry { .. }));
    }

    #[test]
    fn test_two_channel_race_verifies_once() {
        let mut engine = engine(AdmissionConfig::default(), &["123456"]);
        let a = PrincipalId::new("A");
        issued(engine.issue(&a, RemoteId(10_001), session(&a), T0));

        let game = engine.redeem(&a, &session(&a), "123456", Channel::Game, T0 + SEC);
        let group = engine.redeem(
            &a,
            &session(&a),
            "123456",
            Channel::Group(GroupId(100)),
            T0 + SEC,
        );

        assert!(matches!(game, RedeemOutcome::Verified(_)));
        assert!(matches!(
            group,
            RedeemOutcome::Failed(
                VerificationFailure::AlreadyUsed | VerificationFailure::NoActiveRequest
            )
        ));
        assert_eq!(engine.stats().verified_total, 1);
    }

    #[test]
    fn test_expired_code_has_no_side_effects() {
        let mut engine = engine(AdmissionConfig::default(), &["123456"]);
        let a = PrincipalId::new("A");
        let ticket = issued(engine.issue(&a, RemoteId(10_001), session(&a), T0)).ticket;

        let outcome = engine.redeem(&a, &session(&a), "123456", Channel::Game, T0 + 61 * SEC);
        assert_eq!(
            outcome,
            RedeemOutcome::Failed(VerificationFailure::Expired { ticket })
        );

        let again = engine.redeem(&a, &session(&a), "123456", Channel::Game, T0 + 62 * SEC);
        assert!(matches!(again, RedeemOutcome::Failed(_)));
        assert_eq!(engine.stats().verified_total, 0);
    }

    #[test]
    fn test_verified_cancels_both_retraction_timers() {
        let mut engine = engine(AdmissionConfig::default(), &["123456"]);
        let mut retraction = RetractionScheduler::new(RetractionConfig::default());
        let a = PrincipalId::new("A");

        let ticket = issued(engine.issue(&a, RemoteId(10_001), session(&a), T0)).ticket;
        retraction.schedule(ticket, T0);
        assert!(retraction
            .attach_message_id(ticket, MessageId(42), T0 + SEC, T0 + SEC)
            .is_none());

        let outcome = engine.redeem(&a, &session(&a), "123456", Channel::Game, T0 + 10 * SEC);
        assert!(matches!(outcome, RedeemOutcome::Verified(_)));

        let deletes = retraction.on_terminal(ticket, Terminal::Verified, T0 + 10 * SEC);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].message_id, MessageId(42));
        assert_eq!(retraction.timers(ticket).map(|t| t.is_armed()), Some(false));

        retraction.delete_confirmed(MessageId(42));
        for at in [90, 105, 119] {
            assert!(retraction.due(T0 + at * SEC).is_empty());
        }
    }

    proptest! {
        /// `Exhausted` arrives on exactly the third wrong code.
        #[test]
        fn prop_exhausted_exactly_at_third_wrong_code(
            wrong in proptest::collection::vec("[0-9]{6}", 3..6),
        ) {
            let mut engine = engine(AdmissionConfig::default(), &["123456"]);
            let a = PrincipalId::new("A");
            issued(engine.issue(&a, RemoteId(10_001), session(&a), T0));

            let wrong: Vec<String> = wrong.into_iter().filter(|c| c != "123456").collect();
            prop_assume!(wrong.len() >= 3);

            for (i, code) in wrong.iter().take(3).enumerate() {
                let outcome = engine.redeem(&a, &session(&a), code, Channel::Game, T0 + SEC);
                if i < 2 {
                    let expected_remaining = 2 - i as u32;
                    prop_assert!(
                        matches!(outcome, RedeemOutcome::Retry { remaining, .. } if remaining == expected_remaining),
                        "expected Retry with remaining == expected_remaining"
                    );
                } else {
                    let is_exhausted = matches!(
                        outcome,
                        RedeemOutcome::Failed(VerificationFailure::Exhausted { .. })
                    );
                    prop_assert!(is_exhausted);
                }
            }
        }
    }
}
