//! Verification engine implementation.

use std::collections::HashMap;

use qs_03_admission::{AdmissionConfig, AdmissionController, AdmissionDecision};
use shared_types::{Channel, PrincipalId, RemoteId, SessionTag, Ticket, Timestamp};
use tracing::{debug, info, warn};

use crate::code::{is_well_formed, CodeGenerator, RandomCodeGenerator};
use crate::config::VerificationConfig;
use crate::errors::{FlowError, VerificationFailure};
use crate::outcome::{
    DrainEvent, EngineStats, Invalidated, IssueOutcome, Issued, Membership, RedeemOutcome,
    SideEffect, SweepEvent, Verified,
};
use crate::request::{BindingStage, PendingConfirmation, SpentCode, VerificationRequest};

/// Binding flow, live codes and the admission controller that gates them.
pub struct VerificationEngine {
    config: VerificationConfig,
    admission: AdmissionController,
    generator: Box<dyn CodeGenerator>,
    requests: HashMap<PrincipalId, VerificationRequest>,
    /// Reverse index: remote account to the principal holding its live request.
    by_remote: HashMap<RemoteId, PrincipalId>,
    confirmations: HashMap<PrincipalId, PendingConfirmation>,
    /// Session tags of principals waiting in the admission queue.
    queued_sessions: HashMap<PrincipalId, SessionTag>,
    stages: HashMap<PrincipalId, BindingStage>,
    spent: HashMap<PrincipalId, SpentCode>,
    next_ticket: u64,
    issued_total: u64,
    verified_total: u64,
}

impl VerificationEngine {
    pub fn new(config: VerificationConfig, admission: AdmissionConfig) -> Self {
        Self::with_generator(config, admission, Box::new(RandomCodeGenerator))
    }

    pub fn with_generator(
        config: VerificationConfig,
        admission: AdmissionConfig,
        generator: Box<dyn CodeGenerator>,
    ) -> Self {
        Self {
            config,
            admission: AdmissionController::new(admission),
            generator,
            requests: HashMap::new(),
            by_remote: HashMap::new(),
            confirmations: HashMap::new(),
            queued_sessions: HashMap::new(),
            stages: HashMap::new(),
            spent: HashMap::new(),
            next_ticket: 1,
            issued_total: 0,
            verified_total: 0,
        }
    }

    // =========================================================================
    // BINDING FLOW
    // =========================================================================

    /// Start (or restart) the flow: the principal is asked for an account.
    pub fn begin(&mut self, principal: &PrincipalId) -> Result<(), FlowError> {
        if self.requests.contains_key(principal) || self.queued_sessions.contains_key(principal) {
            return Err(FlowError::VerificationInProgress);
        }
        self.confirmations.remove(principal);
        self.stages
            .insert(principal.clone(), BindingStage::AwaitingInput);
        Ok(())
    }

    /// Validate an entered account and hold it for confirmation.
    ///
    /// `holder` is whoever the binding store says owns the account today.
    pub fn submit_remote_id(
        &mut self,
        principal: &PrincipalId,
        input: &str,
        holder: Option<&PrincipalId>,
        membership: Membership,
        now: Timestamp,
    ) -> Result<RemoteId, FlowError> {
        let remote = RemoteId::parse_input(input).ok_or_else(|| FlowError::InvalidRemoteId {
            input: input.trim().to_string(),
        })?;

        if holder.is_some_and(|owner| owner != principal) {
            return Err(FlowError::RemoteAlreadyBound { remote });
        }
        if membership == Membership::NotMember {
            return Err(FlowError::NotGroupMember { remote });
        }

        self.confirmations.insert(
            principal.clone(),
            PendingConfirmation {
                principal: principal.clone(),
                remote,
                display_name: None,
                created_at: now,
            },
        );
        self.stages
            .insert(principal.clone(), BindingStage::AwaitingConfirmation);
        debug!(principal = %principal, remote = %remote, "Account awaiting confirmation");
        Ok(remote)
    }

    /// Attach the profile nickname to a pending confirmation for `remote`.
    pub fn attach_display_name(
        &mut self,
        principal: &PrincipalId,
        remote: RemoteId,
        name: impl Into<String>,
    ) -> bool {
        match self.confirmations.get_mut(principal) {
            Some(pending) if pending.remote == remote => {
                pending.display_name = Some(name.into());
                true
            }
            _ => false,
        }
    }

    /// Confirm the held account and try to issue a code for it.
    ///
    /// `holder` is re-read from the binding store: the account may have been
    /// bound elsewhere since it was entered.
    pub fn confirm(
        &mut self,
        principal: &PrincipalId,
        session: SessionTag,
        holder: Option<&PrincipalId>,
        now: Timestamp,
    ) -> Result<IssueOutcome, FlowError> {
        let pending = self
            .confirmations
            .remove(principal)
            .ok_or(FlowError::NoPendingConfirmation)?;

        if now.saturating_sub(pending.created_at) > self.config.confirmation_ttl_ms() {
            self.stages.remove(principal);
            return Err(FlowError::ConfirmationExpired);
        }
        if holder.is_some_and(|owner| owner != principal) {
            self.stages.remove(principal);
            return Err(FlowError::RemoteAlreadyBound {
                remote: pending.remote,
            });
        }

        Ok(self.issue(principal, pending.remote, session, now))
    }

    /// Abort the flow. Starts the principal cooldown.
    pub fn cancel(&mut self, principal: &PrincipalId, now: Timestamp) -> bool {
        let had_confirmation = self.confirmations.remove(principal).is_some();
        let was_queued = self.queued_sessions.remove(principal).is_some();
        if was_queued {
            self.admission.forget_principal(principal);
        }
        self.stages.remove(principal);
        self.admission.record_cancellation(principal, now);
        had_confirmation || was_queued
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    /// Issue a code if admission allows, otherwise queue or reject.
    pub fn issue(
        &mut self,
        principal: &PrincipalId,
        remote: RemoteId,
        session: SessionTag,
        now: Timestamp,
    ) -> IssueOutcome {
        match self.admission.can_issue(principal, remote, now) {
            AdmissionDecision::Allow => {
                IssueOutcome::Issued(self.issue_admitted(principal, remote, session, now))
            }
            AdmissionDecision::Queued(placement) => {
                self.queued_sessions.insert(principal.clone(), session);
                self.stages.insert(principal.clone(), BindingStage::Queued);
                IssueOutcome::Queued(placement)
            }
            AdmissionDecision::Rejected(rejection) => IssueOutcome::Rejected(rejection),
        }
    }

    /// Admit queue heads and issue their codes.
    pub fn drain_queue<F>(&mut self, now: Timestamp, is_online: F) -> Vec<DrainEvent>
    where
        F: Fn(&PrincipalId) -> bool,
    {
        let outcome = self.admission.drain(now, is_online);
        let mut events = Vec::new();

        for (entry, reason) in outcome.dropped {
            self.queued_sessions.remove(&entry.principal);
            self.stages.remove(&entry.principal);
            events.push(DrainEvent::Dropped {
                principal: entry.principal,
                reason,
            });
        }

        for entry in outcome.admitted {
            let Some(session) = self.queued_sessions.remove(&entry.principal) else {
                warn!(principal = %entry.principal, "Admitted queue entry without a session");
                continue;
            };
            let issued = self.issue_admitted(&entry.principal, entry.remote, session, now);
            events.push(DrainEvent::Issued(issued));
        }

        events.extend(outcome.notices.into_iter().map(DrainEvent::Position));
        events
    }

    fn issue_admitted(
        &mut self,
        principal: &PrincipalId,
        remote: RemoteId,
        session: SessionTag,
        now: Timestamp,
    ) -> Issued {
        let mut invalidated = Vec::new();

        if let Some(old) = self.remove_request(principal) {
            self.admission.unregister(principal, old.remote, true, now);
            invalidated.push(Invalidated {
                ticket: old.ticket,
                principal: old.principal,
                remote: old.remote,
            });
        }

        if let Some(other) = self.by_remote.get(&remote).cloned() {
            if let Some(old) = self.remove_request(&other) {
                self.admission.unregister(&other, remote, true, now);
                self.stages.remove(&other);
                invalidated.push(Invalidated {
                    ticket: old.ticket,
                    principal: old.principal,
                    remote: old.remote,
                });
            }
        }

        self.queued_sessions.remove(principal);
        self.spent.remove(principal);

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        let code = self.generator.generate();

        self.requests.insert(
            principal.clone(),
            VerificationRequest {
                ticket,
                principal: principal.clone(),
                remote,
                code: code.clone(),
                created_at: now,
                attempts: 0,
                used: false,
                session_tag: session,
            },
        );
        self.by_remote.insert(remote, principal.clone());
        self.admission.register(principal, remote, now);
        self.stages
            .insert(principal.clone(), BindingStage::AwaitingCode);
        self.issued_total += 1;

        info!(
            principal = %principal,
            remote = %remote,
            ticket = %ticket,
            invalidated = invalidated.len(),
            "Verification code issued"
        );

        Issued {
            ticket,
            principal: principal.clone(),
            remote,
            code,
            created_at: now,
            expires_at: now + self.config.code_ttl_ms(),
            invalidated,
        }
    }

    // =========================================================================
    // REDEMPTION
    // =========================================================================

    /// Check a submitted code. Works identically for every channel.
    pub fn redeem(
        &mut self,
        principal: &PrincipalId,
        session: &SessionTag,
        submitted: &str,
        channel: Channel,
        now: Timestamp,
    ) -> RedeemOutcome {
        let submitted = submitted.trim();
        let ttl = self.config.code_ttl_ms();
        let max_attempts = self.config.max_attempts;

        let Some(request) = self.requests.get_mut(principal) else {
            return RedeemOutcome::Failed(self.spent_failure(principal, submitted, now));
        };

        if &request.session_tag != session {
            warn!(principal = %principal, %channel, "Redemption from a different session");
            return RedeemOutcome::Failed(VerificationFailure::IdentityMismatch);
        }

        let ticket = request.ticket;
        let remote = request.remote;

        if now.saturating_sub(request.created_at) > ttl {
            self.end_request(principal, false, now);
            info!(principal = %principal, ticket = %ticket, "Redemption after expiry");
            return RedeemOutcome::Failed(VerificationFailure::Expired { ticket });
        }

        if !is_well_formed(submitted) {
            return RedeemOutcome::Failed(VerificationFailure::InvalidFormat);
        }

        if request.code != submitted {
            request.attempts += 1;
            let attempts = request.attempts;
            if attempts >= max_attempts {
                self.end_request(principal, false, now);
                info!(principal = %principal, ticket = %ticket, "Verification exhausted");
                return RedeemOutcome::Failed(VerificationFailure::Exhausted {
                    ticket,
                    remote,
                    cooldown_secs: self.admission.config().remote_cooldown_secs,
                });
            }
            debug!(principal = %principal, attempts, "Wrong verification code");
            return RedeemOutcome::Retry {
                ticket,
                remaining: max_attempts - attempts,
            };
        }

        let attempts = request.attempts;
        let session_tag = request.session_tag.clone();

        let Some(mut request) = self.end_request(principal, true, now) else {
            return RedeemOutcome::Failed(VerificationFailure::NoActiveRequest);
        };
        request.used = true;
        self.spent.insert(
            principal.clone(),
            SpentCode {
                request,
                spent_at: now,
            },
        );
        self.stages.insert(principal.clone(), BindingStage::Bound);
        self.verified_total += 1;

        let mut side_effects = vec![SideEffect::Retract { ticket }];
        if self.config.sync_display_name {
            side_effects.push(SideEffect::SyncDisplayName {
                remote,
                card: principal.to_string(),
            });
        }
        side_effects.push(SideEffect::AnnounceBound {
            principal: principal.clone(),
            remote,
        });

        info!(
            principal = %principal,
            remote = %remote,
            ticket = %ticket,
            %channel,
            "Verification succeeded"
        );

        RedeemOutcome::Verified(Verified {
            ticket,
            principal: principal.clone(),
            remote,
            session_tag,
            channel,
            attempts,
            side_effects,
        })
    }

    fn spent_failure(
        &self,
        principal: &PrincipalId,
        submitted: &str,
        now: Timestamp,
    ) -> VerificationFailure {
        match self.spent.get(principal) {
            Some(spent)
                if spent.rejects(submitted)
                    && now.saturating_sub(spent.spent_at) <= self.config.code_ttl_ms() =>
            {
                VerificationFailure::AlreadyUsed
            }
            _ => VerificationFailure::NoActiveRequest,
        }
    }

    // =========================================================================
    // TEARDOWN
    // =========================================================================

    /// Expire requests, confirmations, tombstones and queue entries.
    pub fn sweep(&mut self, now: Timestamp) -> Vec<SweepEvent> {
        let mut events = Vec::new();
        let ttl = self.config.code_ttl_ms();

        let expired: Vec<PrincipalId> = self
            .requests
            .values()
            .filter(|request| now.saturating_sub(request.created_at) > ttl)
            .map(|request| request.principal.clone())
            .collect();
        for principal in expired {
            if let Some(request) = self.end_request(&principal, false, now) {
                events.push(SweepEvent::RequestExpired {
                    ticket: request.ticket,
                    principal: request.principal,
                    remote: request.remote,
                });
            }
        }

        let confirmation_ttl = self.config.confirmation_ttl_ms();
        let stale: Vec<PrincipalId> = self
            .confirmations
            .values()
            .filter(|pending| now.saturating_sub(pending.created_at) > confirmation_ttl)
            .map(|pending| pending.principal.clone())
            .collect();
        for principal in stale {
            self.confirmations.remove(&principal);
            self.stages.remove(&principal);
            events.push(SweepEvent::ConfirmationExpired { principal });
        }

        self.spent
            .retain(|_, spent| now.saturating_sub(spent.spent_at) <= ttl);

        for entry in self.admission.prune(now) {
            self.queued_sessions.remove(&entry.principal);
            self.stages.remove(&entry.principal);
            events.push(SweepEvent::QueueExpired {
                principal: entry.principal,
            });
        }

        if !events.is_empty() {
            debug!(events = events.len(), "Verification sweep");
        }
        events
    }

    /// Delivery gave up on `ticket`: drop its request as a failure.
    pub fn abandon(&mut self, ticket: Ticket, now: Timestamp) -> Option<VerificationRequest> {
        let principal = self
            .requests
            .values()
            .find(|request| request.ticket == ticket)
            .map(|request| request.principal.clone())?;
        let request = self.end_request(&principal, false, now)?;
        warn!(principal = %principal, ticket = %ticket, "Verification abandoned");
        Some(request)
    }

    /// Principal left the game: drop everything held for it.
    pub fn forget_principal(
        &mut self,
        principal: &PrincipalId,
        now: Timestamp,
    ) -> Option<VerificationRequest> {
        self.confirmations.remove(principal);
        self.queued_sessions.remove(principal);
        self.admission.forget_principal(principal);
        self.spent.remove(principal);
        let request = self.end_request(principal, false, now);
        self.stages.remove(principal);
        request
    }

    /// Remove a live request and release its admission slot.
    fn end_request(
        &mut self,
        principal: &PrincipalId,
        success: bool,
        now: Timestamp,
    ) -> Option<VerificationRequest> {
        let request = self.remove_request(principal)?;
        self.admission
            .unregister(principal, request.remote, success, now);
        if !success {
            self.stages.remove(principal);
        }
        Some(request)
    }

    fn remove_request(&mut self, principal: &PrincipalId) -> Option<VerificationRequest> {
        let request = self.requests.remove(principal)?;
        if self.by_remote.get(&request.remote) == Some(principal) {
            self.by_remote.remove(&request.remote);
        }
        Some(request)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn request(&self, principal: &PrincipalId) -> Option<&VerificationRequest> {
        self.requests.get(principal)
    }

    pub fn pending_confirmation(&self, principal: &PrincipalId) -> Option<&PendingConfirmation> {
        self.confirmations.get(principal)
    }

    /// Principal holding `remote` for confirmation.
    pub fn confirmation_for_remote(&self, remote: RemoteId) -> Option<PrincipalId> {
        self.confirmations
            .values()
            .find(|pending| pending.remote == remote)
            .map(|pending| pending.principal.clone())
    }

    pub fn stage(&self, principal: &PrincipalId) -> Option<BindingStage> {
        self.stages.get(principal).copied()
    }

    /// Principal whose code for `remote` is live or was just redeemed.
    pub fn principal_for_remote(&self, remote: RemoteId) -> Option<PrincipalId> {
        if let Some(principal) = self.by_remote.get(&remote) {
            return Some(principal.clone());
        }
        self.spent
            .iter()
            .find(|(_, spent)| spent.request.remote == remote)
            .map(|(principal, _)| principal.clone())
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        let admission = self.admission.stats();
        EngineStats {
            live_requests: self.requests.len(),
            pending_confirmations: self.confirmations.len(),
            queued: admission.queued,
            active: admission.active,
            issued_total: self.issued_total,
            verified_total: self.verified_total,
        }
    }
}
