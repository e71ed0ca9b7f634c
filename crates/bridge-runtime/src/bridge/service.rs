//! Game-facing operations and the shared plumbing behind them.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use qs_01_transport::{FrameSink, TransportError};
use qs_02_correlation::{await_response, CorrelationRegistry, EchoToken, StatsSnapshot};
use qs_04_verification::{
    EngineStats, IssueOutcome, Issued, Membership, RedeemOutcome, SideEffect,
};
use qs_05_retraction::{DeleteRequest, RetractionStats, Terminal};
use qs_06_send_queue::{Delivery, FailureOutcome, SendQueueStats};
use shared_types::{
    secs_until, ActionRequest, CallKind, Channel, GroupId, MessageBody, PrincipalId, RemoteId,
    ResponsePayload, SessionTag, Ticket, TimeSource, Timestamp,
};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::domain::{BridgeState, CallContext, Notice};
use crate::errors::BridgeError;
use crate::ports::{BindingStore, BridgePorts, PrincipalDirectory, PrincipalNotifier};

pub(crate) type Notices = Vec<(PrincipalId, Notice)>;

/// Point-in-time counters across the components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub engine: EngineStats,
    pub send_queue: SendQueueStats,
    pub retraction: RetractionStats,
    pub correlation: StatsSnapshot,
    pub side_effects: usize,
}

/// Everything the bridge does, independent of how it is driven.
///
/// `Bridge` owns one behind an `Arc` and feeds it transport events and
/// timer ticks; tests can drive it directly.
pub struct BridgeService {
    pub(crate) config: BridgeConfig,
    pub(crate) state: Mutex<BridgeState>,
    pub(crate) correlation: CorrelationRegistry<CallContext>,
    pub(crate) sink: Arc<dyn FrameSink>,
    pub(crate) store: Arc<dyn BindingStore>,
    pub(crate) directory: Arc<dyn PrincipalDirectory>,
    pub(crate) notifier: Arc<dyn PrincipalNotifier>,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) startup_notice_sent: AtomicBool,
}

impl BridgeService {
    pub fn new(
        config: BridgeConfig,
        state: BridgeState,
        sink: Arc<dyn FrameSink>,
        ports: BridgePorts,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            correlation: CorrelationRegistry::new(config.correlation.ttl()),
            state: Mutex::new(state),
            config,
            sink,
            store: ports.store,
            directory: ports.directory,
            notifier: ports.notifier,
            clock,
            startup_notice_sent: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // =========================================================================
    // BINDING FLOW
    // =========================================================================

    /// Start binding: the principal is asked for a remote account.
    pub fn request_binding(&self, principal: &PrincipalId) -> Result<(), BridgeError> {
        let result = self.state.lock().engine.begin(principal);
        match result {
            Ok(()) => {
                self.notifier.notify(principal, Notice::PromptRemoteId);
                Ok(())
            }
            Err(err) => {
                self.notifier.notify(principal, Notice::Flow(err.clone()));
                Err(err.into())
            }
        }
    }

    /// Check an entered account, look up its nickname and ask for
    /// confirmation.
    pub async fn submit_remote_id(
        &self,
        principal: &PrincipalId,
        input: &str,
    ) -> Result<RemoteId, BridgeError> {
        let holder = match RemoteId::parse_input(input) {
            Some(remote) => self.store.principal_for(remote).await?,
            None => None,
        };

        let now = self.now();
        let result = {
            let mut state = self.state.lock();
            let membership = RemoteId::parse_input(input)
                .map(|remote| state.membership.membership(remote))
                .unwrap_or(Membership::Unknown);
            state
                .engine
                .submit_remote_id(principal, input, holder.as_ref(), membership, now)
        };

        let remote = match result {
            Ok(remote) => remote,
            Err(err) => {
                self.notifier.notify(principal, Notice::Flow(err.clone()));
                return Err(err.into());
            }
        };

        let display_name = self.lookup_display_name(principal, remote).await;
        self.state
            .lock()
            .engine
            .attach_display_name(principal, remote, display_name.clone());
        self.notifier.notify(
            principal,
            Notice::ConfirmRemote {
                remote,
                display_name,
            },
        );
        Ok(remote)
    }

    /// Platform nickname of `remote`, or the account number when the
    /// lookup fails or times out.
    async fn lookup_display_name(&self, principal: &PrincipalId, remote: RemoteId) -> String {
        let fallback = remote.to_string();
        if !self.sink.is_connected() {
            return fallback;
        }

        let context = CallContext::ProfileLookup {
            principal: principal.clone(),
            remote,
        };
        let (token, rx) = self
            .correlation
            .register_awaiting(context.kind(), context, self.now());
        let action = ActionRequest::GetStrangerInfo {
            user_id: remote,
            no_cache: false,
        };
        if let Err(err) = self.send_frame(&token, action) {
            debug!(remote = %remote, error = %err, "Profile lookup not sent");
            return fallback;
        }

        match await_response(rx, self.config.profile_timeout()).await {
            Ok(response) if response.is_ok() => {
                match ResponsePayload::classify(Some(CallKind::StrangerInfo), &response.data) {
                    ResponsePayload::StrangerInfo(info) if !info.nickname.is_empty() => {
                        info.nickname
                    }
                    _ => fallback,
                }
            }
            Ok(response) => {
                debug!(remote = %remote, reason = %response.failure_reason(), "Profile lookup failed");
                fallback
            }
            Err(err) => {
                self.correlation.cancel(token.as_str());
                debug!(remote = %remote, error = %err, "Profile lookup unanswered");
                fallback
            }
        }
    }

    /// Confirm the entered account and try to issue a code.
    pub async fn confirm(&self, principal: &PrincipalId) -> Result<IssueOutcome, BridgeError> {
        let session = self.session_of(principal)?;
        let pending = self
            .state
            .lock()
            .engine
            .pending_confirmation(principal)
            .map(|pending| pending.remote);
        let holder = match pending {
            Some(remote) => self.store.principal_for(remote).await?,
            None => None,
        };

        let now = self.now();
        let mut notices = Notices::new();

        let result = {
            let mut state = self.state.lock();
            let result = state
                .engine
                .confirm(principal, session, holder.as_ref(), now);
            if let Ok(outcome) = &result {
                self.apply_issue_outcome(&mut state, principal, outcome, now, &mut notices);
            }
            result
        };

        let outcome = result.map_err(|err| {
            notices.push((principal.clone(), Notice::Flow(err.clone())));
            BridgeError::from(err)
        });
        self.deliver(notices);
        outcome
    }

    /// Abort the flow before a code is issued.
    pub fn cancel(&self, principal: &PrincipalId) -> bool {
        let now = self.now();
        let cancelled = self.state.lock().engine.cancel(principal, now);
        if cancelled {
            self.notifier.notify(principal, Notice::Cancelled);
        }
        cancelled
    }

    /// Code typed in game.
    pub async fn redeem_from_game(
        &self,
        principal: &PrincipalId,
        code: &str,
    ) -> Result<RedeemOutcome, BridgeError> {
        let session = self.session_of(principal)?;
        self.redeem(principal, &session, code, Channel::Game).await
    }

    /// Remove the committed binding.
    pub async fn unbind(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, BridgeError> {
        let removed = self.store.remove(principal).await?;
        if let Some(remote) = removed {
            info!(principal = %principal, remote = %remote, "Binding removed");
            self.notifier.notify(principal, Notice::Unbound { remote });
        }
        Ok(removed)
    }

    pub async fn binding_of(&self, principal: &PrincipalId) -> Result<Option<RemoteId>, BridgeError> {
        Ok(self.store.get(principal).await?)
    }

    /// Principal disconnected: drop its flow, queue entry and deliveries.
    pub fn principal_left(&self, principal: &PrincipalId) {
        let now = self.now();
        let mut state = self.state.lock();
        state.send_queue.remove_principal(principal);
        if let Some(request) = state.engine.forget_principal(principal, now) {
            state.send_queue.remove_ticket(request.ticket);
            let deletes = state.retraction.retract_now(request.ticket, now);
            self.send_deletes(&mut state, deletes, now);
            info!(principal = %principal, ticket = %request.ticket, "Verification dropped on disconnect");
        }
    }

    /// Post a game chat line to every configured group. Returns the number
    /// of groups it was sent to.
    pub fn relay_chat(&self, principal: &PrincipalId, text: &str) -> usize {
        if !self.config.relay.enabled || text.trim().is_empty() {
            return 0;
        }
        let line = format!("{} <{}> {}", self.config.relay.game_prefix, principal, text.trim());
        self.config
            .groups
            .iter()
            .filter(|group| self.post_to_group(**group, MessageBody::from(line.as_str())))
            .count()
    }

    pub fn stats(&self) -> BridgeStats {
        let state = self.state.lock();
        BridgeStats {
            engine: state.engine.stats(),
            send_queue: state.send_queue.stats(),
            retraction: state.retraction.stats(),
            correlation: self.correlation.snapshot(),
            side_effects: state.side_effects.len(),
        }
    }

    // =========================================================================
    // REDEMPTION
    // =========================================================================

    /// Redeem a code from either channel and run the consequences.
    pub(crate) async fn redeem(
        &self,
        principal: &PrincipalId,
        session: &SessionTag,
        code: &str,
        channel: Channel,
    ) -> Result<RedeemOutcome, BridgeError> {
        let now = self.now();
        let mut notices = Notices::new();

        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.engine.redeem(principal, session, code, channel, now);
            match &outcome {
                RedeemOutcome::Verified(verified) => {
                    state.send_queue.remove_ticket(verified.ticket);
                    let deletes = state
                        .retraction
                        .on_terminal(verified.ticket, Terminal::Verified, now);
                    self.send_deletes(&mut state, deletes, now);
                    self.queue_side_effects(&mut state, &verified.side_effects, now);
                }
                RedeemOutcome::Retry { remaining, .. } => {
                    notices.push((
                        principal.clone(),
                        Notice::WrongCode {
                            remaining: *remaining,
                        },
                    ));
                }
                RedeemOutcome::Failed(failure) => {
                    if let Some(ticket) = failure.ended_ticket() {
                        self.end_ticket(&mut state, ticket, now);
                    }
                    notices.push((principal.clone(), Notice::Failed(failure.clone())));
                }
            }
            outcome
        };

        if let RedeemOutcome::Verified(verified) = &outcome {
            if let Err(err) = self.store.set(&verified.principal, verified.remote).await {
                error!(
                    principal = %verified.principal,
                    remote = %verified.remote,
                    error = %err,
                    "Verified binding could not be stored"
                );
                self.deliver(notices);
                return Err(err.into());
            }
            notices.push((
                verified.principal.clone(),
                Notice::Bound {
                    remote: verified.remote,
                },
            ));
        }

        self.deliver(notices);
        Ok(outcome)
    }

    fn queue_side_effects(&self, state: &mut BridgeState, effects: &[SideEffect], now: Timestamp) {
        for effect in effects {
            match effect {
                // Handled by the retraction scheduler.
                SideEffect::Retract { .. } => {}
                SideEffect::SyncDisplayName { remote, card } => {
                    for group in state.membership.target_groups(*remote) {
                        state.side_effects.push(
                            ActionRequest::SetGroupCard {
                                group_id: group,
                                user_id: *remote,
                                card: card.clone(),
                            },
                            now,
                        );
                    }
                }
                SideEffect::AnnounceBound { principal, remote } => {
                    for group in state.membership.target_groups(*remote) {
                        state.side_effects.push(
                            ActionRequest::SendGroupMsg {
                                group_id: group,
                                message: MessageBody::mention(
                                    *remote,
                                    format!("is now bound to {principal}"),
                                ),
                            },
                            now,
                        );
                    }
                }
            }
        }
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    pub(crate) fn apply_issue_outcome(
        &self,
        state: &mut BridgeState,
        principal: &PrincipalId,
        outcome: &IssueOutcome,
        now: Timestamp,
        notices: &mut Notices,
    ) {
        match outcome {
            IssueOutcome::Issued(issued) => self.apply_issued(state, issued, now, notices),
            IssueOutcome::Queued(placement) => notices.push((
                principal.clone(),
                Notice::Queued {
                    position: placement.position,
                    estimated_wait_secs: placement.estimated_wait_secs,
                },
            )),
            IssueOutcome::Rejected(rejection) => {
                notices.push((principal.clone(), Notice::Rejected(rejection.clone())))
            }
        }
    }

    /// Clean up superseded tickets, arm retraction and fan out deliveries.
    pub(crate) fn apply_issued(
        &self,
        state: &mut BridgeState,
        issued: &Issued,
        now: Timestamp,
        notices: &mut Notices,
    ) {
        let mut deletes = Vec::new();
        for old in &issued.invalidated {
            state.send_queue.remove_ticket(old.ticket);
            deletes.extend(state.retraction.retract_now(old.ticket, now));
            if old.principal != issued.principal {
                notices.push((old.principal.clone(), Notice::Superseded));
            }
        }
        self.send_deletes(state, deletes, now);

        state.retraction.schedule(issued.ticket, now);
        let groups = state.membership.target_groups(issued.remote);
        for group in &groups {
            state.send_queue.enqueue(Delivery::new(
                issued.ticket,
                issued.principal.clone(),
                issued.remote,
                *group,
                issued.code.clone(),
                now,
            ));
        }

        notices.push((
            issued.principal.clone(),
            Notice::CodeIssued {
                remote: issued.remote,
                expires_in_secs: secs_until(now, issued.expires_at),
                groups: groups.len(),
            },
        ));
    }

    /// A ticket ended without verification: stop its deliveries and
    /// retract what was sent.
    pub(crate) fn end_ticket(&self, state: &mut BridgeState, ticket: Ticket, now: Timestamp) {
        state.send_queue.remove_ticket(ticket);
        let deletes = state.retraction.on_terminal(ticket, Terminal::Failed, now);
        self.send_deletes(state, deletes, now);
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    pub(crate) fn code_message(&self, delivery: &Delivery) -> MessageBody {
        MessageBody::mention(
            delivery.remote,
            format!(
                "verification code for {}: {} (valid {}s, enter it in game or reply here)",
                delivery.principal,
                delivery.code,
                self.config.verification.code_ttl_secs
            ),
        )
    }

    /// Report a failed delivery; abandon the ticket once every group failed.
    pub(crate) fn delivery_failed(
        &self,
        state: &mut BridgeState,
        delivery: Delivery,
        now: Timestamp,
        notices: &mut Notices,
    ) {
        match state.send_queue.report_failure(delivery, now) {
            FailureOutcome::Requeued { attempt } => {
                debug!(attempt, "Code delivery will be retried");
            }
            FailureOutcome::GaveUp(abandoned) => {
                if abandoned.ticket_exhausted {
                    self.abandon_ticket(state, abandoned.delivery.ticket, now, notices);
                }
            }
            FailureOutcome::Cancelled => {}
        }
    }

    pub(crate) fn abandon_ticket(
        &self,
        state: &mut BridgeState,
        ticket: Ticket,
        now: Timestamp,
        notices: &mut Notices,
    ) {
        if let Some(request) = state.engine.abandon(ticket, now) {
            notices.push((request.principal, Notice::DeliveryFailed));
        }
        self.end_ticket(state, ticket, now);
    }

    pub(crate) fn send_deletes(
        &self,
        state: &mut BridgeState,
        deletes: Vec<DeleteRequest>,
        now: Timestamp,
    ) {
        let mut pending: VecDeque<DeleteRequest> = deletes.into();
        while let Some(delete) = pending.pop_front() {
            let context = CallContext::DeleteMessage {
                ticket: delete.ticket,
                message_id: delete.message_id,
            };
            let action = ActionRequest::DeleteMsg {
                message_id: delete.message_id,
            };
            if let Err(err) = self.dispatch(action, context, now) {
                debug!(message_id = %delete.message_id, error = %err, "Delete not sent");
                if let Some(retry) = state.retraction.delete_failed(delete.message_id, now) {
                    pending.push_back(retry);
                }
            }
        }
    }

    // =========================================================================
    // OUTBOUND PLUMBING
    // =========================================================================

    /// Register `context` and send `action` tagged with its echo token.
    pub(crate) fn dispatch(
        &self,
        action: ActionRequest,
        context: CallContext,
        now: Timestamp,
    ) -> Result<EchoToken, TransportError> {
        let token = self.correlation.register(context.kind(), context, now);
        self.send_frame(&token, action)?;
        Ok(token)
    }

    fn send_frame(&self, token: &EchoToken, action: ActionRequest) -> Result<(), TransportError> {
        let frame = action.into_frame(Some(token.as_str().to_string()));
        self.sink.send(&frame).inspect_err(|_| {
            self.correlation.cancel(token.as_str());
        })
    }

    /// Fire-and-forget group message. Returns whether it was sent.
    pub(crate) fn post_to_group(&self, group: GroupId, message: MessageBody) -> bool {
        let action = ActionRequest::SendGroupMsg {
            group_id: group,
            message,
        };
        match self.dispatch(action, CallContext::GroupMessage { group }, self.now()) {
            Ok(_) => true,
            Err(err) => {
                debug!(group = %group, error = %err, "Group message not sent");
                false
            }
        }
    }

    fn session_of(&self, principal: &PrincipalId) -> Result<SessionTag, BridgeError> {
        self.directory
            .session_tag(principal)
            .ok_or_else(|| BridgeError::PrincipalOffline {
                principal: principal.clone(),
            })
    }

    pub(crate) fn deliver(&self, notices: Notices) {
        for (principal, notice) in notices {
            if matches!(notice, Notice::DeliveryFailed | Notice::Superseded) {
                warn!(principal = %principal, %notice, "Verification ended");
            }
            self.notifier.notify(&principal, notice);
        }
    }
}
