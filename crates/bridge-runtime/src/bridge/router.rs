//! Inbound frame routing.
//!
//! ```text
//! frame ─parse─┬─ Response ─echo─▶ CorrelationRegistry ─▶ CallContext handler
//!              │     └─ no echo ─▶ payload shape ─▶ oldest matching call
//!              │                                  | membership / nickname
//!              ├─ Event::Message ─▶ group command (redeem) | chat relay
//!              ├─ Event::Notice ──▶ membership cache
//!              └─ meta / request / unknown ─▶ logged
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use qs_02_correlation::Resolution;
use qs_04_verification::{is_well_formed, RedeemOutcome};
use shared_types::{
    ActionRequest, ApiResponse, CallKind, Channel, Event, GroupId, InboundFrame, MemberInfo,
    MessageBody, MessageEvent, NoticeEvent, NoticeKind, RemoteId, ResponsePayload,
};
use tracing::{debug, info, warn};

use super::service::{BridgeService, Notices};
use crate::domain::CallContext;

const VERIFY_COMMAND: &str = "/verify";

/// A code posted in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCommand<'a> {
    /// The whole message is six digits. Only answered for accounts with a
    /// live code; anyone else may just be posting a number.
    BareCode(&'a str),
    /// `/verify <code>`, always answered.
    Verify(&'a str),
}

impl<'a> GroupCommand<'a> {
    pub fn code(&self) -> &'a str {
        match self {
            GroupCommand::BareCode(code) | GroupCommand::Verify(code) => *code,
        }
    }
}

pub fn parse_group_command(text: &str) -> Option<GroupCommand<'_>> {
    let text = text.trim();
    if is_well_formed(text) {
        return Some(GroupCommand::BareCode(text));
    }
    let rest = text.strip_prefix(VERIFY_COMMAND)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(GroupCommand::Verify(rest.trim()))
}

impl BridgeService {
    /// Handle one text frame from the transport.
    pub async fn handle_frame(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(InboundFrame::Response(response)) => self.on_response(response),
            Ok(InboundFrame::Event(event)) => self.on_event(event).await,
            Ok(InboundFrame::Unknown(value)) => {
                debug!(frame = %value, "Unhandled frame");
            }
            Err(err) => warn!(error = %err, "Malformed frame dropped"),
        }
    }

    /// Connection (re)established: refresh member lists and post the
    /// startup notice once per process.
    pub fn on_connected(&self) {
        let now = self.now();
        for group in &self.config.groups {
            let action = ActionRequest::GetGroupMemberList { group_id: *group };
            if let Err(err) = self.dispatch(action, CallContext::MemberList { group: *group }, now) {
                warn!(group = %group, error = %err, "Member list request not sent");
            }
        }

        if let Some(text) = &self.config.startup_notice {
            if !self.startup_notice_sent.swap(true, Ordering::SeqCst) {
                for group in &self.config.groups {
                    self.post_to_group(*group, MessageBody::from(text.as_str()));
                }
            }
        }
        info!(groups = self.config.groups.len(), "Bridge connected");
    }

    // =========================================================================
    // RESPONSES
    // =========================================================================

    fn on_response(&self, response: ApiResponse) {
        let echo = match response.echo() {
            Some(echo) => echo.to_string(),
            None => match self.match_echoless(&response) {
                Some(token) => token,
                None => {
                    self.apply_uncorrelated(&response);
                    return;
                }
            },
        };
        let now = self.now();
        let call = match self.correlation.resolve(&echo, &response, now) {
            Resolution::Resolved(call) => call,
            Resolution::Duplicate | Resolution::Unknown => return,
        };

        let ok = response.is_ok();
        let payload = ResponsePayload::classify(Some(call.kind), &response.data);
        let mut notices = Notices::new();

        {
            let mut state = self.state.lock();
            match call.metadata {
                CallContext::CodeDelivery { delivery, sent_at } => {
                    if !ok {
                        warn!(
                            ticket = %delivery.ticket,
                            group = %delivery.group,
                            reason = %response.failure_reason(),
                            "Code delivery failed"
                        );
                        self.delivery_failed(&mut state, delivery, now, &mut notices);
                    } else if let ResponsePayload::MessageSent { message_id } = payload {
                        state.send_queue.mark_sent(delivery.ticket);
                        let delete = state.retraction.attach_message_id(
                            delivery.ticket,
                            message_id,
                            sent_at,
                            now,
                        );
                        if let Some(delete) = delete {
                            self.send_deletes(&mut state, vec![delete], now);
                        }
                    } else {
                        state.send_queue.mark_sent(delivery.ticket);
                        warn!(ticket = %delivery.ticket, "Delivery reply without message id");
                    }
                }
                CallContext::DeleteMessage { ticket, message_id } => {
                    if ok {
                        state.retraction.delete_confirmed(message_id);
                        debug!(ticket = %ticket, message_id = %message_id, "Code message retracted");
                    } else {
                        debug!(
                            ticket = %ticket,
                            message_id = %message_id,
                            reason = %response.failure_reason(),
                            "Retraction refused"
                        );
                        if let Some(retry) = state.retraction.delete_failed(message_id, now) {
                            self.send_deletes(&mut state, vec![retry], now);
                        }
                    }
                }
                CallContext::SideEffect { task_id, .. } => {
                    if ok {
                        state.side_effects.succeeded(task_id);
                    } else {
                        debug!(task = task_id, reason = %response.failure_reason(), "Side effect failed");
                        state.side_effects.failed(task_id, now);
                    }
                }
                CallContext::MemberList { group } => match payload {
                    ResponsePayload::MemberList(members) if ok => {
                        state.membership.load(group, &members);
                    }
                    _ => warn!(group = %group, reason = %response.failure_reason(), "Member list unavailable"),
                },
                // The awaiting caller already received the reply.
                CallContext::ProfileLookup { .. } => {}
                CallContext::GroupMessage { group } => {
                    if !ok {
                        warn!(group = %group, reason = %response.failure_reason(), "Group message failed");
                    }
                }
            }
        }

        self.deliver(notices);
    }

    /// Pending call an echo-less reply answers, judged by payload shape.
    fn match_echoless(&self, response: &ApiResponse) -> Option<String> {
        if !response.is_ok() {
            return None;
        }
        match ResponsePayload::classify(None, &response.data) {
            ResponsePayload::MemberList(members) => {
                let listed = members.iter().find_map(|member| member.group_id);
                if listed.is_some_and(|group| !self.config.groups.contains(&group)) {
                    return None;
                }
                let group = listed.or_else(|| self.sole_group());
                self.correlation.find_pending(CallKind::MemberList, |context| {
                    matches!(context, CallContext::MemberList { group: pending }
                        if group.map_or(true, |group| group == *pending))
                })
            }
            ResponsePayload::StrangerInfo(info) => {
                self.correlation.find_pending(CallKind::StrangerInfo, |context| {
                    matches!(context, CallContext::ProfileLookup { remote, .. }
                        if *remote == info.user_id)
                })
            }
            _ => None,
        }
    }

    /// Echo-less reply with no call waiting for it.
    fn apply_uncorrelated(&self, response: &ApiResponse) {
        if !response.is_ok() {
            debug!(reason = %response.failure_reason(), "Failed reply without echo ignored");
            return;
        }
        match ResponsePayload::classify(None, &response.data) {
            ResponsePayload::MemberList(members) => {
                let mut by_group: BTreeMap<GroupId, Vec<MemberInfo>> = BTreeMap::new();
                for member in members {
                    let Some(group) = member.group_id.or_else(|| self.sole_group()) else {
                        continue;
                    };
                    if self.config.groups.contains(&group) {
                        by_group.entry(group).or_default().push(member);
                    }
                }
                if by_group.is_empty() {
                    debug!("Member list without a known group ignored");
                    return;
                }
                let mut state = self.state.lock();
                for (group, members) in by_group {
                    state.membership.load(group, &members);
                }
            }
            ResponsePayload::StrangerInfo(info) => {
                let mut state = self.state.lock();
                if let Some(principal) = state.engine.confirmation_for_remote(info.user_id) {
                    if !info.nickname.is_empty() {
                        state
                            .engine
                            .attach_display_name(&principal, info.user_id, info.nickname);
                    }
                }
            }
            payload => debug!(?payload, "Reply without echo ignored"),
        }
    }

    fn sole_group(&self) -> Option<GroupId> {
        match self.config.groups.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    async fn on_event(&self, event: Event) {
        match event {
            Event::Message(message) => self.on_message(message).await,
            Event::Notice(notice) => self.on_notice(notice),
            Event::MetaEvent(meta) => {
                debug!(kind = %meta.meta_event_type, sub_type = ?meta.sub_type, "Meta event");
            }
            Event::Request(request) => {
                info!(
                    kind = %request.request_type,
                    user = ?request.user_id,
                    group = ?request.group_id,
                    "Platform request ignored"
                );
            }
        }
    }

    async fn on_message(&self, message: MessageEvent) {
        let Some(group) = message.group() else {
            return;
        };
        if !self.config.groups.contains(&group) {
            return;
        }

        let text = message.raw_message.trim();
        if let Some(command) = parse_group_command(text) {
            self.redeem_from_group(group, message.user_id, command).await;
            return;
        }

        if !self.config.relay.enabled || text.is_empty() {
            return;
        }
        let bound = match self.store.principal_for(message.user_id).await {
            Ok(bound) => bound,
            Err(err) => {
                warn!(error = %err, "Binding lookup failed for relay");
                None
            }
        };
        let name = match bound {
            Some(principal) => principal.to_string(),
            None => message
                .sender
                .display_name()
                .map(str::to_string)
                .unwrap_or_else(|| message.user_id.to_string()),
        };
        self.notifier.relay_from_group(group, &name, text);
    }

    /// A code posted in a group. The poster's account selects the request.
    pub async fn redeem_from_group(
        &self,
        group: GroupId,
        remote: RemoteId,
        command: GroupCommand<'_>,
    ) {
        let target = {
            let state = self.state.lock();
            state.engine.principal_for_remote(remote).and_then(|principal| {
                let session = self
                    .directory
                    .session_tag(&principal)
                    .or_else(|| state.engine.request(&principal).map(|r| r.session_tag.clone()))?;
                Some((principal, session))
            })
        };

        let Some((principal, session)) = target else {
            if let GroupCommand::Verify(_) = command {
                self.post_to_group(
                    group,
                    MessageBody::mention(remote, "you have no pending verification"),
                );
            }
            return;
        };

        let reply = match self
            .redeem(&principal, &session, command.code(), Channel::Group(group))
            .await
        {
            Ok(RedeemOutcome::Verified(verified)) => {
                format!("verified, bound to {}", verified.principal)
            }
            Ok(RedeemOutcome::Retry { remaining, .. }) => {
                format!("wrong code, {remaining} attempt(s) left")
            }
            Ok(RedeemOutcome::Failed(failure)) => failure.to_string(),
            Err(err) => {
                warn!(group = %group, remote = %remote, error = %err, "Group redemption failed");
                "verification failed, please try again".to_string()
            }
        };
        self.post_to_group(group, MessageBody::mention(remote, reply));
    }

    fn on_notice(&self, notice: NoticeEvent) {
        let (Some(group), Some(remote)) = (notice.group_id, notice.user_id) else {
            return;
        };
        let mut state = self.state.lock();
        match notice.kind() {
            NoticeKind::MemberJoined => {
                state.membership.joined(group, remote);
                debug!(group = %group, remote = %remote, "Member joined");
            }
            NoticeKind::MemberLeft => {
                state.membership.left(group, remote);
                debug!(group = %group, remote = %remote, "Member left");
            }
            NoticeKind::Other => {}
        }
    }
}
