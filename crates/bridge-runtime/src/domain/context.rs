//! Metadata carried by every correlated call.

use qs_06_send_queue::Delivery;
use shared_types::{ActionRequest, CallKind, GroupId, MessageId, PrincipalId, RemoteId, Ticket, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallContext {
    CodeDelivery {
        delivery: Delivery,
        sent_at: Timestamp,
    },
    DeleteMessage {
        ticket: Ticket,
        message_id: MessageId,
    },
    SideEffect {
        task_id: u64,
        kind: CallKind,
    },
    MemberList {
        group: GroupId,
    },
    ProfileLookup {
        principal: PrincipalId,
        remote: RemoteId,
    },
    /// Relay lines, group feedback and notices. Fire and forget.
    GroupMessage {
        group: GroupId,
    },
}

impl CallContext {
    pub fn kind(&self) -> CallKind {
        match self {
            CallContext::CodeDelivery { .. } => CallKind::CodeDelivery,
            CallContext::DeleteMessage { .. } => CallKind::DeleteMessage,
            CallContext::SideEffect { kind, .. } => *kind,
            CallContext::MemberList { .. } => CallKind::MemberList,
            CallContext::ProfileLookup { .. } => CallKind::StrangerInfo,
            CallContext::GroupMessage { .. } => CallKind::GroupMessage,
        }
    }

    /// Context for a queued side-effect call.
    pub fn side_effect(task_id: u64, action: &ActionRequest) -> Self {
        let kind = match action {
            ActionRequest::SendGroupMsg { .. } => CallKind::GroupMessage,
            ActionRequest::DeleteMsg { .. } => CallKind::DeleteMessage,
            ActionRequest::SetGroupCard { .. } => CallKind::SetGroupCard,
            ActionRequest::GetGroupMemberList { .. } => CallKind::MemberList,
            ActionRequest::GetStrangerInfo { .. } => CallKind::StrangerInfo,
        };
        CallContext::SideEffect { task_id, kind }
    }
}
