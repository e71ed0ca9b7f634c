//! # Response Classification
//!
//! Replies only carry `data`; what that data *is* depends on the call that
//! produced it. The echo token's prefix names the call kind. When a reply has
//! no usable echo (some implementations drop it for list calls) the payload
//! shape decides instead. Either way the result is a `ResponsePayload`, and
//! handlers match on that type rather than on JSON keys.

use crate::entities::{GroupId, MessageId, RemoteId};
use serde::Deserialize;
use serde_json::Value;

/// Kind of outbound call, encoded as the echo token prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `send_group_msg` carrying a one-time code.
    CodeDelivery,
    /// Any other `send_group_msg` (announcements, replies, relay).
    GroupMessage,
    DeleteMessage,
    SetGroupCard,
    MemberList,
    StrangerInfo,
}

impl CallKind {
    pub const ALL: [CallKind; 6] = [
        CallKind::CodeDelivery,
        CallKind::GroupMessage,
        CallKind::DeleteMessage,
        CallKind::SetGroupCard,
        CallKind::MemberList,
        CallKind::StrangerInfo,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            CallKind::CodeDelivery => "code_delivery",
            CallKind::GroupMessage => "send_group_msg",
            CallKind::DeleteMessage => "delete_msg",
            CallKind::SetGroupCard => "set_group_card",
            CallKind::MemberList => "get_group_member_list",
            CallKind::StrangerInfo => "get_stranger_info",
        }
    }

    /// Recover the kind from an echo token of the form `<prefix>:<id>`.
    pub fn from_echo(echo: &str) -> Option<Self> {
        let (prefix, _) = echo.split_once(':')?;
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

/// One row of a `get_group_member_list` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemberInfo {
    pub user_id: RemoteId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
}

/// `get_stranger_info` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrangerInfo {
    pub user_id: RemoteId,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
struct MessageSentData {
    message_id: MessageId,
}

/// Typed view of a reply's `data`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    MessageSent { message_id: MessageId },
    MemberList(Vec<MemberInfo>),
    StrangerInfo(StrangerInfo),
    /// `null` or an empty object, as returned by delete / set-card calls.
    Empty,
    Unrecognized(Value),
}

impl ResponsePayload {
    /// Classify `data`, trusting `hint` (from the echo prefix) when present.
    pub fn classify(hint: Option<CallKind>, data: &Value) -> Self {
        match hint {
            Some(CallKind::CodeDelivery | CallKind::GroupMessage) => Self::as_message_sent(data),
            Some(CallKind::MemberList) => Self::as_member_list(data),
            Some(CallKind::StrangerInfo) => Self::as_stranger_info(data),
            Some(CallKind::DeleteMessage | CallKind::SetGroupCard) => {
                if Self::is_empty(data) {
                    ResponsePayload::Empty
                } else {
                    ResponsePayload::Unrecognized(data.clone())
                }
            }
            None => Self::by_shape(data),
        }
    }

    fn by_shape(data: &Value) -> Self {
        if Self::is_empty(data) {
            return ResponsePayload::Empty;
        }
        match data {
            Value::Array(_) => Self::as_member_list(data),
            Value::Object(object) if object.contains_key("message_id") => {
                Self::as_message_sent(data)
            }
            Value::Object(object)
                if object.contains_key("user_id") && object.contains_key("nickname") =>
            {
                Self::as_stranger_info(data)
            }
            _ => ResponsePayload::Unrecognized(data.clone()),
        }
    }

    fn is_empty(data: &Value) -> bool {
        match data {
            Value::Null => true,
            Value::Object(object) => object.is_empty(),
            _ => false,
        }
    }

    fn as_message_sent(data: &Value) -> Self {
        match MessageSentData::deserialize(data) {
            Ok(sent) => ResponsePayload::MessageSent {
                message_id: sent.message_id,
            },
            Err(_) => ResponsePayload::Unrecognized(data.clone()),
        }
    }

    fn as_member_list(data: &Value) -> Self {
        match Vec::<MemberInfo>::deserialize(data) {
            Ok(members) => ResponsePayload::MemberList(members),
            Err(_) => ResponsePayload::Unrecognized(data.clone()),
        }
    }

    fn as_stranger_info(data: &Value) -> Self {
        match StrangerInfo::deserialize(data) {
            Ok(info) => ResponsePayload::StrangerInfo(info),
            Err(_) => ResponsePayload::Unrecognized(data.clone()),
        }
    }
}
