//! # OneBot v11 Wire Frames
//!
//! Every frame on the connection is one JSON object.
//!
//! ```text
//! outbound action   {"action": "send_group_msg", "params": {...}, "echo": "code:0190..."}
//! inbound response  {"status": "ok", "retcode": 0, "data": {...}, "echo": "code:0190..."}
//! inbound event     {"post_type": "message" | "notice" | "meta_event" | "request", ...}
//! heartbeat         {}
//! ```

use crate::entities::{GroupId, MessageId, RemoteId};
use crate::errors::FrameError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// =============================================================================
// OUTBOUND
// =============================================================================

/// One segment of a structured message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Mention a member. `qq` is the account number or `"all"`.
    At { qq: String },
    /// Plain text.
    Text { text: String },
}

impl Segment {
    pub fn at(remote: RemoteId) -> Self {
        Segment::At {
            qq: remote.to_string(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }
}

/// Body of `send_group_msg`: a plain string or a segment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Plain(String),
    Segments(Vec<Segment>),
}

impl MessageBody {
    /// `@remote text`, the shape used for all replies aimed at one member.
    pub fn mention(remote: RemoteId, text: impl Into<String>) -> Self {
        let text = format!(" {}", text.into());
        MessageBody::Segments(vec![Segment::at(remote), Segment::text(text)])
    }
}

impl From<String> for MessageBody {
    fn from(text: String) -> Self {
        MessageBody::Plain(text)
    }
}

impl From<&str> for MessageBody {
    fn from(text: &str) -> Self {
        MessageBody::Plain(text.to_string())
    }
}

/// The subset of platform actions the bridge uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    SendGroupMsg {
        group_id: GroupId,
        message: MessageBody,
    },
    DeleteMsg {
        message_id: MessageId,
    },
    SetGroupCard {
        group_id: GroupId,
        user_id: RemoteId,
        card: String,
    },
    GetGroupMemberList {
        group_id: GroupId,
    },
    GetStrangerInfo {
        user_id: RemoteId,
        no_cache: bool,
    },
}

impl ActionRequest {
    /// Wire name of the action.
    pub fn action(&self) -> &'static str {
        match self {
            ActionRequest::SendGroupMsg { .. } => "send_group_msg",
            ActionRequest::DeleteMsg { .. } => "delete_msg",
            ActionRequest::SetGroupCard { .. } => "set_group_card",
            ActionRequest::GetGroupMemberList { .. } => "get_group_member_list",
            ActionRequest::GetStrangerInfo { .. } => "get_stranger_info",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            ActionRequest::SendGroupMsg { group_id, message } => {
                json!({ "group_id": group_id, "message": message })
            }
            ActionRequest::DeleteMsg { message_id } => json!({ "message_id": message_id }),
            ActionRequest::SetGroupCard {
                group_id,
                user_id,
                card,
            } => json!({ "group_id": group_id, "user_id": user_id, "card": card }),
            ActionRequest::GetGroupMemberList { group_id } => json!({ "group_id": group_id }),
            ActionRequest::GetStrangerInfo { user_id, no_cache } => {
                json!({ "user_id": user_id, "no_cache": no_cache })
            }
        }
    }

    pub fn into_frame(self, echo: Option<String>) -> OutboundFrame {
        OutboundFrame {
            action: self.action(),
            params: self.params(),
            echo,
        }
    }
}

/// A serialized-ready action frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub action: &'static str,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl OutboundFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The keep-alive tick. No reply is expected.
pub const HEARTBEAT_FRAME: &str = "{}";

// =============================================================================
// INBOUND: RESPONSES
// =============================================================================

/// Reply to an action frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    /// Round-tripped as sent; only string echoes are produced by the bridge.
    #[serde(default)]
    pub echo: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok" && self.retcode == 0
    }

    pub fn echo(&self) -> Option<&str> {
        self.echo.as_ref().and_then(Value::as_str)
    }

    /// Human-readable reason for a failed call.
    pub fn failure_reason(&self) -> String {
        self.wording
            .as_deref()
            .or(self.message.as_deref())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("status={} retcode={}", self.status, self.retcode))
    }
}

// =============================================================================
// INBOUND: EVENTS
// =============================================================================

/// Message author as reported by the platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub nickname: Option<String>,
    /// Group-specific display name.
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Sender {
    /// Group card when set, otherwise nickname.
    pub fn display_name(&self) -> Option<&str> {
        self.card
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.nickname.as_deref().filter(|n| !n.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    pub message_type: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub user_id: RemoteId,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

impl MessageEvent {
    /// Group the message was posted in, if it is a group message.
    pub fn group(&self) -> Option<GroupId> {
        if self.message_type == "group" {
            self.group_id
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    MemberJoined,
    MemberLeft,
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoticeEvent {
    pub notice_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub user_id: Option<RemoteId>,
}

impl NoticeEvent {
    pub fn kind(&self) -> NoticeKind {
        match self.notice_type.as_str() {
            "group_increase" => NoticeKind::MemberJoined,
            "group_decrease" => NoticeKind::MemberLeft,
            _ => NoticeKind::Other,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaEvent {
    pub meta_event_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestEvent {
    pub request_type: String,
    #[serde(default)]
    pub user_id: Option<RemoteId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Platform push, discriminated by `post_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Notice(NoticeEvent),
    MetaEvent(MetaEvent),
    Request(RequestEvent),
}

// =============================================================================
// INBOUND: PARSING
// =============================================================================

/// Any frame received from the platform.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Response(ApiResponse),
    Event(Event),
    /// Well-formed JSON the bridge has no handler for.
    Unknown(Value),
}

impl InboundFrame {
    /// Decode one text frame.
    ///
    /// Objects carrying `post_type` are events; objects carrying `status`
    /// or `retcode` are responses. Shapes that fail typed decoding fall back
    /// to `Unknown` rather than erroring, so one odd push never tears down
    /// the connection.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let Some(object) = value.as_object() else {
            return Err(FrameError::NotAnObject);
        };

        if object.contains_key("post_type") {
            return Ok(match serde_json::from_value::<Event>(value.clone()) {
                Ok(event) => InboundFrame::Event(event),
                Err(_) => InboundFrame::Unknown(value),
            });
        }

        if object.contains_key("status") || object.contains_key("retcode") {
            return Ok(match serde_json::from_value::<ApiResponse>(value.clone()) {
                Ok(response) => InboundFrame::Response(response),
                Err(_) => InboundFrame::Unknown(value),
            });
        }

        Ok(InboundFrame::Unknown(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_group_msg_frame_shape() {
        let frame = ActionRequest::SendGroupMsg {
            group_id: GroupId(100),
            message: MessageBody::mention(RemoteId(12345), "hello"),
        }
        .into_frame(Some("code:abc".to_string()));

        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "send_group_msg",
                "params": {
                    "group_id": 100,
                    "message": [
                        {"type": "at", "data": {"qq": "12345"}},
                        {"type": "text", "data": {"text": " hello"}}
                    ]
                },
                "echo": "code:abc"
            })
        );
    }

    #[test]
    fn test_frame_without_echo_omits_field() {
        let frame = ActionRequest::DeleteMsg {
            message_id: MessageId(-7),
        }
        .into_frame(None);
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"action": "delete_msg", "params": {"message_id": -7}}));
    }

    #[test]
    fn test_plain_message_body_serializes_as_string() {
        let params = ActionRequest::SendGroupMsg {
            group_id: GroupId(1),
            message: "online".into(),
        }
        .params();
        assert_eq!(params["message"], json!("online"));
    }

    #[test]
    fn test_stranger_info_params() {
        let params = ActionRequest::GetStrangerInfo {
            user_id: RemoteId(10001),
            no_cache: true,
        }
        .params();
        assert_eq!(params, json!({"user_id": 10001, "no_cache": true}));
    }

    #[test]
    fn test_parse_response() {
        let frame = InboundFrame::parse(
            r#"{"status":"ok","retcode":0,"data":{"message_id":55},"echo":"code:x"}"#,
        )
        .unwrap();
        let InboundFrame::Response(response) = frame else {
            panic!("expected response");
        };
        assert!(response.is_ok());
        assert_eq!(response.echo(), Some("code:x"));
    }

    #[test]
    fn test_failed_response_reason_prefers_wording() {
        let frame = InboundFrame::parse(
            r#"{"status":"failed","retcode":1200,"data":null,"message":"err","wording":"not admin"}"#,
        )
        .unwrap();
        let InboundFrame::Response(response) = frame else {
            panic!("expected response");
        };
        assert!(!response.is_ok());
        assert_eq!(response.echo(), None);
        assert_eq!(response.failure_reason(), "not admin");
    }

    #[test]
    fn test_parse_group_message_event() {
        let frame = InboundFrame::parse(
            r#"{"post_type":"message","message_type":"group","group_id":100,"user_id":"12345",
                "message_id":9,"raw_message":"123456","sender":{"nickname":"nick","card":""}}"#,
        )
        .unwrap();
        let InboundFrame::Event(Event::Message(message)) = frame else {
            panic!("expected message event");
        };
        assert_eq!(message.group(), Some(GroupId(100)));
        assert_eq!(message.user_id, RemoteId(12345));
        assert_eq!(message.sender.display_name(), Some("nick"));
    }

    #[test]
    fn test_parse_notice_and_meta_events() {
        let notice = InboundFrame::parse(
            r#"{"post_type":"notice","notice_type":"group_decrease","group_id":1,"user_id":2}"#,
        )
        .unwrap();
        assert!(matches!(
            notice,
            InboundFrame::Event(Event::Notice(ref n)) if n.kind() == NoticeKind::MemberLeft
        ));

        let meta = InboundFrame::parse(
            r#"{"post_type":"meta_event","meta_event_type":"lifecycle","sub_type":"connect"}"#,
        )
        .unwrap();
        assert!(matches!(meta, InboundFrame::Event(Event::MetaEvent(_))));
    }

    #[test]
    fn test_unhandled_post_type_is_unknown() {
        let frame = InboundFrame::parse(r#"{"post_type":"message_sent","x":1}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Unknown(_)));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(InboundFrame::parse("[1]"), Err(FrameError::NotAnObject)));
        assert!(matches!(InboundFrame::parse("{"), Err(FrameError::Malformed(_))));
    }
}
