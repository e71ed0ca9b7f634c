//! Echo tokens.
//!
//! UUID v7 keeps tokens time-ordered, which makes them easy to follow in logs.

use shared_types::CallKind;
use std::fmt;
use uuid::Uuid;

/// Opaque token round-tripped in the `echo` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EchoToken(String);

impl EchoToken {
    /// Fresh token for a call of `kind`.
    pub fn new(kind: CallKind) -> Self {
        Self(format!("{}:{}", kind.prefix(), Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> Option<CallKind> {
        CallKind::from_echo(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EchoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EchoToken> for String {
    fn from(token: EchoToken) -> Self {
        token.0
    }
}
