//! # Core Identifiers
//!
//! Game-side and platform-side identities that flow through the bridge.
//!
//! ## Clusters
//!
//! - **Game side**: `PrincipalId`, `SessionTag`
//! - **Platform side**: `RemoteId`, `GroupId`, `MessageId`
//! - **Bridge**: `Ticket`, `Channel`

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// GAME SIDE
// =============================================================================

/// The game-side actor requesting an identity binding (player name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque tag of the principal's current game session (XUID or similar).
///
/// A code is only redeemable by the session it was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTag(pub String);

impl SessionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PLATFORM SIDE
// =============================================================================

/// Numeric platform identifiers arrive as JSON numbers from most OneBot
/// implementations and as strings from a few; accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumericOrString {
    Number(i64),
    Text(String),
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<$inner>().map(Self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match NumericOrString::deserialize(deserializer)? {
                    NumericOrString::Number(n) => <$inner>::try_from(n)
                        .map(Self)
                        .map_err(serde::de::Error::custom),
                    NumericOrString::Text(s) => s.parse().map_err(serde::de::Error::custom),
                }
            }
        }
    };
}

numeric_id!(
    /// External chat-platform account (QQ number).
    RemoteId,
    u64
);

numeric_id!(
    /// A chat group on the platform.
    GroupId,
    u64
);

numeric_id!(
    /// Platform message id, used for retraction.
    MessageId,
    i64
);

impl RemoteId {
    /// Shortest accepted account number.
    pub const MIN_DIGITS: usize = 5;
    /// Longest accepted account number.
    pub const MAX_DIGITS: usize = 11;

    /// Parse a user-typed account number: 5-11 ASCII digits, no leading zero.
    pub fn parse_input(input: &str) -> Option<Self> {
        let input = input.trim();
        let len_ok = (Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&input.len());
        if !len_ok || !input.bytes().all(|b| b.is_ascii_digit()) || input.starts_with('0') {
            return None;
        }
        input.parse().ok()
    }
}

// =============================================================================
// BRIDGE
// =============================================================================

/// Monotonic issuance id. Ties one issued code to its deliveries,
/// delivered message ids and retraction timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a code redemption came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Typed into the game-side prompt.
    Game,
    /// Posted in a configured platform group.
    Group(GroupId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Game => f.write_str("game"),
            Channel::Group(group) => write!(f, "group:{group}"),
        }
    }
}
