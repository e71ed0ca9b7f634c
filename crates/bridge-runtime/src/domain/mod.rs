//! Bridge-level state that sits between the component crates.

pub mod context;
pub mod membership;
pub mod notice;
pub mod side_effects;
pub mod state;

pub use context::CallContext;
pub use membership::MembershipCache;
pub use notice::Notice;
pub use side_effects::{SideEffectQueue, SideEffectTask};
pub use state::BridgeState;
