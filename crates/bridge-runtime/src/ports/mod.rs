//! Ports the host game implements.

pub mod inbound;
pub mod outbound;

pub use inbound::{PrincipalDirectory, PrincipalNotifier};
pub use outbound::{BindingStore, StoreError};

use std::sync::Arc;

/// The host's implementations of every port.
#[derive(Clone)]
pub struct BridgePorts {
    pub store: Arc<dyn BindingStore>,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub notifier: Arc<dyn PrincipalNotifier>,
}
