//! Notifier that writes every notice to the log. Used by the standalone
//! binary, where no game is attached.

use shared_types::{GroupId, PrincipalId};
use tracing::info;

use crate::domain::Notice;
use crate::ports::PrincipalNotifier;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl PrincipalNotifier for LogNotifier {
    fn notify(&self, principal: &PrincipalId, notice: Notice) {
        info!(principal = %principal, "{notice}");
    }

    fn relay_from_group(&self, group: GroupId, sender: &str, text: &str) {
        info!(group = %group, sender, "{text}");
    }
}
