//! Game-side collaborators.
//!
//! Both traits are called from inside the bridge's timer tasks and must not
//! block or call back into the bridge synchronously.

use crate::domain::notice::Notice;
use shared_types::{GroupId, PrincipalId, SessionTag};

/// Who is online, and under which session.
pub trait PrincipalDirectory: Send + Sync {
    /// Current session of an online principal.
    fn session_tag(&self, principal: &PrincipalId) -> Option<SessionTag>;

    fn is_online(&self, principal: &PrincipalId) -> bool {
        self.session_tag(principal).is_some()
    }
}

/// Delivers bridge output to players.
pub trait PrincipalNotifier: Send + Sync {
    fn notify(&self, principal: &PrincipalId, notice: Notice);

    /// An ordinary group chat line, for display in game.
    fn relay_from_group(&self, group: GroupId, sender: &str, text: &str);
}
