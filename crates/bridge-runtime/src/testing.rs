//! Port doubles for tests.

use parking_lot::Mutex;
use shared_types::{GroupId, PrincipalId};

use crate::domain::Notice;
use crate::ports::PrincipalNotifier;

/// A group chat line handed to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedLine {
    pub group: GroupId,
    pub sender: String,
    pub text: String,
}

/// Records every notice and relayed line.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(PrincipalId, Notice)>>,
    relayed: Mutex<Vec<RelayedLine>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(PrincipalId, Notice)> {
        self.notices.lock().clone()
    }

    pub fn notices_for(&self, principal: &PrincipalId) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|(p, _)| p == principal)
            .map(|(_, notice)| notice.clone())
            .collect()
    }

    pub fn last_for(&self, principal: &PrincipalId) -> Option<Notice> {
        self.notices_for(principal).pop()
    }

    pub fn relayed(&self) -> Vec<RelayedLine> {
        self.relayed.lock().clone()
    }

    pub fn take(&self) -> Vec<(PrincipalId, Notice)> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl PrincipalNotifier for RecordingNotifier {
    fn notify(&self, principal: &PrincipalId, notice: Notice) {
        self.notices.lock().push((principal.clone(), notice));
    }

    fn relay_from_group(&self, group: GroupId, sender: &str, text: &str) {
        self.relayed.lock().push(RelayedLine {
            group,
            sender: sender.to_string(),
            text: text.to_string(),
        });
    }
}
