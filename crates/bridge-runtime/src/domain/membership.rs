//! Known members of the configured groups.

use std::collections::{BTreeMap, HashSet};

use qs_04_verification::Membership;
use shared_types::{GroupId, MemberInfo, RemoteId};
use tracing::debug;

#[derive(Debug, Default)]
struct GroupMembers {
    /// A full member list has been received at least once.
    loaded: bool,
    members: HashSet<RemoteId>,
}

/// Per-group member sets, fed by member-list replies and join/leave
/// notices. Unconfigured groups are ignored.
#[derive(Debug, Default)]
pub struct MembershipCache {
    groups: BTreeMap<GroupId, GroupMembers>,
}

impl MembershipCache {
    pub fn new(groups: &[GroupId]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|group| (*group, GroupMembers::default()))
                .collect(),
        }
    }

    pub fn is_configured(&self, group: GroupId) -> bool {
        self.groups.contains_key(&group)
    }

    pub fn configured(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    /// Replace a group's members with a full list.
    pub fn load(&mut self, group: GroupId, members: &[MemberInfo]) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.members = members.iter().map(|member| member.user_id).collect();
            entry.loaded = true;
            debug!(group = %group, members = entry.members.len(), "Member list loaded");
        }
    }

    pub fn joined(&mut self, group: GroupId, remote: RemoteId) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.members.insert(remote);
        }
    }

    pub fn left(&mut self, group: GroupId, remote: RemoteId) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.members.remove(&remote);
        }
    }

    /// `Member` if any group lists the account, `NotMember` only when every
    /// group's list is loaded and none does.
    pub fn membership(&self, remote: RemoteId) -> Membership {
        if self
            .groups
            .values()
            .any(|entry| entry.members.contains(&remote))
        {
            Membership::Member
        } else if !self.groups.is_empty() && self.groups.values().all(|entry| entry.loaded) {
            Membership::NotMember
        } else {
            Membership::Unknown
        }
    }

    /// Groups to deliver a code in: those the account is a known member of,
    /// or every configured group when none is known.
    pub fn target_groups(&self, remote: RemoteId) -> Vec<GroupId> {
        let known: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, entry)| entry.members.contains(&remote))
            .map(|(group, _)| *group)
            .collect();
        if known.is_empty() {
            self.configured()
        } else {
            known
        }
    }
}
