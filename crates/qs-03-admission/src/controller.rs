//! Admission controller implementation.

use std::collections::{HashMap, HashSet, VecDeque};

use shared_types::{secs_until, PrincipalId, RemoteId, Timestamp};
use tracing::{debug, info};

use super::config::AdmissionConfig;
use super::types::{
    AdmissionDecision, AdmissionRejection, AdmissionStats, CapacityLimit, DrainOutcome,
    DropReason, PositionNotice, QueueEntry, QueuePlacement,
};

/// Rate-limit state and the overflow queue.
#[derive(Debug)]
pub struct AdmissionController {
    config: AdmissionConfig,
    /// Last issuance (or cancellation) per principal.
    last_request: HashMap<PrincipalId, Timestamp>,
    /// Remote accounts locked out until the given time.
    remote_cooldown_until: HashMap<RemoteId, Timestamp>,
    /// Issuance timestamps inside the trailing window, oldest first.
    window: VecDeque<Timestamp>,
    /// Principals currently mid-verification.
    active: HashMap<PrincipalId, RemoteId>,
    queue: VecDeque<QueueEntry>,
    /// Principals that already received their one position notice.
    notified: HashSet<PrincipalId>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            last_request: HashMap::new(),
            remote_cooldown_until: HashMap::new(),
            window: VecDeque::new(),
            active: HashMap::new(),
            queue: VecDeque::new(),
            notified: HashSet::new(),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Decide whether `principal` may be issued a code for `remote` now.
    ///
    /// `Allow` dequeues the principal if it was waiting at the head; the
    /// caller must follow up with `register`.
    pub fn can_issue(
        &mut self,
        principal: &PrincipalId,
        remote: RemoteId,
        now: Timestamp,
    ) -> AdmissionDecision {
        if let Some(rejection) = self.cooldown_rejection(principal, remote, now) {
            debug!(principal = %principal, reason = %rejection, "Issuance rejected");
            return AdmissionDecision::Rejected(rejection);
        }

        self.prune_window(now);

        let queued_at = self.queue_position(principal);
        let jumps_queue = !self.queue.is_empty() && queued_at != Some(1);
        let limit = self.capacity_limit(0);

        if limit.is_none() && !jumps_queue {
            if queued_at.is_some() {
                self.remove_from_queue(principal);
            }
            return AdmissionDecision::Allow;
        }

        if let Some(position) = queued_at {
            if let Some(entry) = self.queue.get_mut(position - 1) {
                entry.remote = remote;
            }
            return AdmissionDecision::Queued(QueuePlacement {
                position,
                estimated_wait_secs: self.config.estimated_wait_secs(position),
                newly_enqueued: false,
            });
        }

        self.queue.push_back(QueueEntry {
            principal: principal.clone(),
            remote,
            enqueued_at: now,
        });
        let position = self.queue.len();
        info!(
            principal = %principal,
            position,
            limit = ?limit,
            "Issuance queued"
        );
        AdmissionDecision::Queued(QueuePlacement {
            position,
            estimated_wait_secs: self.config.estimated_wait_secs(position),
            newly_enqueued: true,
        })
    }

    /// Mark `principal` as mid-verification and count the issuance.
    pub fn register(&mut self, principal: &PrincipalId, remote: RemoteId, now: Timestamp) {
        self.remove_from_queue(principal);
        self.notified.remove(principal);
        self.active.insert(principal.clone(), remote);
        self.window.push_back(now);
        self.last_request.insert(principal.clone(), now);
    }

    /// End a verification. A failure locks `remote` for the remote cooldown.
    pub fn unregister(
        &mut self,
        principal: &PrincipalId,
        remote: RemoteId,
        success: bool,
        now: Timestamp,
    ) {
        self.active.remove(principal);
        if !success {
            let until = now + self.config.remote_cooldown_ms();
            self.remote_cooldown_until.insert(remote, until);
            debug!(remote = %remote, until, "Remote cooldown started");
        }
    }

    /// A cancelled confirmation still starts the principal cooldown.
    pub fn record_cancellation(&mut self, principal: &PrincipalId, now: Timestamp) {
        self.last_request.insert(principal.clone(), now);
    }

    /// Principal disconnected: leave the queue. Returns whether it was queued.
    pub fn forget_principal(&mut self, principal: &PrincipalId) -> bool {
        self.notified.remove(principal);
        self.remove_from_queue(principal)
    }

    /// Admit up to `drain_batch` queue heads.
    pub fn drain<F>(&mut self, now: Timestamp, is_online: F) -> DrainOutcome
    where
        F: Fn(&PrincipalId) -> bool,
    {
        let mut outcome = DrainOutcome::default();
        if self.queue.is_empty() {
            return outcome;
        }

        self.prune_window(now);
        let ttl = self.config.queue_ttl_ms();

        while outcome.admitted.len() < self.config.drain_batch {
            let Some(head) = self.queue.front() else {
                break;
            };

            let reason = if now.saturating_sub(head.enqueued_at) > ttl {
                Some(DropReason::Expired)
            } else if !is_online(&head.principal) {
                Some(DropReason::Offline)
            } else {
                None
            };
            if let Some(reason) = reason {
                if let Some(entry) = self.queue.pop_front() {
                    self.notified.remove(&entry.principal);
                    debug!(principal = %entry.principal, ?reason, "Queue entry dropped");
                    outcome.dropped.push((entry, reason));
                }
                continue;
            }

            let blocked = self
                .cooldown_rejection(&head.principal, head.remote, now)
                .is_some()
                || self.capacity_limit(outcome.admitted.len()).is_some();
            if blocked {
                break;
            }

            if let Some(entry) = self.queue.pop_front() {
                self.notified.remove(&entry.principal);
                outcome.admitted.push(entry);
            }
        }

        if !self.queue.is_empty() {
            outcome.notices = self.position_notices();
        }

        if !outcome.admitted.is_empty() {
            info!(
                admitted = outcome.admitted.len(),
                still_queued = self.queue.len(),
                "Drained admission queue"
            );
        }
        outcome
    }

    /// Forget stale rate-limit state. Returns queue entries that expired.
    pub fn prune(&mut self, now: Timestamp) -> Vec<QueueEntry> {
        self.prune_window(now);

        let cooldown = self.config.principal_cooldown_ms();
        self.last_request
            .retain(|_, at| now.saturating_sub(*at) < cooldown);
        self.remote_cooldown_until.retain(|_, until| *until > now);

        let ttl = self.config.queue_ttl_ms();
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|entry| now.saturating_sub(entry.enqueued_at) > ttl);
        self.queue = kept.into();
        for entry in &expired {
            self.notified.remove(&entry.principal);
        }
        expired
    }

    /// 1-based queue position.
    pub fn queue_position(&self, principal: &PrincipalId) -> Option<usize> {
        self.queue
            .iter()
            .position(|entry| &entry.principal == principal)
            .map(|index| index + 1)
    }

    pub fn is_active(&self, principal: &PrincipalId) -> bool {
        self.active.contains_key(principal)
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            active: self.active.len(),
            queued: self.queue.len(),
            issued_in_window: self.window.len(),
            cooling_remotes: self.remote_cooldown_until.len(),
        }
    }

    fn cooldown_rejection(
        &self,
        principal: &PrincipalId,
        remote: RemoteId,
        now: Timestamp,
    ) -> Option<AdmissionRejection> {
        if let Some(&last) = self.last_request.get(principal) {
            let until = last + self.config.principal_cooldown_ms();
            if now < until {
                return Some(AdmissionRejection::PrincipalCooldown {
                    remaining_secs: secs_until(now, until).max(1),
                });
            }
        }

        if let Some(&until) = self.remote_cooldown_until.get(&remote) {
            if now < until {
                return Some(AdmissionRejection::RemoteCooldown {
                    remote,
                    remaining_secs: secs_until(now, until).max(1),
                });
            }
        }

        None
    }

    /// Saturated limit, counting `pending` admissions not yet registered.
    fn capacity_limit(&self, pending: usize) -> Option<CapacityLimit> {
        if self.window.len() + pending >= self.config.max_per_window {
            Some(CapacityLimit::Window)
        } else if self.active.len() + pending >= self.config.max_concurrent {
            Some(CapacityLimit::Concurrency)
        } else {
            None
        }
    }

    fn prune_window(&mut self, now: Timestamp) {
        let window = self.config.window_ms();
        while let Some(&oldest) = self.window.front() {
            if now.saturating_sub(oldest) >= window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn remove_from_queue(&mut self, principal: &PrincipalId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|entry| &entry.principal != principal);
        self.queue.len() != before
    }

    fn position_notices(&mut self) -> Vec<PositionNotice> {
        let mut notices = Vec::new();
        let limit = self.config.position_notice_limit;
        for (index, entry) in self.queue.iter().take(limit).enumerate() {
            if self.notified.insert(entry.principal.clone()) {
                let position = index + 1;
                notices.push(PositionNotice {
                    principal: entry.principal.clone(),
                    position,
                    estimated_wait_secs: self.config.estimated_wait_secs(position),
                });
            }
        }
        notices
    }
}
