//! Retraction scheduler implementation.

use std::collections::{BTreeMap, HashMap};

use shared_types::{MessageId, Ticket, Timestamp};
use tracing::{debug, info, warn};

use super::config::RetractionConfig;
use super::types::{DeleteRequest, RetractReason, RetractionStats, Terminal, Timers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetState {
    /// Known, no delete sent yet.
    Pending,
    InFlight { attempts: u32 },
    Deleted,
}

#[derive(Debug)]
struct Target {
    message_id: MessageId,
    sent_at: Timestamp,
    state: TargetState,
}

#[derive(Debug)]
struct Entry {
    issued_at: Timestamp,
    timers: Timers,
    ended: Option<Terminal>,
    /// Delete ids as soon as they are known.
    eager: bool,
    targets: Vec<Target>,
}

impl Entry {
    fn target_mut(&mut self, message_id: MessageId) -> Option<&mut Target> {
        self.targets
            .iter_mut()
            .find(|target| target.message_id == message_id)
    }

    /// Last moment any of this ticket's messages can still be deleted.
    fn closes_at(&self, window_ms: u64) -> Timestamp {
        let last_sent = self
            .targets
            .iter()
            .map(|target| target.sent_at)
            .max()
            .unwrap_or(self.issued_at)
            .max(self.issued_at);
        last_sent + window_ms
    }
}

/// Tracks delivered code messages per ticket and decides when to delete them.
#[derive(Debug)]
pub struct RetractionScheduler {
    config: RetractionConfig,
    entries: BTreeMap<Ticket, Entry>,
    ticket_by_message: HashMap<MessageId, Ticket>,
    deleted_total: u64,
    failed_total: u64,
}

impl RetractionScheduler {
    pub fn new(config: RetractionConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            ticket_by_message: HashMap::new(),
            deleted_total: 0,
            failed_total: 0,
        }
    }

    pub fn config(&self) -> &RetractionConfig {
        &self.config
    }

    /// Arm both timers for a freshly issued ticket.
    pub fn schedule(&mut self, ticket: Ticket, now: Timestamp) {
        let timers = Timers {
            soft_at: Some(now + self.config.soft_after_ms()),
            hard_at: Some(now + self.config.hard_after_ms()),
        };
        self.entries.insert(
            ticket,
            Entry {
                issued_at: now,
                timers,
                ended: None,
                eager: false,
                targets: Vec::new(),
            },
        );
        debug!(ticket = %ticket, ?timers, "Retraction scheduled");
    }

    /// A delivery reply carried the platform message id.
    ///
    /// Returns a delete to send right away when the ticket has already ended
    /// or is no longer tracked.
    pub fn attach_message_id(
        &mut self,
        ticket: Ticket,
        message_id: MessageId,
        sent_at: Timestamp,
        now: Timestamp,
    ) -> Option<DeleteRequest> {
        if now >= sent_at + self.config.window_ms() {
            warn!(ticket = %ticket, message_id = %message_id, "Message id arrived after the recall window");
            return None;
        }

        let Some(entry) = self.entries.get_mut(&ticket) else {
            info!(ticket = %ticket, message_id = %message_id, "Retracting message of an untracked ticket");
            return Some(DeleteRequest {
                ticket,
                message_id,
                reason: RetractReason::Orphan,
            });
        };

        self.ticket_by_message.insert(message_id, ticket);
        let state = if entry.eager {
            TargetState::InFlight { attempts: 1 }
        } else {
            TargetState::Pending
        };
        entry.targets.push(Target {
            message_id,
            sent_at,
            state,
        });

        entry.eager.then_some(DeleteRequest {
            ticket,
            message_id,
            reason: RetractReason::LateArrival,
        })
    }

    /// The ticket ended. Cancels the soft timer (both on `Verified`) and
    /// returns deletes for every id known so far.
    pub fn on_terminal(
        &mut self,
        ticket: Ticket,
        terminal: Terminal,
        now: Timestamp,
    ) -> Vec<DeleteRequest> {
        let window_ms = self.config.window_ms();
        let Some(entry) = self.entries.get_mut(&ticket) else {
            return Vec::new();
        };

        entry.ended = Some(terminal);
        entry.eager = true;
        entry.timers.soft_at = None;
        if terminal == Terminal::Verified {
            entry.timers.hard_at = None;
        }

        let deletes = start_deletes(entry, ticket, now, window_ms, RetractReason::Terminal, |state| {
            state == TargetState::Pending
        });
        debug!(ticket = %ticket, ?terminal, deletes = deletes.len(), "Retraction triggered");
        deletes
    }

    /// Retract immediately without cancelling the hard safety timer.
    pub fn retract_now(&mut self, ticket: Ticket, now: Timestamp) -> Vec<DeleteRequest> {
        self.on_terminal(ticket, Terminal::Failed, now)
    }

    /// The platform acknowledged a delete.
    pub fn delete_confirmed(&mut self, message_id: MessageId) -> Option<Ticket> {
        let ticket = *self.ticket_by_message.get(&message_id)?;
        let target = self.entries.get_mut(&ticket)?.target_mut(message_id)?;
        if target.state != TargetState::Deleted {
            target.state = TargetState::Deleted;
            self.deleted_total += 1;
        }
        Some(ticket)
    }

    /// The platform refused a delete. Ended tickets retry right away up to
    /// `max_delete_attempts`; otherwise the hard timer picks it up.
    pub fn delete_failed(&mut self, message_id: MessageId, now: Timestamp) -> Option<DeleteRequest> {
        self.failed_total += 1;
        let max_attempts = self.config.max_delete_attempts;
        let window_ms = self.config.window_ms();

        let ticket = *self.ticket_by_message.get(&message_id)?;
        let entry = self.entries.get_mut(&ticket)?;
        let eager = entry.eager;
        let hard_armed = entry.timers.hard_at.is_some();
        let target = entry.target_mut(message_id)?;

        let attempts = match target.state {
            TargetState::InFlight { attempts } => attempts,
            TargetState::Pending => 0,
            TargetState::Deleted => return None,
        };

        if eager && attempts < max_attempts && now < target.sent_at + window_ms {
            target.state = TargetState::InFlight {
                attempts: attempts + 1,
            };
            return Some(DeleteRequest {
                ticket,
                message_id,
                reason: RetractReason::Retry,
            });
        }

        target.state = TargetState::Pending;
        if !hard_armed {
            warn!(ticket = %ticket, message_id = %message_id, attempts, "Giving up on retraction");
        }
        None
    }

    /// Fire every timer that is due.
    pub fn due(&mut self, now: Timestamp) -> Vec<DeleteRequest> {
        let window_ms = self.config.window_ms();
        let mut deletes = Vec::new();

        for (ticket, entry) in self.entries.iter_mut() {
            if entry.timers.soft_at.is_some_and(|at| at <= now) {
                entry.timers.soft_at = None;
                entry.eager = true;
                deletes.extend(start_deletes(
                    entry,
                    *ticket,
                    now,
                    window_ms,
                    RetractReason::SoftTimer,
                    |state| state == TargetState::Pending,
                ));
            }

            if entry.timers.hard_at.is_some_and(|at| at <= now) {
                entry.timers.hard_at = None;
                entry.eager = true;
                deletes.extend(start_deletes(
                    entry,
                    *ticket,
                    now,
                    window_ms,
                    RetractReason::HardTimer,
                    |state| state != TargetState::Deleted,
                ));
            }
        }

        if !deletes.is_empty() {
            debug!(deletes = deletes.len(), "Retraction timers fired");
        }
        deletes
    }

    /// Drop tickets whose recall window has closed.
    pub fn purge(&mut self, now: Timestamp) -> Vec<Ticket> {
        let window_ms = self.config.window_ms();
        let closed: Vec<Ticket> = self
            .entries
            .iter()
            .filter(|(_, entry)| now >= entry.closes_at(window_ms))
            .map(|(ticket, _)| *ticket)
            .collect();

        for ticket in &closed {
            if let Some(entry) = self.entries.remove(ticket) {
                for target in entry.targets {
                    if target.state != TargetState::Deleted {
                        warn!(ticket = %ticket, message_id = %target.message_id, "Recall window closed before the message was deleted");
                    }
                    self.ticket_by_message.remove(&target.message_id);
                }
            }
        }
        closed
    }

    pub fn timers(&self, ticket: Ticket) -> Option<Timers> {
        self.entries.get(&ticket).map(|entry| entry.timers)
    }

    pub fn is_tracked(&self, ticket: Ticket) -> bool {
        self.entries.contains_key(&ticket)
    }

    pub fn stats(&self) -> RetractionStats {
        RetractionStats {
            tracked_tickets: self.entries.len(),
            undeleted_messages: self
                .entries
                .values()
                .flat_map(|entry| entry.targets.iter())
                .filter(|target| target.state != TargetState::Deleted)
                .count(),
            deleted_total: self.deleted_total,
            failed_total: self.failed_total,
        }
    }
}

/// Mark matching targets in flight and build their delete requests.
fn start_deletes<F>(
    entry: &mut Entry,
    ticket: Ticket,
    now: Timestamp,
    window_ms: u64,
    reason: RetractReason,
    select: F,
) -> Vec<DeleteRequest>
where
    F: Fn(TargetState) -> bool,
{
    entry
        .targets
        .iter_mut()
        .filter(|target| select(target.state) && now < target.sent_at + window_ms)
        .map(|target| {
            let attempts = match target.state {
                TargetState::InFlight { attempts } => attempts + 1,
                _ => 1,
            };
            target.state = TargetState::InFlight { attempts };
            DeleteRequest {
                ticket,
                message_id: target.message_id,
                reason,
            }
        })
        .collect()
}
