//! Send queue implementation.

use std::collections::{HashMap, VecDeque};

use shared_types::{PrincipalId, Ticket, Timestamp};
use tracing::{debug, warn};

use super::config::SendQueueConfig;
use super::types::{AbandonReason, Abandoned, Delivery, FailureOutcome, SendQueueStats, Tick};

#[derive(Debug, Default, Clone, Copy)]
struct TicketProgress {
    /// Queued plus in flight.
    outstanding: usize,
    delivered: bool,
}

#[derive(Debug)]
pub struct SendQueue {
    config: SendQueueConfig,
    queue: VecDeque<Delivery>,
    tickets: HashMap<Ticket, TicketProgress>,
    last_sent_at: Option<Timestamp>,
    sent_total: u64,
    abandoned_total: u64,
}

impl SendQueue {
    pub fn new(config: SendQueueConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            tickets: HashMap::new(),
            last_sent_at: None,
            sent_total: 0,
            abandoned_total: 0,
        }
    }

    pub fn enqueue(&mut self, delivery: Delivery) {
        self.tickets.entry(delivery.ticket).or_default().outstanding += 1;
        debug!(
            ticket = %delivery.ticket,
            group = %delivery.group,
            queued = self.queue.len() + 1,
            "Delivery enqueued"
        );
        self.queue.push_back(delivery);
    }

    /// Drop stale entries and hand out at most one delivery.
    ///
    /// The returned delivery counts as in flight until `mark_sent` or
    /// `report_failure` is called for it.
    pub fn next_due(&mut self, now: Timestamp) -> Tick {
        let max_age = self.config.max_age_ms();
        let mut tick = Tick::default();

        let (stale, fresh): (Vec<Delivery>, Vec<Delivery>) = self
            .queue
            .drain(..)
            .partition(|delivery| now.saturating_sub(delivery.enqueued_at) > max_age);
        self.queue = fresh.into();
        for delivery in stale {
            tick.abandoned
                .push(self.abandon(delivery, AbandonReason::Stale));
        }

        let interval_elapsed = self
            .last_sent_at
            .map_or(true, |last| now >= last + self.config.interval_ms());
        if interval_elapsed {
            if let Some(delivery) = self.queue.pop_front() {
                self.last_sent_at = Some(now);
                tick.send = Some(delivery);
            }
        }
        tick
    }

    /// The platform accepted the message.
    pub fn mark_sent(&mut self, ticket: Ticket) {
        if let Some(progress) = self.tickets.get_mut(&ticket) {
            progress.outstanding = progress.outstanding.saturating_sub(1);
            progress.delivered = true;
            self.sent_total += 1;
        }
    }

    /// Sending failed (transport refusal or failed reply).
    pub fn report_failure(&mut self, mut delivery: Delivery, now: Timestamp) -> FailureOutcome {
        if !self.tickets.contains_key(&delivery.ticket) {
            return FailureOutcome::Cancelled;
        }

        if now.saturating_sub(delivery.enqueued_at) > self.config.max_age_ms() {
            return FailureOutcome::GaveUp(self.abandon(delivery, AbandonReason::Stale));
        }
        if delivery.attempt >= self.config.max_attempts {
            return FailureOutcome::GaveUp(self.abandon(delivery, AbandonReason::Attempts));
        }

        delivery.attempt += 1;
        let attempt = delivery.attempt;
        debug!(ticket = %delivery.ticket, attempt, "Delivery requeued");
        self.queue.push_back(delivery);
        FailureOutcome::Requeued { attempt }
    }

    /// Forget a ticket: verified, expired or invalidated. Returns the number
    /// of queued deliveries removed.
    pub fn remove_ticket(&mut self, ticket: Ticket) -> usize {
        self.tickets.remove(&ticket);
        let before = self.queue.len();
        self.queue.retain(|delivery| delivery.ticket != ticket);
        before - self.queue.len()
    }

    /// Principal left: drop its deliveries. Returns the affected tickets.
    pub fn remove_principal(&mut self, principal: &PrincipalId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .queue
            .iter()
            .filter(|delivery| &delivery.principal == principal)
            .map(|delivery| delivery.ticket)
            .collect();
        tickets.sort_unstable();
        tickets.dedup();
        for ticket in &tickets {
            self.remove_ticket(*ticket);
        }
        tickets
    }

    fn abandon(&mut self, delivery: Delivery, reason: AbandonReason) -> Abandoned {
        self.abandoned_total += 1;
        let ticket_exhausted = match self.tickets.get_mut(&delivery.ticket) {
            Some(progress) => {
                progress.outstanding = progress.outstanding.saturating_sub(1);
                progress.outstanding == 0 && !progress.delivered
            }
            None => false,
        };
        if ticket_exhausted {
            self.tickets.remove(&delivery.ticket);
        }
        warn!(
            ticket = %delivery.ticket,
            group = %delivery.group,
            attempt = delivery.attempt,
            ?reason,
            ticket_exhausted,
            "Delivery abandoned"
        );
        Abandoned {
            delivery,
            reason,
            ticket_exhausted,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Abandon everything queued (shutdown).
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.tickets.clear();
        dropped
    }

    pub fn stats(&self) -> SendQueueStats {
        SendQueueStats {
            queued: self.queue.len(),
            tickets_outstanding: self.tickets.len(),
            sent_total: self.sent_total,
            abandoned_total: self.abandoned_total,
        }
    }
}
