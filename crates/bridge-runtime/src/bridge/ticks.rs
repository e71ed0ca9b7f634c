//! Periodic work. Each tick takes the state lock once, collects notices and
//! delivers them after the lock is released.

use qs_03_admission::DropReason;
use qs_04_verification::{DrainEvent, FlowError, SweepEvent};
use shared_types::ActionRequest;
use tracing::{debug, warn};

use super::service::{BridgeService, Notices};
use crate::domain::{CallContext, Notice};

impl BridgeService {
    /// Promote waiting principals into free slots.
    pub fn tick_admission(&self) {
        let now = self.now();
        let mut notices = Notices::new();
        {
            let mut state = self.state.lock();
            let directory = &self.directory;
            let events = state
                .engine
                .drain_queue(now, |principal| directory.is_online(principal));
            for event in events {
                match event {
                    DrainEvent::Issued(issued) => {
                        self.apply_issued(&mut state, &issued, now, &mut notices);
                    }
                    DrainEvent::Dropped { principal, reason } => {
                        notices.push((principal, Notice::QueueDropped(reason)));
                    }
                    DrainEvent::Position(update) => notices.push((
                        update.principal,
                        Notice::QueuePosition {
                            position: update.position,
                            estimated_wait_secs: update.estimated_wait_secs,
                        },
                    )),
                }
            }
        }
        self.deliver(notices);
    }

    /// Send at most one queued code message.
    pub fn tick_send_queue(&self) {
        if !self.sink.is_connected() {
            return;
        }
        let now = self.now();
        let mut notices = Notices::new();
        {
            let mut state = self.state.lock();
            let tick = state.send_queue.next_due(now);
            for abandoned in tick.abandoned {
                if abandoned.ticket_exhausted {
                    self.abandon_ticket(&mut state, abandoned.delivery.ticket, now, &mut notices);
                }
            }

            if let Some(delivery) = tick.send {
                let action = ActionRequest::SendGroupMsg {
                    group_id: delivery.group,
                    message: self.code_message(&delivery),
                };
                let context = CallContext::CodeDelivery {
                    delivery: delivery.clone(),
                    sent_at: now,
                };
                if let Err(err) = self.dispatch(action, context, now) {
                    debug!(ticket = %delivery.ticket, error = %err, "Code message not sent");
                    self.delivery_failed(&mut state, delivery, now, &mut notices);
                }
            }
        }
        self.deliver(notices);
    }

    /// Fire due soft and hard retraction timers.
    pub fn tick_retraction(&self) {
        let now = self.now();
        let mut state = self.state.lock();
        let deletes = state.retraction.due(now);
        if !deletes.is_empty() {
            debug!(count = deletes.len(), "Retraction timers fired");
            self.send_deletes(&mut state, deletes, now);
        }
    }

    /// Send due group-card and announcement calls.
    pub fn tick_side_effects(&self) {
        if !self.sink.is_connected() {
            return;
        }
        let now = self.now();
        let mut state = self.state.lock();
        for task in state.side_effects.due(now) {
            let context = CallContext::side_effect(task.id, &task.action);
            if let Err(err) = self.dispatch(task.action, context, now) {
                debug!(task = task.id, error = %err, "Side effect not sent");
                state.side_effects.failed(task.id, now);
            }
        }
    }

    /// Expire requests, confirmations and queue entries; purge retraction
    /// bookkeeping; reap unanswered calls.
    pub fn tick_cleanup(&self) {
        let now = self.now();
        let mut notices = Notices::new();
        let expired_calls = self.correlation.reap_expired(now);
        {
            let mut state = self.state.lock();
            for event in state.engine.sweep(now) {
                match event {
                    SweepEvent::RequestExpired { ticket, principal, .. } => {
                        self.end_ticket(&mut state, ticket, now);
                        notices.push((principal, Notice::CodeExpired));
                    }
                    SweepEvent::ConfirmationExpired { principal } => {
                        notices.push((principal, Notice::Flow(FlowError::ConfirmationExpired)));
                    }
                    SweepEvent::QueueExpired { principal } => {
                        notices.push((principal, Notice::QueueDropped(DropReason::Expired)));
                    }
                }
            }

            let purged = state.retraction.purge(now);
            if !purged.is_empty() {
                debug!(count = purged.len(), "Retraction bookkeeping purged");
            }

            for call in expired_calls {
                match call.metadata {
                    CallContext::CodeDelivery { delivery, .. } => {
                        // Outcome unknown; the message may have been posted.
                        warn!(ticket = %delivery.ticket, group = %delivery.group, "Code delivery unanswered");
                    }
                    CallContext::DeleteMessage { message_id, .. } => {
                        if let Some(retry) = state.retraction.delete_failed(message_id, now) {
                            self.send_deletes(&mut state, vec![retry], now);
                        }
                    }
                    CallContext::SideEffect { task_id, .. } => {
                        state.side_effects.failed(task_id, now);
                    }
                    other => debug!(kind = ?other.kind(), "Call unanswered"),
                }
            }

            debug!(
                engine = ?state.engine.stats(),
                send_queue = ?state.send_queue.stats(),
                retraction = ?state.retraction.stats(),
                "Cleanup pass"
            );
        }
        self.deliver(notices);
    }
}
