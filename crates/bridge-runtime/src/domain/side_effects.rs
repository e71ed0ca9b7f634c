//! Post-verification work with independent retries.
//!
//! Each task is one platform call. A failed task is retried after
//! `retry_delay_ms`, up to `max_attempts`; it never affects the binding
//! that produced it.

use std::collections::BTreeMap;

use shared_types::{ActionRequest, Timestamp};
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectTask {
    pub id: u64,
    pub action: ActionRequest,
    pub attempts: u32,
    next_at: Timestamp,
    in_flight: bool,
}

#[derive(Debug)]
pub struct SideEffectQueue {
    tasks: BTreeMap<u64, SideEffectTask>,
    next_id: u64,
    max_attempts: u32,
    retry_delay_ms: u64,
}

impl Default for SideEffectQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS)
    }
}

impl SideEffectQueue {
    pub fn new(max_attempts: u32, retry_delay_ms: u64) -> Self {
        Self {
            tasks: BTreeMap::new(),
            next_id: 1,
            max_attempts,
            retry_delay_ms,
        }
    }

    pub fn push(&mut self, action: ActionRequest, now: Timestamp) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(
            id,
            SideEffectTask {
                id,
                action,
                attempts: 0,
                next_at: now,
                in_flight: false,
            },
        );
        id
    }

    /// Tasks ready to run. Each is marked in flight and its attempt counted.
    pub fn due(&mut self, now: Timestamp) -> Vec<SideEffectTask> {
        self.tasks
            .values_mut()
            .filter(|task| !task.in_flight && task.next_at <= now)
            .map(|task| {
                task.in_flight = true;
                task.attempts += 1;
                task.clone()
            })
            .collect()
    }

    pub fn succeeded(&mut self, id: u64) {
        if let Some(task) = self.tasks.remove(&id) {
            debug!(task = id, action = task.action.action(), "Side effect done");
        }
    }

    /// Returns whether the task will be retried.
    pub fn failed(&mut self, id: u64, now: Timestamp) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        if task.attempts >= self.max_attempts {
            warn!(task = id, action = task.action.action(), attempts = task.attempts, "Side effect abandoned");
            self.tasks.remove(&id);
            return false;
        }
        task.in_flight = false;
        task.next_at = now + self.retry_delay_ms;
        true
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
