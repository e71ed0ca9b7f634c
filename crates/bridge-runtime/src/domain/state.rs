//! Mutable bridge state, guarded by one lock.

use qs_04_verification::VerificationEngine;
use qs_05_retraction::RetractionScheduler;
use qs_06_send_queue::SendQueue;

use super::membership::MembershipCache;
use super::side_effects::SideEffectQueue;
use crate::config::BridgeConfig;

pub struct BridgeState {
    pub engine: VerificationEngine,
    pub send_queue: SendQueue,
    pub retraction: RetractionScheduler,
    pub membership: MembershipCache,
    pub side_effects: SideEffectQueue,
}

impl BridgeState {
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_engine(
            config,
            VerificationEngine::new(config.verification.clone(), config.admission.clone()),
        )
    }

    pub fn with_engine(config: &BridgeConfig, engine: VerificationEngine) -> Self {
        Self {
            engine,
            send_queue: SendQueue::new(config.send_queue.clone()),
            retraction: RetractionScheduler::new(config.retraction.clone()),
            membership: MembershipCache::new(&config.groups),
            side_effects: SideEffectQueue::default(),
        }
    }
}
