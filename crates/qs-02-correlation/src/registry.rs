//! Correlation registry: echo token to pending call.

use crate::errors::CorrelationError;
use crate::token::EchoToken;
use dashmap::DashMap;
use shared_types::{ApiResponse, CallKind, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A call waiting for its reply.
struct PendingCall<M> {
    kind: CallKind,
    created_at: Timestamp,
    metadata: M,
    /// Present when a caller awaits the raw response.
    waiter: Option<oneshot::Sender<ApiResponse>>,
}

/// A call matched to its reply.
#[derive(Debug)]
pub struct ResolvedCall<M> {
    pub token: String,
    pub kind: CallKind,
    pub created_at: Timestamp,
    pub latency_ms: u64,
    pub metadata: M,
}

/// A call reaped without a reply.
#[derive(Debug)]
pub struct ExpiredCall<M> {
    pub token: String,
    pub kind: CallKind,
    pub created_at: Timestamp,
    pub metadata: M,
}

/// Result of offering a response to the registry.
#[derive(Debug)]
pub enum Resolution<M> {
    Resolved(ResolvedCall<M>),
    /// The token was already resolved; this frame is ignored.
    Duplicate,
    /// Never registered, or reaped before the reply arrived.
    Unknown,
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct CorrelationStats {
    pub total_registered: AtomicU64,
    pub total_resolved: AtomicU64,
    pub total_expired: AtomicU64,
    pub total_duplicates: AtomicU64,
    pub total_unknown: AtomicU64,
    pub total_cancelled: AtomicU64,
}

/// Point-in-time copy of `CorrelationStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pending: usize,
    pub registered: u64,
    pub resolved: u64,
    pub expired: u64,
    pub duplicates: u64,
    pub unknown: u64,
    pub cancelled: u64,
}

/// Echo-token registry.
///
/// Lock-free per entry; safe to share behind an `Arc` between the frame
/// router and the timer tasks.
pub struct CorrelationRegistry<M> {
    pending: DashMap<String, PendingCall<M>>,
    /// Recently resolved tokens, kept to tell duplicates from strangers.
    resolved: DashMap<String, Timestamp>,
    ttl_ms: u64,
    stats: Arc<CorrelationStats>,
}

impl<M> CorrelationRegistry<M> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            resolved: DashMap::new(),
            ttl_ms: ttl.as_millis() as u64,
            stats: Arc::new(CorrelationStats::default()),
        }
    }

    /// Register a call whose reply is handled by the frame router.
    pub fn register(&self, kind: CallKind, metadata: M, now: Timestamp) -> EchoToken {
        self.insert(kind, metadata, now, None)
    }

    /// Register a call and get a receiver for its raw reply.
    pub fn register_awaiting(
        &self,
        kind: CallKind,
        metadata: M,
        now: Timestamp,
    ) -> (EchoToken, oneshot::Receiver<ApiResponse>) {
        let (tx, rx) = oneshot::channel();
        let token = self.insert(kind, metadata, now, Some(tx));
        (token, rx)
    }

    fn insert(
        &self,
        kind: CallKind,
        metadata: M,
        now: Timestamp,
        waiter: Option<oneshot::Sender<ApiResponse>>,
    ) -> EchoToken {
        let token = EchoToken::new(kind);
        self.pending.insert(
            token.as_str().to_string(),
            PendingCall {
                kind,
                created_at: now,
                metadata,
                waiter,
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(echo = %token, "Registered correlated call");
        token
    }

    /// Match a response to its call. The first match wins.
    pub fn resolve(&self, echo: &str, response: &ApiResponse, now: Timestamp) -> Resolution<M> {
        let Some((token, call)) = self.pending.remove(echo) else {
            if self.resolved.contains_key(echo) {
                self.stats.total_duplicates.fetch_add(1, Ordering::Relaxed);
                warn!(echo, "Duplicate reply for resolved call ignored");
                return Resolution::Duplicate;
            }
            self.stats.total_unknown.fetch_add(1, Ordering::Relaxed);
            debug!(echo, "Reply for unknown or expired call");
            return Resolution::Unknown;
        };

        self.resolved.insert(token.clone(), now);
        self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);

        if let Some(waiter) = call.waiter {
            if waiter.send(response.clone()).is_err() {
                debug!(echo, "Waiter dropped before reply");
            }
        }

        let latency_ms = now.saturating_sub(call.created_at);
        debug!(echo, latency_ms, ok = response.is_ok(), "Resolved correlated call");

        Resolution::Resolved(ResolvedCall {
            token,
            kind: call.kind,
            created_at: call.created_at,
            latency_ms,
            metadata: call.metadata,
        })
    }

    /// Token of the oldest pending `kind` call whose metadata satisfies
    /// `matches`. Used for replies that come back without their echo.
    pub fn find_pending<F>(&self, kind: CallKind, matches: F) -> Option<String>
    where
        F: Fn(&M) -> bool,
    {
        self.pending
            .iter()
            .filter(|entry| entry.kind == kind && matches(&entry.metadata))
            .min_by_key(|entry| entry.created_at)
            .map(|entry| entry.key().clone())
    }

    /// Drop a call whose frame was never sent.
    pub fn cancel(&self, echo: &str) -> Option<M> {
        let (_, call) = self.pending.remove(echo)?;
        self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
        Some(call.metadata)
    }

    /// Remove calls older than the TTL, and stale tombstones.
    ///
    /// Awaiting receivers see their sender dropped.
    pub fn reap_expired(&self, now: Timestamp) -> Vec<ExpiredCall<M>> {
        let ttl = self.ttl_ms;
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().created_at) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut expired = Vec::with_capacity(stale.len());
        for token in stale {
            // Resolved in the meantime: nothing to reap.
            let Some((token, call)) = self.pending.remove(&token) else {
                continue;
            };
            warn!(
                echo = %token,
                age_ms = now.saturating_sub(call.created_at),
                "Correlated call expired without reply"
            );
            self.stats.total_expired.fetch_add(1, Ordering::Relaxed);
            expired.push(ExpiredCall {
                token,
                kind: call.kind,
                created_at: call.created_at,
                metadata: call.metadata,
            });
        }

        self.resolved
            .retain(|_, resolved_at| now.saturating_sub(*resolved_at) <= ttl);

        expired
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, echo: &str) -> bool {
        self.pending.contains_key(echo)
    }

    pub fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pending: self.pending.len(),
            registered: self.stats.total_registered.load(Ordering::Relaxed),
            resolved: self.stats.total_resolved.load(Ordering::Relaxed),
            expired: self.stats.total_expired.load(Ordering::Relaxed),
            duplicates: self.stats.total_duplicates.load(Ordering::Relaxed),
            unknown: self.stats.total_unknown.load(Ordering::Relaxed),
            cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Wait for an awaited call's reply, bounded by `timeout`.
pub async fn await_response(
    rx: oneshot::Receiver<ApiResponse>,
    timeout: Duration,
) -> Result<ApiResponse, CorrelationError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(_)) => Err(CorrelationError::Discarded),
        Err(_) => Err(CorrelationError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    fn ok_response(echo: &str) -> ApiResponse {
        ApiResponse {
            status: "ok".to_string(),
            retcode: 0,
            data: json!({"message_id": 1}),
            echo: Some(json!(echo)),
            message: None,
            wording: None,
        }
    }

    #[test]
    fn test_resolve_returns_metadata_once() {
        let registry = CorrelationRegistry::new(TTL);
        let token = registry.register(CallKind::CodeDelivery, "delivery-1", 1_000);
        assert!(registry.is_pending(token.as_str()));

        let response = ok_response(token.as_str());
        let Resolution::Resolved(call) = registry.resolve(token.as_str(), &response, 1_250) else {
            panic!("expected resolution");
        };
        assert_eq!(call.metadata, "delivery-1");
        assert_eq!(call.kind, CallKind::CodeDelivery);
        assert_eq!(call.latency_ms, 250);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_reply_is_ignored() {
        let registry = CorrelationRegistry::new(TTL);
        let token = registry.register(CallKind::DeleteMessage, (), 0);
        let response = ok_response(token.as_str());

        assert!(matches!(
            registry.resolve(token.as_str(), &response, 10),
            Resolution::Resolved(_)
        ));
        assert!(matches!(
            registry.resolve(token.as_str(), &response, 20),
            Resolution::Duplicate
        ));
        assert_eq!(registry.snapshot().duplicates, 1);
        assert_eq!(registry.snapshot().resolved, 1);
    }

    #[test]
    fn test_unknown_token() {
        let registry: CorrelationRegistry<()> = CorrelationRegistry::new(TTL);
        assert!(matches!(
            registry.resolve("send_group_msg:nope", &ok_response("x"), 0),
            Resolution::Unknown
        ));
        assert_eq!(registry.snapshot().unknown, 1);
    }

    #[test]
    fn test_reap_expired_returns_metadata() {
        let registry = CorrelationRegistry::new(Duration::from_secs(5));
        let old = registry.register(CallKind::MemberList, 1u64, 0);
        let fresh = registry.register(CallKind::MemberList, 2u64, 4_000);

        let expired = registry.reap_expired(5_001);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].metadata, 1);
        assert_eq!(expired[0].token, old.as_str());
        assert!(registry.is_pending(fresh.as_str()));

        // Late reply for the reaped call is unknown, not resolved.
        assert!(matches!(
            registry.resolve(old.as_str(), &ok_response(old.as_str()), 6_000),
            Resolution::Unknown
        ));
    }

    #[test]
    fn test_tombstones_are_pruned_after_ttl() {
        let registry = CorrelationRegistry::new(Duration::from_secs(5));
        let token = registry.register(CallKind::SetGroupCard, (), 0);
        let response = ok_response(token.as_str());
        registry.resolve(token.as_str(), &response, 100);

        registry.reap_expired(10_000);
        assert!(matches!(
            registry.resolve(token.as_str(), &response, 10_001),
            Resolution::Unknown
        ));
    }

    #[test]
    fn test_find_pending_picks_oldest_match() {
        let registry = CorrelationRegistry::new(TTL);
        let newer = registry.register(CallKind::MemberList, 200u64, 2_000);
        let older = registry.register(CallKind::MemberList, 100u64, 1_000);
        registry.register(CallKind::StrangerInfo, 100u64, 500);

        assert_eq!(
            registry.find_pending(CallKind::MemberList, |_| true),
            Some(older.as_str().to_string())
        );
        assert_eq!(
            registry.find_pending(CallKind::MemberList, |group| *group == 200),
            Some(newer.as_str().to_string())
        );
        assert_eq!(registry.find_pending(CallKind::MemberList, |group| *group == 300), None);
        assert_eq!(registry.pending_count(), 3);
    }

    #[test]
    fn test_cancel_removes_call() {
        let registry = CorrelationRegistry::new(TTL);
        let token = registry.register(CallKind::GroupMessage, "relay", 0);
        assert_eq!(registry.cancel(token.as_str()), Some("relay"));
        assert_eq!(registry.cancel(token.as_str()), None);
        assert_eq!(registry.snapshot().cancelled, 1);
    }

    #[tokio::test]
    async fn test_awaiting_caller_receives_response() {
        let registry = CorrelationRegistry::new(TTL);
        let (token, rx) = registry.register_awaiting(CallKind::StrangerInfo, (), 0);
        let response = ApiResponse {
            data: json!({"user_id": 10001, "nickname": "alice"}),
            ..ok_response(token.as_str())
        };
        registry.resolve(token.as_str(), &response, 5);

        let received = await_response(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.data["nickname"], "alice");
    }

    #[tokio::test]
    async fn test_reaped_waiter_observes_discarded() {
        let registry = CorrelationRegistry::new(Duration::from_secs(1));
        let (_token, rx) = registry.register_awaiting(CallKind::StrangerInfo, (), 0);
        registry.reap_expired(2_000);

        let result = await_response(rx, Duration::from_secs(1)).await;
        assert_eq!(result.unwrap_err(), CorrelationError::Discarded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_times_out() {
        let registry = CorrelationRegistry::new(TTL);
        let (_token, rx) = registry.register_awaiting(CallKind::StrangerInfo, (), 0);

        let result = await_response(rx, Duration::from_millis(50)).await;
        tokio_test::assert_err!(&result);
        assert_eq!(result.unwrap_err(), CorrelationError::Timeout { after_ms: 50 });
    }
}
