//! Clock port.

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Milliseconds per second, for converting configured second values.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Time source abstraction for testability.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Manually driven clock.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: std::sync::atomic::AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs * MILLIS_PER_SEC);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Whole seconds left until `deadline`, rounded up. Zero once passed.
pub fn secs_until(now: Timestamp, deadline: Timestamp) -> u64 {
    deadline.saturating_sub(now).div_ceil(MILLIS_PER_SEC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        // Should be a reasonable timestamp (after year 2020)
        assert!(source.now() > 1_577_836_800_000);
    }

    #[test]
    fn test_mock_time_source_advances() {
        let clock = MockTimeSource::new(1_000);
        clock.advance_secs(2);
        assert_eq!(clock.now(), 3_000);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_secs_until_rounds_up() {
        assert_eq!(secs_until(0, 1), 1);
        assert_eq!(secs_until(0, 60_000), 60);
        assert_eq!(secs_until(500, 60_000), 60);
        assert_eq!(secs_until(60_000, 60_000), 0);
        assert_eq!(secs_until(70_000, 60_000), 0);
    }
}
