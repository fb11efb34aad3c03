// src/optime.rs

use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio::time::Duration;

/// A monotonically non-decreasing `(seconds, counter)` pair. Ordered
/// lexicographically: two stamps taken in the same second are ordered by
/// `counter`, and a stamp from a later second always sorts after one from
/// an earlier second regardless of counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct OpTime {
    pub seconds: u32,
    pub counter: u32,
}

impl OpTime {
    pub fn new(seconds: u32, counter: u32) -> Self {
        OpTime { seconds, counter }
    }
}

/// The operation-time oracle. Hands out strictly-increasing stamps within
/// a second and tolerates clock regression by skewing forward instead of
/// going backwards, exactly as the original `OpTime::_now()` does:
///
/// - same second as last: bump the counter.
/// - clock moved backwards: keep issuing from the last known second,
///   still bumping the counter (the "skewed" branch).
/// - clock moved forwards: reset the counter to 1 under the new second.
pub struct OpTimeOracle {
    last: RwLock<OpTime>,
    notifier: Notify,
}

impl OpTimeOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(OpTimeOracle {
            last: RwLock::new(OpTime::default()),
            notifier: Notify::new(),
        })
    }

    /// Stamps the current instant, given a caller-supplied wall-clock
    /// reading in seconds (injected so the algorithm stays deterministic
    /// and testable without reaching for the system clock itself).
    pub async fn now(&self, wall_clock_secs: u32) -> OpTime {
        let mut last = self.last.write().await;
        let result = if wall_clock_secs == last.seconds {
            last.counter += 1;
            *last
        } else if wall_clock_secs < last.seconds {
            last.counter += 1;
            *last
        } else {
            *last = OpTime::new(wall_clock_secs, 1);
            *last
        };
        self.notifier.notify_waiters();
        result
    }

    pub async fn last(&self) -> OpTime {
        *self.last.read().await
    }

    /// Blocks until the oracle's value differs from `snapshot`, or the
    /// timeout elapses. Returns immediately without waiting at all if the
    /// current value has already moved past `snapshot` — mirroring
    /// `OpTime::waitForDifferent`'s "already different, don't block" check.
    pub async fn wait_for_advance(&self, snapshot: OpTime, timeout: Duration) -> Option<OpTime> {
        if *self.last.read().await != snapshot {
            return Some(*self.last.read().await);
        }
        let notified = self.notifier.notified();
        tokio::pin!(notified);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = *self.last.read().await;
            if current != snapshot {
                return Some(current);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            if tokio::time::timeout(remaining, &mut notified).await.is_err() {
                return None;
            }
        }
    }
}
