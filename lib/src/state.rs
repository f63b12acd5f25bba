//! Per-connection record of an in-flight lookup.
//!
//! `done` is the publication point. Every other field is written before it
//! with the completion thread's release store, and read only after a reader
//! has observed it with an acquire load.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::cache::CacheKey;
use crate::cache::DnsEntry;

pub type LookupId = u64;

static NEXT_LOOKUP_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of one lookup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResolveStatus {
    Pending = 0,
    Success = 1,
    Failure = 2,
    OutOfMemory = 3,
    Cancelled = 4,
}

impl ResolveStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Success,
            2 => Self::Failure,
            3 => Self::OutOfMemory,
            4 => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ResolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::OutOfMemory => "out of memory",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// Who gets to publish. Exactly one transition out of IN_FLIGHT succeeds.
const IN_FLIGHT: u8 = 0;
const PUBLISHING: u8 = 1;
const CANCELLED: u8 = 2;
const PUBLISHED: u8 = 3;

#[derive(Debug)]
pub struct AsyncResolutionState {
    id: LookupId,
    hostname: String,
    port: u16,
    phase: AtomicU8,
    status: AtomicU8,
    entry: Mutex<Option<Arc<DnsEntry>>>,
    done: AtomicBool,
    gate: Mutex<()>,
    cond: Condvar,
    notify: Notify,
}

impl AsyncResolutionState {
    #[must_use]
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            id: NEXT_LOOKUP_ID.fetch_add(1, Ordering::Relaxed),
            hostname: hostname.to_owned(),
            port,
            phase: AtomicU8::new(IN_FLIGHT),
            status: AtomicU8::new(ResolveStatus::Pending as u8),
            entry: Mutex::new(None),
            done: AtomicBool::new(false),
            gate: Mutex::new(()),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Builds an already completed state around a cache hit.
    pub(crate) fn from_cache(hostname: &str, port: u16, entry: Arc<DnsEntry>) -> Self {
        let state = Self::new(hostname, port);
        state.claim();
        state.publish(ResolveStatus::Success, Some(entry));
        state
    }

    #[must_use]
    pub fn id(&self) -> LookupId {
        self.id
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.hostname, self.port)
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// `Pending` until `done` is observed, then the final status.
    #[must_use]
    pub fn status(&self) -> ResolveStatus {
        if !self.is_done() {
            return ResolveStatus::Pending;
        }
        ResolveStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// The cache entry this lookup produced, if it completed successfully
    /// and the entry has not been taken by the connection yet.
    #[must_use]
    pub fn entry(&self) -> Option<Arc<DnsEntry>> {
        if !self.is_done() {
            return None;
        }
        self.entry.lock().clone()
    }

    pub(crate) fn take_entry(&self) -> Option<Arc<DnsEntry>> {
        if !self.is_done() {
            return None;
        }
        self.entry.lock().take()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELLED
    }

    /// Claims the right to publish a result. Fails once cancelled or
    /// already claimed.
    pub(crate) fn claim(&self) -> bool {
        self.phase
            .compare_exchange(IN_FLIGHT, PUBLISHING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Writes the outcome and sets `done` last. Callers must hold the claim,
    /// either from [`Self::claim`] or from a successful cancellation.
    pub(crate) fn publish(&self, status: ResolveStatus, entry: Option<Arc<DnsEntry>>) {
        debug_assert_eq!(entry.is_some(), status.is_success());
        debug_assert!(!self.is_done());

        self.status.store(status as u8, Ordering::Relaxed);
        *self.entry.lock() = entry;
        let _ = self.phase.compare_exchange(
            PUBLISHING,
            PUBLISHED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        self.done.store(true, Ordering::Release);

        {
            let _gate = self.gate.lock();
            self.cond.notify_all();
        }
        self.notify.notify_waiters();
    }

    /// Aborts the lookup if nothing has claimed it yet.
    ///
    /// Returns `true` when this call published the cancellation. If a
    /// handoff is already publishing, waits for it to finish and returns
    /// `false`. Any later call is a no-op.
    pub fn cancel(&self) -> bool {
        match self.phase.compare_exchange(
            IN_FLIGHT,
            CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.publish(ResolveStatus::Cancelled, None);
                true
            }
            Err(PUBLISHING) => {
                self.wait_forever();
                false
            }
            Err(_) => false,
        }
    }

    /// Blocks until `done` or until `timeout` elapses. Returns whether the
    /// lookup is done.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_done() {
            return true;
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_forever();
            return true;
        };

        let mut gate = self.gate.lock();
        while !self.is_done() {
            if self.cond.wait_until(&mut gate, deadline).timed_out() {
                return self.is_done();
            }
        }
        true
    }

    fn wait_forever(&self) {
        let mut gate = self.gate.lock();
        while !self.is_done() {
            self.cond.wait(&mut gate);
        }
    }

    /// Completes once `done` is set.
    pub async fn resolved(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::cache::SharedDnsCache;
    use crate::resolve::AddressResult;

    fn entry() -> Arc<DnsEntry> {
        let cache = SharedDnsCache::new(1);
        let result: AddressResult = vec!["192.0.2.1:443".parse().unwrap()].into();
        cache
            .insert(CacheKey::new("example.test", 443), result)
            .unwrap()
    }

    #[test]
    fn starts_pending() {
        let state = AsyncResolutionState::new("example.test", 443);
        assert!(!state.is_done());
        assert_eq!(state.status(), ResolveStatus::Pending);
        assert!(state.entry().is_none());
        assert!(!state.wait(Duration::from_millis(10)));
    }

    #[test]
    fn ids_are_unique() {
        let a = AsyncResolutionState::new("a.test", 1);
        let b = AsyncResolutionState::new("a.test", 1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn cancel_publishes_once() {
        let state = AsyncResolutionState::new("example.test", 443);
        assert!(state.cancel());
        assert!(state.is_done());
        assert!(state.is_cancelled());
        assert_eq!(state.status(), ResolveStatus::Cancelled);
        assert!(state.entry().is_none());

        assert!(!state.cancel());
        assert!(!state.claim());
    }

    #[test]
    fn cancel_after_publish_is_noop() {
        let state = AsyncResolutionState::new("example.test", 443);
        assert!(state.claim());
        state.publish(ResolveStatus::Success, Some(entry()));

        assert!(!state.cancel());
        assert_eq!(state.status(), ResolveStatus::Success);
        assert!(state.entry().is_some());
    }

    #[test]
    fn cancel_waits_for_publishing_handoff() {
        let state = Arc::new(AsyncResolutionState::new("example.test", 443));
        assert!(state.claim());

        let publisher = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                state.publish(ResolveStatus::Success, Some(entry()));
            })
        };

        assert!(!state.cancel());
        assert!(state.is_done());
        assert_eq!(state.status(), ResolveStatus::Success);
        publisher.join().unwrap();
    }

    #[test]
    fn wait_wakes_on_publish() {
        let state = Arc::new(AsyncResolutionState::new("example.test", 443));
        let publisher = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                assert!(state.claim());
                state.publish(ResolveStatus::Failure, None);
            })
        };

        assert!(state.wait(Duration::from_secs(5)));
        assert_eq!(state.status(), ResolveStatus::Failure);
        publisher.join().unwrap();
    }

    #[test]
    fn take_entry_empties_slot() {
        let state = AsyncResolutionState::from_cache("example.test", 443, entry());
        assert!(state.take_entry().is_some());
        assert!(state.take_entry().is_none());
        assert_eq!(state.status(), ResolveStatus::Success);
    }

    #[tokio::test]
    async fn resolved_wakes_async_waiter() {
        let state = Arc::new(AsyncResolutionState::new("example.test", 443));
        let publisher = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                state.cancel();
            })
        };

        tokio::time::timeout(Duration::from_secs(5), state.resolved())
            .await
            .unwrap();
        assert_eq!(state.status(), ResolveStatus::Cancelled);
        publisher.join().unwrap();
    }
}
