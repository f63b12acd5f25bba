//! Completion handoff.
//!
//! A backend receives one [`Completion`] per lookup and gives the result
//! back through it, from whatever thread or task finished the lookup. The
//! token moves the [`AddressResult`] into the cache under its lock, records
//! the outcome in the connection's [`AsyncResolutionState`] and sets `done`
//! last.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::cache::SharedDnsCache;
use crate::resolve::AddressResult;
use crate::state::AsyncResolutionState;
use crate::state::LookupId;
use crate::state::ResolveStatus;

/// Move-only token for publishing the outcome of one lookup.
///
/// [`Completion::complete`] consumes the token, so a lookup is published at
/// most once. A token dropped without being completed publishes
/// [`ResolveStatus::Cancelled`], so a waiting connection always observes
/// `done`.
#[must_use = "dropping a completion cancels the lookup"]
pub struct Completion {
    state: Arc<AsyncResolutionState>,
    cache: SharedDnsCache,
    armed: bool,
}

impl Completion {
    pub(crate) fn new(state: Arc<AsyncResolutionState>, cache: SharedDnsCache) -> Self {
        Self {
            state,
            cache,
            armed: true,
        }
    }

    pub(crate) fn state(&self) -> &Arc<AsyncResolutionState> {
        &self.state
    }

    #[must_use]
    pub fn id(&self) -> LookupId {
        self.state.id()
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        self.state.hostname()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.state.port()
    }

    /// Whether the lookup was cancelled. Backends may use this to skip work;
    /// completing a cancelled lookup is still allowed and discards the result.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Publishes the outcome of the lookup and returns the final status.
    ///
    /// Ownership of `result` moves in unconditionally. It ends up either in
    /// the cache or released here. The returned status differs from `status`
    /// when a success cannot be stored ([`ResolveStatus::OutOfMemory`]) or
    /// when the lookup was cancelled first ([`ResolveStatus::Cancelled`]).
    pub fn complete(
        mut self,
        status: ResolveStatus,
        result: Option<AddressResult>,
    ) -> ResolveStatus {
        self.armed = false;
        on_resolved(&self.state, &self.cache, status, result)
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                lookup = self.state.id(),
                host = self.state.hostname(),
                "completion dropped without a result"
            );
            on_resolved(&self.state, &self.cache, ResolveStatus::Cancelled, None);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.state.id())
            .field("hostname", &self.state.hostname())
            .field("port", &self.state.port())
            .finish_non_exhaustive()
    }
}

fn on_resolved(
    state: &AsyncResolutionState,
    cache: &SharedDnsCache,
    status: ResolveStatus,
    result: Option<AddressResult>,
) -> ResolveStatus {
    if !state.claim() {
        if let Some(result) = result {
            result.release();
        }
        debug!(
            lookup = state.id(),
            host = state.hostname(),
            "lookup already cancelled, discarding outcome"
        );
        return ResolveStatus::Cancelled;
    }

    let (status, entry) = match (status, result) {
        (ResolveStatus::Success, Some(result)) => {
            let key = state.key();
            let inserted = cache.lock().insert(key, result);
            match inserted {
                Ok(entry) => {
                    trace!(
                        key = %entry.key(),
                        addrs = %entry.addrs(),
                        "cached resolved addresses"
                    );
                    (ResolveStatus::Success, Some(entry))
                }
                Err(error) => {
                    warn!(%error, "unable to cache resolved addresses");
                    error.into_result().release();
                    (ResolveStatus::OutOfMemory, None)
                }
            }
        }
        (ResolveStatus::Success, None) => {
            warn!(
                host = state.hostname(),
                "backend reported success without addresses"
            );
            (ResolveStatus::OutOfMemory, None)
        }
        (ResolveStatus::Pending, result) => {
            warn!(
                host = state.hostname(),
                "backend completed a lookup as pending, treating as failure"
            );
            if let Some(result) = result {
                result.release();
            }
            (ResolveStatus::Failure, None)
        }
        (status, result) => {
            if let Some(result) = result {
                result.release();
            }
            (status, None)
        }
    };

    state.publish(status, entry);
    status
}
