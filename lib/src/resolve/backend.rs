use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use enum_dispatch::enum_dispatch;

use crate::handoff::Completion;
use crate::resolve::provider::CustomBackend;
use crate::resolve::provider::EventLoopBackend;
use crate::resolve::provider::ThreadedBackend;
use crate::resolve::AddressResult;
use crate::state::AsyncResolutionState;

/// What a backend did with a lookup.
#[derive(Debug)]
pub enum Dispatch {
    /// Answered synchronously. The completion is handed back untouched so the
    /// caller runs the handoff on its own thread.
    Ready {
        result: AddressResult,
        completion: Completion,
    },
    /// The backend kept the completion and will complete it later.
    Pending,
}

#[cfg(unix)]
pub type RawHandle = std::os::fd::RawFd;
#[cfg(windows)]
pub type RawHandle = std::os::windows::io::RawSocket;

/// A descriptor an external event loop can wait on for readability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollHandle(RawHandle);

impl PollHandle {
    #[must_use]
    pub fn new(raw: RawHandle) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> RawHandle {
        self.0
    }
}

/// Backend state seeded from outside, e.g. one event loop shared by every
/// handle of a client session.
#[derive(Clone)]
pub struct SharedContext(Arc<dyn Any + Send + Sync>);

impl SharedContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext").finish_non_exhaustive()
    }
}

/// Capabilities every resolver backend provides.
///
/// Lookups are started with [`Backend::resolve`], which receives the
/// [`Completion`] for that lookup. Whichever thread or task finishes the
/// lookup completes it.
#[enum_dispatch]
pub trait Backend: Send + Sync {
    // Required

    /// Acquires backend resources. `context` is present when the handle was
    /// built with [`crate::ResolverHandle::create_with_context`].
    ///
    /// # Errors
    ///
    /// If the backend cannot start. [`Backend::cleanup`] is still called.
    fn init(&mut self, context: Option<&SharedContext>) -> Result<()>;

    /// Releases everything acquired by [`Backend::init`]. Must tolerate a
    /// partially initialized backend.
    fn cleanup(&mut self);

    /// Builds an independent, initialized copy for another handle.
    ///
    /// # Errors
    ///
    /// If the copy fails to initialize.
    fn duplicate(&self) -> Result<BackendImpl>;

    /// Starts a lookup for the completion's hostname and port.
    ///
    /// # Errors
    ///
    /// If the lookup cannot be started. A completion dropped along the way
    /// publishes `Cancelled`.
    fn resolve(&self, completion: Completion) -> Result<Dispatch>;

    // Defaults

    /// Aborts an in-flight lookup. Safe to call more than once and
    /// concurrently with the lookup's completion.
    fn cancel(&self, state: &AsyncResolutionState) {
        state.cancel();
    }

    /// Descriptors that become readable when a lookup may have finished.
    ///
    /// By default there are none and callers should poll or block.
    fn pollable_handles(&self, _state: &AsyncResolutionState) -> Vec<PollHandle> {
        Vec::new()
    }

    /// Non-blocking completion check.
    fn is_resolved(&self, state: &AsyncResolutionState) -> bool {
        state.is_done()
    }

    /// Blocks until the lookup is done or `timeout` elapses.
    fn wait_resolved(&self, state: &AsyncResolutionState, timeout: Duration) -> bool {
        state.wait(timeout)
    }
}

#[enum_dispatch(Backend)]
#[derive(Debug)]
pub enum BackendImpl {
    EventLoop(EventLoopBackend),
    Threaded(ThreadedBackend),
    Custom(CustomBackend),
}

impl BackendImpl {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EventLoop(_) => "event-loop",
            Self::Threaded(_) => "threaded",
            Self::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn shared_context_downcasts_to_seeded_type() {
        let context = SharedContext::new(Marker(7));
        assert_eq!(context.downcast::<Marker>().as_deref(), Some(&Marker(7)));
        assert!(context.downcast::<String>().is_none());
    }
}
