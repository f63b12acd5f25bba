use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::handoff::Completion;
use crate::resolve::provider::ThreadedBackend;
use crate::resolve::Backend;
use crate::resolve::BackendImpl;
use crate::resolve::Dispatch;
use crate::resolve::PollHandle;
use crate::resolve::SharedContext;
use crate::state::AsyncResolutionState;
use crate::Error;
use crate::Result;

/// Owns one initialized backend for its whole lifetime.
///
/// Cleanup runs exactly once, on [`ResolverHandle::destroy`] or on drop.
#[derive(Debug)]
pub struct ResolverHandle {
    backend: BackendImpl,
    live: bool,
}

impl ResolverHandle {
    /// Initializes `backend` and wraps it.
    ///
    /// # Errors
    ///
    /// [`Error::Initialization`] if the backend fails to start. The backend
    /// is cleaned up before returning.
    pub fn create(backend: impl Into<BackendImpl>) -> Result<Self> {
        Self::build(backend.into(), None)
    }

    /// Like [`ResolverHandle::create`], but seeds the backend with shared
    /// state instead of letting it create its own.
    ///
    /// # Errors
    ///
    /// [`Error::Initialization`] if the backend rejects the context or fails
    /// to start.
    pub fn create_with_context(
        backend: impl Into<BackendImpl>,
        context: SharedContext,
    ) -> Result<Self> {
        Self::build(backend.into(), Some(&context))
    }

    /// Handle over the threaded OS resolver.
    ///
    /// # Errors
    ///
    /// If the backend fails to start.
    pub fn default_resolver() -> Result<Self> {
        Self::create(ThreadedBackend::default())
    }

    fn build(mut backend: BackendImpl, context: Option<&SharedContext>) -> Result<Self> {
        if let Err(error) = backend.init(context) {
            warn!(backend = backend.kind(), ?error, "resolver backend failed to initialize");
            backend.cleanup();
            return Err(Error::Initialization(error));
        }
        debug!(backend = backend.kind(), "resolver backend initialized");
        Ok(Self {
            backend,
            live: true,
        })
    }

    /// Cleans up the backend and releases the handle.
    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.live {
            self.live = false;
            self.backend.cleanup();
            debug!(backend = self.backend.kind(), "resolver backend cleaned up");
        }
    }

    /// Raw backend state, for callers that need backend-specific access.
    #[must_use]
    pub fn userdata(&self) -> &BackendImpl {
        &self.backend
    }

    /// A new handle over an independent copy of the backend.
    ///
    /// # Errors
    ///
    /// [`Error::Initialization`] if the copy fails to start.
    pub fn duplicate(&self) -> Result<Self> {
        let backend = self.backend.duplicate().map_err(Error::Initialization)?;
        Ok(Self {
            backend,
            live: true,
        })
    }

    /// Forwards a lookup to the backend.
    ///
    /// # Errors
    ///
    /// [`Error::Dispatch`] if the backend cannot start the lookup.
    pub fn resolve(&self, completion: Completion) -> Result<Dispatch> {
        let host = completion.hostname().to_owned();
        let port = completion.port();
        self.backend
            .resolve(completion)
            .map_err(|source| Error::Dispatch { host, port, source })
    }

    pub fn cancel(&self, state: &AsyncResolutionState) {
        self.backend.cancel(state);
    }

    #[must_use]
    pub fn pollable_handles(&self, state: &AsyncResolutionState) -> Vec<PollHandle> {
        self.backend.pollable_handles(state)
    }

    #[must_use]
    pub fn is_resolved(&self, state: &AsyncResolutionState) -> bool {
        self.backend.is_resolved(state)
    }

    pub fn wait_resolved(&self, state: &AsyncResolutionState, timeout: Duration) -> bool {
        self.backend.wait_resolved(state, timeout)
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}
