use std::fmt;
use std::time::Duration;

use anyhow::Result;

use crate::handoff::Completion;
use crate::resolve::Backend;
use crate::resolve::BackendImpl;
use crate::resolve::Dispatch;
use crate::resolve::PollHandle;
use crate::resolve::SharedContext;
use crate::state::AsyncResolutionState;

/// Plugs a user-supplied [`Backend`] into a [`crate::ResolverHandle`].
pub struct CustomBackend {
    inner: Box<dyn Backend>,
}

impl CustomBackend {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }
}

impl fmt::Debug for CustomBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomBackend").finish_non_exhaustive()
    }
}

impl Backend for CustomBackend {
    fn init(&mut self, context: Option<&SharedContext>) -> Result<()> {
        self.inner.init(context)
    }

    fn cleanup(&mut self) {
        self.inner.cleanup();
    }

    fn duplicate(&self) -> Result<BackendImpl> {
        self.inner.duplicate()
    }

    fn resolve(&self, completion: Completion) -> Result<Dispatch> {
        self.inner.resolve(completion)
    }

    fn cancel(&self, state: &AsyncResolutionState) {
        self.inner.cancel(state);
    }

    fn pollable_handles(&self, state: &AsyncResolutionState) -> Vec<PollHandle> {
        self.inner.pollable_handles(state)
    }

    fn is_resolved(&self, state: &AsyncResolutionState) -> bool {
        self.inner.is_resolved(state)
    }

    fn wait_resolved(&self, state: &AsyncResolutionState, timeout: Duration) -> bool {
        self.inner.wait_resolved(state, timeout)
    }
}
