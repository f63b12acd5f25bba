use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use hickory_resolver::TokioResolver;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::task::AbortHandle;
use tracing::debug;
use tracing::trace;

use super::ip_literal;
use crate::handoff::Completion;
use crate::resolve::AddressResult;
use crate::resolve::Backend;
use crate::resolve::BackendImpl;
use crate::resolve::Dispatch;
use crate::resolve::SharedContext;
use crate::state::AsyncResolutionState;
use crate::state::LookupId;
use crate::state::ResolveStatus;

type Tasks = Arc<Mutex<HashMap<LookupId, AbortHandle>>>;

/// A tokio runtime and a DNS resolver bound to it.
///
/// Pass one to [`crate::ResolverHandle::create_with_context`] to share a
/// single loop across every handle of a client session.
#[derive(Debug, Clone)]
pub struct EventLoop {
    runtime: Handle,
    resolver: TokioResolver,
}

impl EventLoop {
    /// Builds a resolver from the system DNS config on `runtime`.
    ///
    /// # Errors
    ///
    /// - If the system resolver config fails to build.
    pub fn try_new(runtime: Handle) -> Result<Self> {
        let _guard = runtime.enter();
        let resolver = TokioResolver::builder_tokio()?.build();
        Ok(Self { runtime, resolver })
    }

    /// Like [`EventLoop::try_new`] on the runtime of the calling task.
    ///
    /// # Errors
    ///
    /// - If called outside a tokio runtime
    /// - If the system resolver config fails to build
    pub fn try_current() -> Result<Self> {
        let runtime = Handle::try_current().context("no tokio runtime is running")?;
        Self::try_new(runtime)
    }

    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

/// Resolves DNS queries as tasks on a tokio event loop.
///
/// Without a shared [`EventLoop`] the backend starts a private runtime and
/// shuts it down on cleanup.
#[derive(Debug, Default)]
pub struct EventLoopBackend {
    event_loop: Option<Arc<EventLoop>>,
    owned: Option<Runtime>,
    tasks: Tasks,
}

impl Backend for EventLoopBackend {
    fn init(&mut self, context: Option<&SharedContext>) -> Result<()> {
        if self.event_loop.is_some() {
            bail!("event loop backend is already initialized");
        }

        if let Some(context) = context {
            let event_loop = context
                .downcast::<EventLoop>()
                .context("shared context is not an EventLoop")?;
            self.event_loop = Some(event_loop);
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("hostasync-event-loop")
            .enable_all()
            .build()
            .context("unable to start resolver runtime")?;
        let event_loop = EventLoop::try_new(runtime.handle().clone())?;
        self.event_loop = Some(Arc::new(event_loop));
        self.owned = Some(runtime);
        Ok(())
    }

    fn cleanup(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
        self.event_loop = None;
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }

    fn duplicate(&self) -> Result<BackendImpl> {
        let mut copy = EventLoopBackend::default();
        match (&self.event_loop, &self.owned) {
            (Some(event_loop), None) => {
                let fresh = EventLoop::try_new(event_loop.runtime.clone())?;
                copy.init(Some(&SharedContext::new(fresh)))?;
            }
            _ => copy.init(None)?,
        }
        Ok(copy.into())
    }

    fn resolve(&self, completion: Completion) -> Result<Dispatch> {
        let Some(event_loop) = &self.event_loop else {
            bail!("event loop backend used before init");
        };

        if let Some(ip) = ip_literal(completion.hostname()) {
            let result = AddressResult::from_ips([ip], completion.port());
            return Ok(Dispatch::Ready { result, completion });
        }

        let id = completion.id();
        let resolver = event_loop.resolver.clone();
        let tasks = Arc::clone(&self.tasks);

        // Hold the map while spawning so the task cannot remove itself first.
        let mut running = self.tasks.lock();
        let task = event_loop
            .runtime
            .spawn(lookup(resolver, completion, tasks));
        running.insert(id, task.abort_handle());
        Ok(Dispatch::Pending)
    }

    fn cancel(&self, state: &AsyncResolutionState) {
        state.cancel();
        if let Some(task) = self.tasks.lock().remove(&state.id()) {
            task.abort();
        }
    }
}

async fn lookup(resolver: TokioResolver, completion: Completion, tasks: Tasks) {
    let id = completion.id();
    let host = completion.hostname().to_owned();
    let port = completion.port();

    if completion.is_cancelled() {
        completion.complete(ResolveStatus::Cancelled, None);
        tasks.lock().remove(&id);
        return;
    }

    let status = match resolver.lookup_ip(host.as_str()).await {
        Ok(ips) => {
            let result = AddressResult::from_ips(ips.iter(), port);
            if result.is_empty() {
                completion.complete(ResolveStatus::Failure, None)
            } else {
                completion.complete(ResolveStatus::Success, Some(result))
            }
        }
        Err(error) => {
            debug!(%host, port, %error, "DNS lookup failed");
            completion.complete(ResolveStatus::Failure, None)
        }
    };

    trace!(%host, port, %status, "event loop lookup finished");
    tasks.lock().remove(&id);
}
