use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::sync::Weak;
use std::thread;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use self::wakeup::Wakeup;
use self::wakeup::Waker;
use super::ip_literal;
use crate::handoff::Completion;
use crate::resolve::AddressResult;
use crate::resolve::Backend;
use crate::resolve::BackendImpl;
use crate::resolve::Dispatch;
use crate::resolve::PollHandle;
use crate::resolve::SharedContext;
use crate::state::AsyncResolutionState;
use crate::state::LookupId;
use crate::state::ResolveStatus;

/// Wakeup channel of one pending lookup.
#[derive(Debug)]
struct Channel {
    state: Weak<AsyncResolutionState>,
    wakeup: Wakeup,
}

/// Resolves with the operating system resolver, one worker thread per
/// lookup. The worker runs the completion handoff itself.
///
/// Every dispatched lookup gets its own wakeup channel. Its pollable handle
/// turns readable once the handoff is done and stays readable until
/// [`Backend::is_resolved`] reports the lookup resolved, which retires the
/// channel. Channels of lookups whose state was dropped are pruned on the
/// next dispatch.
///
/// A running OS lookup cannot be interrupted. Cancelling marks the lookup
/// and the worker discards its result when it finishes.
#[derive(Debug, Default)]
pub struct ThreadedBackend {
    initialized: bool,
    channels: Mutex<HashMap<LookupId, Channel>>,
}

impl Backend for ThreadedBackend {
    fn init(&mut self, context: Option<&SharedContext>) -> Result<()> {
        if context.is_some() {
            bail!("threaded backend does not take a shared context");
        }
        self.initialized = true;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.initialized = false;
        self.channels.get_mut().clear();
    }

    fn duplicate(&self) -> Result<BackendImpl> {
        let mut copy = ThreadedBackend::default();
        copy.init(None)?;
        Ok(copy.into())
    }

    fn resolve(&self, completion: Completion) -> Result<Dispatch> {
        if !self.initialized {
            bail!("threaded backend used before init");
        }

        if let Some(ip) = ip_literal(completion.hostname()) {
            let result = AddressResult::from_ips([ip], completion.port());
            return Ok(Dispatch::Ready { result, completion });
        }

        let wakeup = Wakeup::new().context("unable to create resolver wakeup channel")?;
        let waker = wakeup.waker();
        let id = completion.id();
        {
            let mut channels = self.channels.lock();
            channels.retain(|_, channel| channel.state.strong_count() > 0);
            let state = Arc::downgrade(completion.state());
            channels.insert(id, Channel { state, wakeup });
        }

        let spawned = thread::Builder::new()
            .name(format!("hostasync-resolve-{id}"))
            .spawn(move || lookup(completion, &waker));
        if let Err(error) = spawned {
            self.channels.lock().remove(&id);
            return Err(anyhow::Error::new(error).context("unable to spawn resolver thread"));
        }
        Ok(Dispatch::Pending)
    }

    fn pollable_handles(&self, state: &AsyncResolutionState) -> Vec<PollHandle> {
        self.channels
            .lock()
            .get(&state.id())
            .and_then(|channel| channel.wakeup.handle())
            .into_iter()
            .collect()
    }

    fn is_resolved(&self, state: &AsyncResolutionState) -> bool {
        if !state.is_done() {
            return false;
        }
        self.channels.lock().remove(&state.id());
        true
    }
}

fn lookup(completion: Completion, waker: &Waker) {
    let host = completion.hostname().to_owned();
    let port = completion.port();

    let status = if completion.is_cancelled() {
        completion.complete(ResolveStatus::Cancelled, None)
    } else {
        match (host.as_str(), port).to_socket_addrs() {
            Ok(addrs) => {
                let result: AddressResult = addrs.collect();
                if result.is_empty() {
                    completion.complete(ResolveStatus::Failure, None)
                } else {
                    completion.complete(ResolveStatus::Success, Some(result))
                }
            }
            Err(error) => {
                debug!(%host, port, %error, "OS resolver failed");
                completion.complete(ResolveStatus::Failure, None)
            }
        }
    };

    trace!(%host, port, %status, "threaded lookup finished");
    waker.wake();
}

#[cfg(unix)]
mod wakeup {
    use std::io;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use crate::resolve::PollHandle;

    /// Socket pair whose read end becomes readable after the handoff.
    #[derive(Debug)]
    pub(super) struct Wakeup {
        reader: UnixStream,
        writer: Arc<UnixStream>,
    }

    #[derive(Debug, Clone)]
    pub(super) struct Waker(Arc<UnixStream>);

    impl Wakeup {
        pub(super) fn new() -> io::Result<Self> {
            let (reader, writer) = UnixStream::pair()?;
            reader.set_nonblocking(true)?;
            writer.set_nonblocking(true)?;
            Ok(Self {
                reader,
                writer: Arc::new(writer),
            })
        }

        pub(super) fn waker(&self) -> Waker {
            Waker(Arc::clone(&self.writer))
        }

        #[allow(clippy::unnecessary_wraps)]
        pub(super) fn handle(&self) -> Option<PollHandle> {
            Some(PollHandle::new(self.reader.as_raw_fd()))
        }
    }

    impl Waker {
        pub(super) fn wake(&self) {
            // The reader may already be retired.
            let _ = (&*self.0).write(&[1]);
        }
    }
}

#[cfg(not(unix))]
mod wakeup {
    use std::io;

    use crate::resolve::PollHandle;

    #[derive(Debug)]
    pub(super) struct Wakeup;

    #[derive(Debug, Clone)]
    pub(super) struct Waker;

    impl Wakeup {
        #[allow(clippy::unnecessary_wraps)]
        pub(super) fn new() -> io::Result<Self> {
            Ok(Self)
        }

        pub(super) fn waker(&self) -> Waker {
            Waker
        }

        pub(super) fn handle(&self) -> Option<PollHandle> {
            None
        }
    }

    impl Waker {
        pub(super) fn wake(&self) {}
    }
}
