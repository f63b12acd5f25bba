//! Backends and collaborators driven by tests.

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::connection::ConnectionSetup;
use crate::handoff::Completion;
use crate::resolve::provider::CustomBackend;
use crate::resolve::Backend;
use crate::resolve::BackendImpl;
use crate::resolve::Dispatch;
use crate::resolve::SharedContext;

// ManualBackend --------------------------------------------------------------

#[derive(Default)]
struct ParkedInner {
    completions: Mutex<Vec<Completion>>,
    inits: AtomicUsize,
    cleanups: AtomicUsize,
    context: Mutex<Option<String>>,
}

/// Test-side view of a [`ManualBackend`].
#[derive(Clone, Default)]
pub(crate) struct Parked {
    inner: Arc<ParkedInner>,
}

impl Parked {
    /// Oldest parked completion.
    pub(crate) fn take(&self) -> Completion {
        let mut completions = self.inner.completions.lock();
        assert!(!completions.is_empty(), "no parked completion");
        completions.remove(0)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.completions.lock().len()
    }

    pub(crate) fn inits(&self) -> usize {
        self.inner.inits.load(Ordering::SeqCst)
    }

    pub(crate) fn cleanups(&self) -> usize {
        self.inner.cleanups.load(Ordering::SeqCst)
    }

    pub(crate) fn context(&self) -> Option<String> {
        self.inner.context.lock().clone()
    }
}

/// Parks every completion until the test completes it.
pub(crate) struct ManualBackend {
    parked: Parked,
}

impl ManualBackend {
    pub(crate) fn new() -> (Self, Parked) {
        let parked = Parked::default();
        let backend = Self {
            parked: parked.clone(),
        };
        (backend, parked)
    }
}

impl Backend for ManualBackend {
    fn init(&mut self, context: Option<&SharedContext>) -> Result<()> {
        self.parked.inner.inits.fetch_add(1, Ordering::SeqCst);
        if let Some(value) = context.and_then(SharedContext::downcast::<String>) {
            *self.parked.inner.context.lock() = Some(value.as_ref().clone());
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.parked.inner.cleanups.fetch_add(1, Ordering::SeqCst);
        let drained: Vec<_> = self.parked.inner.completions.lock().drain(..).collect();
        drop(drained);
    }

    fn duplicate(&self) -> Result<BackendImpl> {
        let (mut copy, _parked) = ManualBackend::new();
        copy.init(None)?;
        Ok(CustomBackend::new(copy).into())
    }

    fn resolve(&self, completion: Completion) -> Result<Dispatch> {
        self.parked.inner.completions.lock().push(completion);
        Ok(Dispatch::Pending)
    }
}

// FailingInit ----------------------------------------------------------------

/// Grabs a tracked resource in `init` and then fails.
pub(crate) struct FailingInit {
    resource: Arc<()>,
    held: Option<Arc<()>>,
    cleanups: Arc<AtomicUsize>,
}

impl FailingInit {
    pub(crate) fn new() -> Self {
        Self {
            resource: Arc::new(()),
            held: None,
            cleanups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn resource(&self) -> Arc<()> {
        Arc::clone(&self.resource)
    }

    pub(crate) fn cleanups(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.cleanups)
    }
}

impl Backend for FailingInit {
    fn init(&mut self, _context: Option<&SharedContext>) -> Result<()> {
        self.held = Some(Arc::clone(&self.resource));
        bail!("backend refused to start");
    }

    fn cleanup(&mut self) {
        self.held = None;
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }

    fn duplicate(&self) -> Result<BackendImpl> {
        bail!("FailingInit cannot be duplicated");
    }

    fn resolve(&self, _completion: Completion) -> Result<Dispatch> {
        bail!("FailingInit cannot resolve");
    }
}

// RecordingSetup -------------------------------------------------------------

/// Connection setup that records calls and yields the first peer address.
#[derive(Default)]
pub(crate) struct RecordingSetup {
    fail: bool,
    setups: AtomicUsize,
    disconnects: Mutex<Vec<bool>>,
}

impl RecordingSetup {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnects(&self) -> Vec<bool> {
        self.disconnects.lock().clone()
    }
}

#[async_trait]
impl ConnectionSetup for RecordingSetup {
    type Transport = SocketAddr;

    async fn setup(&self, connection: &Connection) -> Result<SocketAddr> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("handshake refused");
        }
        connection
            .dns_entry()
            .and_then(|entry| entry.addrs().first())
            .context("connection has no address")
    }

    async fn disconnect(&self, _connection: &mut Connection, graceful: bool) {
        self.disconnects.lock().push(graceful);
    }
}
