mod tcp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use tracing::instrument;

pub use self::tcp::TcpSetup;
use crate::cache::DnsEntry;
use crate::resolve::PollHandle;
use crate::resolve::ResolverHandle;
use crate::state::AsyncResolutionState;
use crate::state::ResolveStatus;
use crate::Error;
use crate::Result;

/// Brings a resolved connection up to a usable transport.
#[async_trait]
pub trait ConnectionSetup: Send + Sync {
    type Transport: Send;

    /// Performs the network handshake using the connection's resolved
    /// addresses.
    async fn setup(&self, connection: &Connection) -> anyhow::Result<Self::Transport>;

    /// Tears down whatever `setup` left behind.
    async fn disconnect(&self, connection: &mut Connection, graceful: bool);
}

/// A connection whose setup finished after resolution.
#[derive(Debug)]
pub struct ProtocolReady<T> {
    pub connection: Connection,
    pub transport: T,
}

/// A connection waiting on, or done with, name resolution.
pub struct Connection {
    state: Arc<AsyncResolutionState>,
    resolver: Arc<ResolverHandle>,
    dns_entry: Option<Arc<DnsEntry>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("hostname", &self.state.hostname())
            .field("port", &self.state.port())
            .field("status", &self.state.status())
            .field("dns_entry", &self.dns_entry)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(state: Arc<AsyncResolutionState>, resolver: Arc<ResolverHandle>) -> Self {
        Self {
            state,
            resolver,
            dns_entry: None,
        }
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        self.state.hostname()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.state.port()
    }

    #[must_use]
    pub fn state(&self) -> &AsyncResolutionState {
        &self.state
    }

    /// The cache entry this connection is using, once resumed.
    #[must_use]
    pub fn dns_entry(&self) -> Option<&Arc<DnsEntry>> {
        self.dns_entry.as_ref()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolver.is_resolved(&self.state)
    }

    #[must_use]
    pub fn pollable_handles(&self) -> Vec<PollHandle> {
        self.resolver.pollable_handles(&self.state)
    }

    pub fn wait_resolved(&self, timeout: Duration) -> bool {
        self.resolver.wait_resolved(&self.state, timeout)
    }

    pub async fn resolved(&self) {
        self.state.resolved().await;
    }

    pub fn cancel(&self) {
        self.resolver.cancel(&self.state);
    }

    /// Continues a connection whose resolution is done.
    ///
    /// Moves the resolved cache entry into the connection and runs `setup`.
    /// Consumes the connection, so it runs at most once. On any failure the
    /// connection is disconnected and released before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotResolved`] if resolution has not completed
    /// - [`Error::ResolutionFailure`], [`Error::OutOfMemory`] or
    ///   [`Error::Cancelled`] per the resolution outcome, without attempting
    ///   setup
    /// - [`Error::Setup`] if `setup` fails
    #[instrument(skip_all, fields(host = %self.state.hostname(), port = self.state.port()))]
    pub async fn resume<S>(mut self, setup: &S) -> Result<ProtocolReady<S::Transport>>
    where
        S: ConnectionSetup + ?Sized,
    {
        let host = self.state.hostname().to_owned();
        let port = self.state.port();

        let error = match self.state.status() {
            ResolveStatus::Success => None,
            ResolveStatus::Pending => Some(Error::NotResolved { host, port }),
            ResolveStatus::Failure => Some(Error::ResolutionFailure { host, port }),
            ResolveStatus::OutOfMemory => Some(Error::OutOfMemory { host, port }),
            ResolveStatus::Cancelled => Some(Error::Cancelled { host, port }),
        };
        if let Some(error) = error {
            return Err(self.abandon(setup, error).await);
        }

        if let Some(entry) = self.state.take_entry() {
            self.dns_entry = Some(entry);
        }

        match setup.setup(&self).await {
            Ok(transport) => {
                debug!("connection setup complete");
                Ok(ProtocolReady {
                    connection: self,
                    transport,
                })
            }
            Err(source) => {
                let error = Error::Setup {
                    host: self.state.hostname().to_owned(),
                    port: self.state.port(),
                    source,
                };
                Err(self.abandon(setup, error).await)
            }
        }
    }

    async fn abandon<S>(mut self, setup: &S, error: Error) -> Error
    where
        S: ConnectionSetup + ?Sized,
    {
        debug!(%error, "tearing down connection");
        self.resolver.cancel(&self.state);
        setup.disconnect(&mut self, false).await;
        self.dns_entry = None;
        error
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::client::Client;
    use crate::client::ClientConfig;
    use crate::resolve::provider::CustomBackend;
    use crate::testing::ManualBackend;
    use crate::testing::Parked;
    use crate::testing::RecordingSetup;

    fn client() -> (Client, Parked) {
        let (backend, parked) = ManualBackend::new();
        let handle = ResolverHandle::create(CustomBackend::new(backend)).unwrap();
        (Client::new(handle, ClientConfig::default()), parked)
    }

    fn one_addr() -> crate::AddressResult {
        vec!["192.0.2.10:443".parse::<SocketAddr>().unwrap()].into()
    }

    #[tokio::test]
    async fn successful_lookup_reaches_protocol_ready() {
        let (client, parked) = client();
        let connection = client.connect("example.test", 443).unwrap();
        assert!(!connection.is_resolved());

        parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));
        assert!(connection.is_resolved());

        assert_eq!(client.cache().len(), 1);
        let cached = client
            .cache()
            .get(&connection.state().key())
            .unwrap();
        assert!(Arc::ptr_eq(&cached, &connection.state().entry().unwrap()));

        let setup = RecordingSetup::default();
        let ready = connection.resume(&setup).await.unwrap();

        assert_eq!(ready.transport, "192.0.2.10:443".parse().unwrap());
        assert!(Arc::ptr_eq(ready.connection.dns_entry().unwrap(), &cached));
        assert!(ready.connection.state().entry().is_none());
        assert_eq!(setup.setups(), 1);
        assert!(setup.disconnects().is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_disconnects_without_setup() {
        let (client, parked) = client();
        let connection = client.connect("missing.test", 443).unwrap();
        parked.take().complete(ResolveStatus::Failure, None);

        let setup = RecordingSetup::default();
        let error = connection.resume(&setup).await.unwrap_err();

        assert!(matches!(error, Error::ResolutionFailure { ref host, port: 443 } if host == "missing.test"));
        assert_eq!(error.to_string(), "could not resolve host: missing.test");
        assert_eq!(setup.setups(), 0);
        assert_eq!(setup.disconnects(), vec![false]);
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn setup_failure_tears_down() {
        let (client, parked) = client();
        let connection = client.connect("example.test", 443).unwrap();
        parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));

        let setup = RecordingSetup::failing();
        let error = connection.resume(&setup).await.unwrap_err();

        assert!(matches!(error, Error::Setup { .. }));
        assert_eq!(setup.setups(), 1);
        assert_eq!(setup.disconnects(), vec![false]);

        let cached = client
            .cache()
            .get(&crate::CacheKey::new("example.test", 443))
            .unwrap();
        assert_eq!(Arc::strong_count(&cached), 2);
    }

    #[tokio::test]
    async fn resume_before_done_cancels_lookup() {
        let (client, parked) = client();
        let connection = client.connect("example.test", 443).unwrap();
        let state = Arc::clone(&connection.state);

        let setup = RecordingSetup::default();
        let error = connection.resume(&setup).await.unwrap_err();

        assert!(matches!(error, Error::NotResolved { .. }));
        assert_eq!(setup.setups(), 0);
        assert_eq!(state.status(), ResolveStatus::Cancelled);

        let late = parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));
        assert_eq!(late, ResolveStatus::Cancelled);
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn two_connections_share_one_entry() {
        let (client, parked) = client();
        let a = client.connect("example.test", 443).unwrap();
        let b = client.connect("EXAMPLE.test", 443).unwrap();
        assert_eq!(parked.len(), 2);

        let first = parked.take();
        let second = parked.take();
        let threads = [first, second].map(|completion| {
            std::thread::spawn(move || completion.complete(ResolveStatus::Success, Some(one_addr())))
        });
        for thread in threads {
            assert_eq!(thread.join().unwrap(), ResolveStatus::Success);
        }

        let setup = RecordingSetup::default();
        let a = a.resume(&setup).await.unwrap();
        let b = b.resume(&setup).await.unwrap();
        assert_eq!(client.cache().len(), 1);
        assert!(Arc::ptr_eq(
            a.connection.dns_entry().unwrap(),
            b.connection.dns_entry().unwrap()
        ));
    }

    #[tokio::test]
    async fn cache_hit_skips_backend() {
        let (client, parked) = client();
        let first = client.connect("example.test", 443).unwrap();
        parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));
        assert!(first.is_resolved());

        let second = client.connect("example.test", 443).unwrap();
        assert_eq!(parked.len(), 0);
        assert!(second.is_resolved());
        assert_eq!(second.state().status(), ResolveStatus::Success);
    }

    #[tokio::test]
    async fn private_caches_are_not_shared() {
        let (backend, parked) = ManualBackend::new();
        let handle = ResolverHandle::create(CustomBackend::new(backend)).unwrap();
        let config = ClientConfig::builder().shared_cache(false).build();
        let client = Client::new(handle, config);

        let first = client.connect("example.test", 443).unwrap();
        parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));
        assert!(first.is_resolved());

        let second = client.connect("example.test", 443).unwrap();
        assert_eq!(parked.len(), 1);
        parked
            .take()
            .complete(ResolveStatus::Success, Some(one_addr()));
        assert!(second.is_resolved());

        assert!(client.cache().is_empty());
        let first_entry = first.state().entry().unwrap();
        let second_entry = second.state().entry().unwrap();
        assert!(!Arc::ptr_eq(&first_entry, &second_entry));
    }
}
