use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tracing::debug;
use tracing::instrument;

use crate::cache::CacheKey;
use crate::cache::SharedDnsCache;
use crate::cache::DEFAULT_CAPACITY;
use crate::connection::Connection;
use crate::handoff::Completion;
use crate::resolve::Dispatch;
use crate::resolve::ResolverHandle;
use crate::state::AsyncResolutionState;
use crate::state::ResolveStatus;
use crate::Result;

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-wide resolution settings.
#[derive(Debug, Clone, Builder)]
pub struct ClientConfig {
    /// Share one DNS cache across all connections. When off, every
    /// connection gets a private cache.
    #[builder(default = true)]
    shared_cache: bool,

    #[builder(default = DEFAULT_CAPACITY)]
    cache_capacity: usize,

    /// Bound used by [`Client::lookup`].
    #[builder(default = DEFAULT_RESOLVE_TIMEOUT)]
    resolve_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn shared_cache(&self) -> bool {
        self.shared_cache
    }

    #[must_use]
    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One resolver handle and one DNS cache serving many connections.
#[derive(Debug)]
pub struct Client {
    resolver: Arc<ResolverHandle>,
    cache: SharedDnsCache,
    config: ClientConfig,
}

impl Client {
    #[must_use]
    pub fn new(resolver: ResolverHandle, config: ClientConfig) -> Self {
        let cache = SharedDnsCache::new(config.cache_capacity);
        Self {
            resolver: Arc::new(resolver),
            cache,
            config,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &ResolverHandle {
        &self.resolver
    }

    #[must_use]
    pub fn cache(&self) -> &SharedDnsCache {
        &self.cache
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts resolving `hostname:port` for a new connection.
    ///
    /// A cached answer completes the connection's resolution immediately.
    /// Otherwise the lookup is dispatched to the backend and the returned
    /// connection can be polled, waited on or awaited.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Dispatch`] if the backend cannot start the lookup.
    #[instrument(skip(self))]
    pub fn connect(&self, hostname: &str, port: u16) -> Result<Connection> {
        let cache = if self.config.shared_cache {
            self.cache.clone()
        } else {
            SharedDnsCache::new(self.config.cache_capacity)
        };

        let key = CacheKey::new(hostname, port);
        if let Some(entry) = cache.get(&key) {
            debug!(%key, "dns cache hit");
            let state = AsyncResolutionState::from_cache(hostname, port, entry);
            return Ok(Connection::new(Arc::new(state), Arc::clone(&self.resolver)));
        }

        let state = Arc::new(AsyncResolutionState::new(hostname, port));
        let completion = Completion::new(Arc::clone(&state), cache);
        match self.resolver.resolve(completion)? {
            Dispatch::Ready { result, completion } => {
                let status = completion.complete(ResolveStatus::Success, Some(result));
                debug!(%status, "resolved synchronously");
            }
            Dispatch::Pending => debug!("resolution pending"),
        }

        Ok(Connection::new(state, Arc::clone(&self.resolver)))
    }

    /// Like [`Client::connect`], then waits up to the configured resolve
    /// timeout. A lookup still running at the deadline is cancelled.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Dispatch`] if the backend cannot start the lookup.
    pub async fn lookup(&self, hostname: &str, port: u16) -> Result<Connection> {
        let connection = self.connect(hostname, port)?;
        let deadline = self.config.resolve_timeout;
        if tokio::time::timeout(deadline, connection.resolved())
            .await
            .is_err()
        {
            debug!(hostname, port, ?deadline, "resolution timed out, cancelling");
            connection.cancel();
        }
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::provider::CustomBackend;
    use crate::testing::ManualBackend;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert!(config.shared_cache());
        assert_eq!(config.cache_capacity(), DEFAULT_CAPACITY);
        assert_eq!(config.resolve_timeout(), DEFAULT_RESOLVE_TIMEOUT);
    }

    #[tokio::test]
    async fn ip_literal_resolves_synchronously() {
        let client = Client::new(
            ResolverHandle::default_resolver().unwrap(),
            ClientConfig::default(),
        );
        let connection = client.connect("192.0.2.1", 80).unwrap();
        assert!(connection.is_resolved());
        assert_eq!(connection.state().status(), ResolveStatus::Success);
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test]
    async fn lookup_cancels_at_deadline() {
        let (backend, parked) = ManualBackend::new();
        let handle = ResolverHandle::create(CustomBackend::new(backend)).unwrap();
        let config = ClientConfig::builder()
            .resolve_timeout(Duration::from_millis(20))
            .build();
        let client = Client::new(handle, config);

        let connection = client.lookup("slow.test", 443).await.unwrap();

        assert_eq!(connection.state().status(), ResolveStatus::Cancelled);
        assert_eq!(parked.len(), 1);
    }
}
