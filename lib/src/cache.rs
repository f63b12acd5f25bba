//! Lock-protected DNS cache shared by the connections of one client.
//!
//! Storage is a plain map without expiry or eviction. The resolution core
//! only needs a scoped lock around insertion; lookups exist so connections
//! can skip dispatch when an answer is already known.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::TryReserveError;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::MutexGuard;
use thiserror::Error;
use tracing::trace;

use crate::resolve::AddressResult;

pub const DEFAULT_CAPACITY: usize = 512;

/// Cache key. Hostnames compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    hostname: String,
    port: u16,
}

impl CacheKey {
    #[must_use]
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            hostname: hostname.to_ascii_lowercase(),
            port,
        }
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// Canonical owner of a resolved [`AddressResult`].
#[derive(Debug)]
pub struct DnsEntry {
    key: CacheKey,
    addrs: AddressResult,
}

impl DnsEntry {
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    #[must_use]
    pub fn addrs(&self) -> &AddressResult {
        &self.addrs
    }
}

#[derive(Debug, Error)]
pub enum InsertErrorKind {
    #[error("cache is at capacity ({0} entries)")]
    Full(usize),

    #[error(transparent)]
    Alloc(#[from] TryReserveError),
}

/// A rejected insertion. Carries the result back so the caller decides how
/// to release it.
#[derive(Debug, Error)]
#[error("failed to cache {key}: {kind}")]
pub struct InsertError {
    key: CacheKey,
    kind: InsertErrorKind,
    result: AddressResult,
}

impl InsertError {
    #[must_use]
    pub fn kind(&self) -> &InsertErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn into_result(self) -> AddressResult {
        self.result
    }
}

#[derive(Debug)]
struct DnsStore {
    entries: HashMap<CacheKey, Arc<DnsEntry>>,
    capacity: usize,
}

/// Handle to a DNS cache. Clones refer to the same storage.
#[derive(Debug, Clone)]
pub struct SharedDnsCache {
    store: Arc<Mutex<DnsStore>>,
}

impl SharedDnsCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let store = DnsStore {
            entries: HashMap::new(),
            capacity,
        };
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Takes the cache lock. It is released when the guard drops.
    pub fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            store: self.store.lock(),
        }
    }

    /// Inserts under a lock scoped to this call.
    ///
    /// # Errors
    ///
    /// See [`CacheGuard::insert`].
    pub fn insert(
        &self,
        key: CacheKey,
        result: AddressResult,
    ) -> Result<Arc<DnsEntry>, InsertError> {
        self.lock().insert(key, result)
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DnsEntry>> {
        self.lock().get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Entries still pinned by connections stay alive.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.store.entries.clear();
    }
}

impl Default for SharedDnsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Scoped access to the cache storage.
pub struct CacheGuard<'a> {
    store: MutexGuard<'a, DnsStore>,
}

impl CacheGuard<'_> {
    /// Stores `result` under `key` and returns the cache-owned entry.
    ///
    /// The first writer for a key wins: if an entry already exists, `result`
    /// is released and the existing entry is returned.
    ///
    /// # Errors
    ///
    /// - If the cache is at capacity and `key` is new
    /// - If the map cannot grow
    pub fn insert(
        &mut self,
        key: CacheKey,
        result: AddressResult,
    ) -> Result<Arc<DnsEntry>, InsertError> {
        if let Some(existing) = self.store.entries.get(&key) {
            trace!(%key, "dns cache already holds key, keeping first entry");
            result.release();
            return Ok(Arc::clone(existing));
        }

        if self.store.entries.len() >= self.store.capacity {
            let kind = InsertErrorKind::Full(self.store.capacity);
            return Err(InsertError { key, kind, result });
        }

        if let Err(error) = self.store.entries.try_reserve(1) {
            let kind = InsertErrorKind::Alloc(error);
            return Err(InsertError { key, kind, result });
        }

        let entry = Arc::new(DnsEntry {
            key: key.clone(),
            addrs: result,
        });
        match self.store.entries.entry(key) {
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(entry))),
            Entry::Occupied(slot) => Ok(Arc::clone(slot.get())),
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DnsEntry>> {
        self.store.entries.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }
}
