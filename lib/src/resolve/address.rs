use std::fmt;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::trace;

/// Resolved socket addresses for one hostname/port pair.
///
/// Moves from the backend into the completion handoff and from there into the
/// DNS cache. Not [`Clone`]: consumers read it through a cached
/// [`crate::DnsEntry`].
#[derive(Debug, PartialEq, Eq)]
pub struct AddressResult {
    addrs: Arc<[SocketAddr]>,
}

impl AddressResult {
    /// Pairs every address with `port`, keeping their order.
    pub fn from_ips(ips: impl IntoIterator<Item = IpAddr>, port: u16) -> Self {
        ips.into_iter()
            .map(|ip| SocketAddr::new(ip, port))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<SocketAddr> {
        self.addrs.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.addrs.iter().copied()
    }

    /// Releases the addresses. Used on paths where ownership was handed over
    /// but the result could not be stored.
    pub fn release(self) {
        trace!(count = self.addrs.len(), "releasing address result");
    }
}

impl From<Vec<SocketAddr>> for AddressResult {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Self {
            addrs: addrs.into(),
        }
    }
}

impl From<Arc<[SocketAddr]>> for AddressResult {
    fn from(addrs: Arc<[SocketAddr]>) -> Self {
        Self { addrs }
    }
}

impl FromIterator<SocketAddr> for AddressResult {
    fn from_iter<I: IntoIterator<Item = SocketAddr>>(iter: I) -> Self {
        Self {
            addrs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AddressResult {
    type Item = &'a SocketAddr;
    type IntoIter = std::slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

impl fmt::Display for AddressResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for addr in self.addrs.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{addr}")?;
            first = false;
        }
        Ok(())
    }
}
