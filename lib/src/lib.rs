#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod client;
pub mod connection;
pub mod error;
pub mod handoff;
pub mod resolve;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::CacheKey;
pub use cache::DnsEntry;
pub use cache::SharedDnsCache;
pub use client::Client;
pub use client::ClientConfig;
pub use connection::Connection;
pub use connection::ConnectionSetup;
pub use connection::ProtocolReady;
pub use error::Error;
pub use handoff::Completion;
pub use resolve::AddressResult;
pub use resolve::Backend;
pub use resolve::BackendImpl;
pub use resolve::Dispatch;
pub use resolve::ResolverHandle;
pub use state::AsyncResolutionState;
pub use state::ResolveStatus;

pub type Result<T, E = Error> = std::result::Result<T, E>;
