use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::ValueEnum;
use hostasync::cache::DEFAULT_CAPACITY;
use hostasync::resolve::provider::EventLoop;
use hostasync::resolve::provider::EventLoopBackend;
use hostasync::resolve::provider::ThreadedBackend;
use hostasync::resolve::ResolverHandle;
use hostasync::resolve::SharedContext;
use hostasync::Client;
use hostasync::ClientConfig;

const HEADING: Option<&str> = Some("Resolver Options");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Operating system resolver on worker threads
    Threaded,
    /// DNS client running on the tokio event loop
    EventLoop,
}

/// Arguments for building a resolving client.
#[derive(Debug, Args, Clone)]
pub struct ResolverArgs {
    /// Resolver backend
    #[clap(long, value_enum, default_value_t = BackendKind::Threaded, help_heading = HEADING)]
    pub backend: BackendKind,

    /// Give every connection its own DNS cache
    #[clap(long, help_heading = HEADING)]
    pub no_share: bool,

    /// Maximum number of cached names
    #[clap(long, default_value_t = DEFAULT_CAPACITY, help_heading = HEADING)]
    pub cache_capacity: usize,

    /// Time to allow each name resolution
    #[clap(long, default_value = "30s", help_heading = HEADING)]
    pub resolve_timeout: humantime::Duration,
}

impl ResolverArgs {
    pub fn client(&self) -> Result<Client> {
        let handle = match self.backend {
            BackendKind::Threaded => ResolverHandle::create(ThreadedBackend::default()),
            BackendKind::EventLoop => {
                let event_loop = EventLoop::try_current()?;
                ResolverHandle::create_with_context(
                    EventLoopBackend::default(),
                    SharedContext::new(event_loop),
                )
            }
        }
        .context("unable to create resolver")?;

        let config = ClientConfig::builder()
            .shared_cache(!self.no_share)
            .cache_capacity(self.cache_capacity)
            .resolve_timeout(self.resolve_timeout.into())
            .build();
        Ok(Client::new(handle, config))
    }
}
