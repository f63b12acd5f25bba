use anyhow::Result;
use clap::Args;
use tracing::debug;

use crate::args::HostPort;
use crate::args::ResolverArgs;
use crate::cmd::Run;

/// Resolve targets and print their addresses
#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Targets as HOST:PORT
    #[clap(required = true)]
    targets: Vec<HostPort>,

    #[clap(flatten)]
    resolver_args: ResolverArgs,
}

impl Run for ResolveArgs {
    async fn run(&self) -> Result<()> {
        let client = self.resolver_args.client()?;
        let deadline = client.config().resolve_timeout();

        // Dispatch everything first so lookups overlap.
        let mut connections = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let connection = client.connect(&target.host, target.port)?;
            connections.push((target, connection));
        }

        for (target, connection) in connections {
            if tokio::time::timeout(deadline, connection.resolved())
                .await
                .is_err()
            {
                debug!(%target, "resolution timed out");
                connection.cancel();
            }

            let state = connection.state();
            match state.entry() {
                Some(entry) => println!("{target}\t{}", entry.addrs()),
                None => println!("{target}\t{}", state.status()),
            }
        }

        Ok(())
    }
}
