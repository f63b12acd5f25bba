use anyhow::Context;
use anyhow::Result;
use clap::Args;
use hostasync::connection::TcpSetup;

use crate::args::HostPort;
use crate::args::ResolverArgs;
use crate::cmd::Run;

/// Resolve a target and open a TCP connection to it
#[derive(Debug, Args)]
pub struct ConnectArgs {
    /// Target as HOST:PORT
    target: HostPort,

    #[clap(flatten)]
    resolver_args: ResolverArgs,

    /// Time to allow each TCP connect attempt
    #[clap(long, default_value = "10s")]
    connect_timeout: humantime::Duration,
}

impl Run for ConnectArgs {
    async fn run(&self) -> Result<()> {
        let client = self.resolver_args.client()?;
        let connection = client.lookup(&self.target.host, self.target.port).await?;

        let setup = TcpSetup::new(self.connect_timeout.into());
        let ready = connection
            .resume(&setup)
            .await
            .with_context(|| format!("could not connect to {}", self.target))?;

        let peer = ready
            .transport
            .peer_addr()
            .context("unable to read peer address")?;
        println!("connected to {} ({peer})", self.target);

        Ok(())
    }
}
