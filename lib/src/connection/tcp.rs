use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;

use crate::connection::Connection;
use crate::connection::ConnectionSetup;

/// Connects TCP to the resolved addresses in order, returning the first
/// stream that comes up.
#[derive(Debug, Clone, Copy)]
pub struct TcpSetup {
    connect_timeout: Duration,
}

impl TcpSetup {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ConnectionSetup for TcpSetup {
    type Transport = TcpStream;

    async fn setup(&self, connection: &Connection) -> Result<TcpStream> {
        let entry = connection
            .dns_entry()
            .context("connection has no resolved addresses")?;

        let mut last_error = None;
        for addr in entry.addrs().iter() {
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(error)) => {
                    debug!(%addr, %error, "TCP connect failed");
                    let error = anyhow!(error).context(format!("TCP connect to {addr} failed"));
                    last_error = Some(error);
                }
                Err(_elapsed) => {
                    debug!(%addr, "TCP connect timed out");
                    last_error = Some(anyhow!("TCP connect to {addr} timed out"));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("no addresses to connect to")))
    }

    async fn disconnect(&self, connection: &mut Connection, graceful: bool) {
        trace!(
            host = connection.hostname(),
            port = connection.port(),
            graceful,
            "disconnecting"
        );
    }
}
