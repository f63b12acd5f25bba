use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use anyhow::Context;

/// A `HOST:PORT` pair. IPv6 hosts must be bracketed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl FromStr for HostPort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .with_context(|| format!("missing port in target: {s}"))?;

        let host = match host.strip_prefix('[') {
            Some(bracketed) => bracketed
                .strip_suffix(']')
                .with_context(|| format!("unterminated bracket in target: {s}"))?,
            None if host.contains(':') => bail!("IPv6 hosts must be bracketed: {s}"),
            None => host,
        };
        if host.is_empty() {
            bail!("missing host in target: {s}");
        }

        let port = port
            .parse()
            .with_context(|| format!("invalid port in target: {s}"))?;

        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
