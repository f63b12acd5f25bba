use thiserror::Error;

/// Errors surfaced by the resolution core.
///
/// A failed name lookup is reported like any other connection setup failure,
/// distinguishable only by its variant.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("resolver backend failed to initialize")]
    Initialization(#[source] anyhow::Error),

    #[error("out of memory while storing addresses for {host}:{port}")]
    OutOfMemory { host: String, port: u16 },

    #[error("could not resolve host: {host}")]
    ResolutionFailure { host: String, port: u16 },

    #[error("resolution of {host}:{port} was cancelled")]
    Cancelled { host: String, port: u16 },

    #[error("resolver backend refused lookup of {host}:{port}")]
    Dispatch {
        host: String,
        port: u16,
        #[source]
        source: anyhow::Error,
    },

    #[error("resolution of {host}:{port} has not completed")]
    NotResolved { host: String, port: u16 },

    #[error("connection setup to {host}:{port} failed")]
    Setup {
        host: String,
        port: u16,
        #[source]
        source: anyhow::Error,
    },
}
