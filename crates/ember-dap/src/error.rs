use std::io;

use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// Fatal session errors, returned to whoever embeds the adapter.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("transport: {0}")]
    Io(#[from] io::Error),
    #[error("client closed the connection without disconnecting")]
    ConnectionClosed,
    #[error("listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("accept: {0}")]
    Accept(#[source] io::Error),
    #[error("session task failed: {0}")]
    Join(String),
}

/// Why an inspection of the paused engine produced no result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("VM is not paused")]
    NotPaused,
    #[error("inspection panicked on the execution thread")]
    Panicked,
    #[error("{0}")]
    Failed(String),
}
