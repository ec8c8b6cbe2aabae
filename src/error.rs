use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Everything that can go wrong while binding or serving.
///
/// Only [`ServerError::Bind`] and [`ServerError::Runtime`] are fatal; every
/// other variant is contained inside the connection that produced it.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request line exceeds {0} bytes")]
    RequestLineTooLong(usize),

    #[error("request header too large: {0}")]
    HeaderTooLarge(String),

    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    #[error("client disconnected")]
    ClientDisconnect,

    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MalformedRequest(_) => 400,
            ServerError::RequestLineTooLong(_) => 414,
            ServerError::HeaderTooLarge(_) => 431,
            ServerError::UnsupportedVersion(_) => 505,
            ServerError::Bind { .. }
            | ServerError::Runtime(_)
            | ServerError::ClientDisconnect
            | ServerError::Io(_) => 500,
        }
    }

    /// True for errors answered with an error response before the
    /// connection is closed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ServerError::MalformedRequest(_)
                | ServerError::RequestLineTooLong(_)
                | ServerError::HeaderTooLarge(_)
                | ServerError::UnsupportedVersion(_)
        )
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => ServerError::ClientDisconnect,
            _ => ServerError::Io(err),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
