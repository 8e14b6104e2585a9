//! Connector errors.

use std::io;

/// Terminal outcome of a failed [`connect`](super::connect) call.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid TLS server name: {0}")]
    InvalidServerName(String),
    #[error("Failed to build TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
    #[error("Failed to connect to {target} after {attempts} attempts: {source}")]
    Exhausted {
        target: String,
        attempts: u8,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// The socket error of the last attempt, if the retry budget ran out.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            ConnectError::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
    }
}
