use std::error::Error;

use crate::{ErrorCategory, NtStatus};

#[derive(thiserror::Error, Debug)]
pub enum SmbError {
    #[error("SMB session error: {0}")]
    Status(NtStatus),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("could not connect to '{host}:{port}': {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("[{category}] {message}")]
    ConnectionFailed {
        category: ErrorCategory,
        message: String,
    },
    #[error("authentication failed for {0}")]
    AuthenticationRejected(String),
    #[error("SMB session is not connected")]
    NotConnected,
    #[error("no share selected")]
    ShareNotSet,
    #[error("Could not set share '{0}', it does not exist remotely.")]
    ShareNotFound(String),
    #[error("Could not access share '{share}': {reason}")]
    ShareAccess { share: String, reason: String },
    #[error("Remote directory '{0}' does not exist.")]
    NotADirectory(String),
    #[error("RPC call failed: {0}")]
    Rpc(String),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl SmbError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }

    pub fn status(&self) -> Option<NtStatus> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }
}

impl From<NtStatus> for SmbError {
    fn from(status: NtStatus) -> Self {
        Self::Status(status)
    }
}
