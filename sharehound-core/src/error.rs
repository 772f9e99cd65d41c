use std::error::Error;

use sharehound_protocol_smb::SmbError;

use crate::acl::DescriptorError;

#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("corrupt security descriptor: {0}")]
    CorruptDescriptor(#[from] DescriptorError),
    #[error(transparent)]
    Smb(#[from] SmbError),
    #[error("host '{0}' timed out")]
    HostTimeout(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl CollectError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}
