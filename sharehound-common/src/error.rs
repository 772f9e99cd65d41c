use std::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum ShareHoundError {
    #[error("invalid hash format: {0}")]
    InvalidHash(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ShareHoundError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}
