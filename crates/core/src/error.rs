use thiserror::Error;

pub type TrackflowResult<T> = Result<T, TrackflowError>;

#[derive(Error, Debug)]
pub enum TrackflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid attribution model configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrackflowError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
