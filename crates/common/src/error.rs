use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("invalid pattern: {0}")]
    Pattern(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ShieldResult<T> = Result<T, ShieldError>;
