use thiserror::Error;

pub type FundlensResult<T> = Result<T, FundlensError>;

#[derive(Error, Debug)]
pub enum FundlensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid attribution rule: {0}")]
    InvalidRule(String),

    #[error("Analysis timed out after {0}s")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for FundlensError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
