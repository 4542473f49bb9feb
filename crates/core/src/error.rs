use thiserror::Error;

pub type DistributionResult<T> = Result<T, DistributionError>;

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<config::ConfigError> for DistributionError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
