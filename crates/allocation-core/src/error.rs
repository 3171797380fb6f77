use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load cached allocations from {path}: {reason}")]
    CacheLoad { path: String, reason: String },

    #[error("Calculation error: {0}")]
    Calculation(String),
}

pub type Result<T> = std::result::Result<T, AllocationError>;
