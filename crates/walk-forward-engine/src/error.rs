use allocation_core::AllocationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No return data for any strategy")]
    NoReturnData,

    #[error("Calendar has {calendar_len} days, need at least {train_days} + {test_days}")]
    InsufficientHistory {
        calendar_len: usize,
        train_days: usize,
        test_days: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
