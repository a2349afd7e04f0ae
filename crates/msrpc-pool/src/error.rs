use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool has been released")]
    Closed,

    #[error("pool capacity must be greater than 0")]
    InvalidCapacity,

    #[error("pool expiry must be greater than 0")]
    InvalidExpiry,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
