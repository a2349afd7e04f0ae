use thiserror::Error;

/// Why a call through the breaker did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The breaker is open; the call was not attempted.
    #[error("circuit breaker is open")]
    Open,

    /// The breaker is half-open and its trial budget is spent.
    #[error("too many requests")]
    TooManyRequests,

    /// The call ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    /// True for `Open` and `TooManyRequests`.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, BreakerError::Failed(_))
    }

    pub fn into_failure(self) -> Option<E> {
        match self {
            BreakerError::Failed(e) => Some(e),
            _ => None,
        }
    }
}
