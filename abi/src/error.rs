use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IeError {
    /// RPC or API unreachable, or its response could not be understood.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Rejected input: unsupported file type or size, bad numeric amount.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("insufficient funds: need {required} lamports, have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// The bound expired while waiting. The operation may still complete.
    #[error("timed out after {waited:?} waiting for {what}; it may still land, check before retrying")]
    Timeout { what: String, waited: Duration },

    /// One item of a batch could not be parsed and was skipped.
    #[error("could not decode {item}: {reason}")]
    PartialDecodeFailure { item: String, reason: String },

    #[error("wallet not connected")]
    WalletNotConnected,
}

impl IeError {
    pub fn unavailable(err: impl Display) -> Self {
        IeError::DataUnavailable(err.to_string())
    }

    pub fn invalid(err: impl Display) -> Self {
        IeError::ValidationFailure(err.to_string())
    }

    pub fn partial(item: impl Display, reason: impl Display) -> Self {
        IeError::PartialDecodeFailure {
            item: item.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the user should be offered a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IeError::DataUnavailable(_) | IeError::Timeout { .. })
    }
}

pub type IeResult<T> = Result<T, IeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_keeps_sub_second_bounds() {
        let err = IeError::Timeout {
            what: "confirmation".to_string(),
            waited: Duration::from_millis(250),
        };
        assert!(err.to_string().starts_with("timed out after 250ms waiting for confirmation"));
        assert!(err.is_retryable());

        let err = IeError::Timeout {
            what: "confirmation".to_string(),
            waited: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("after 60s"));
    }
}
