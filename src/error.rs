use std::time::Duration;
use thiserror::Error;

/// Failures talking to the dish. All of them end up as `{ok: false, error}`
/// at the API boundary; none of them stop the daemon.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DishError {
    /// The client tooling itself cannot be loaded or started.
    #[error("dish client unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Fetch(String),

    #[error("dish call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// This client version does not offer the capability.
    #[error("{capability} not found. Upgrade the dish client to a version that supports it")]
    Unsupported { capability: String },

    #[error("invalid dish response: {0}")]
    Decode(String),

    /// The call does not take a session handle; retry without one.
    #[error("session handle rejected")]
    SessionRejected,
}

pub type DishResult<T> = Result<T, DishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DishError::Unsupported {
            capability: "reset_obstruction_map".to_string(),
        };
        assert!(err.to_string().starts_with("reset_obstruction_map not found"));

        assert_eq!(
            DishError::Timeout(Duration::from_secs(10)).to_string(),
            "dish call timed out after 10s"
        );
        assert_eq!(DishError::Fetch("connection refused".into()).to_string(), "connection refused");
    }
}
