use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("failed to spawn timer thread: {0}")]
    SchedulerSpawn(String),

    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("scheduler configuration was already installed")]
    AlreadyConfigured,
}

impl From<std::io::Error> for DeadlineError {
    fn from(err: std::io::Error) -> Self {
        DeadlineError::SchedulerSpawn(err.to_string())
    }
}

impl From<serde_json::Error> for DeadlineError {
    fn from(err: serde_json::Error) -> Self {
        DeadlineError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_becomes_spawn_error() {
        let err: DeadlineError =
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left").into();
        assert_eq!(
            err.to_string(),
            "failed to spawn timer thread: no threads left"
        );
    }

    #[test]
    fn test_json_error_becomes_invalid_config() {
        let err: DeadlineError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, DeadlineError::InvalidConfig(_)));
    }
}
