use std::io;

use livetail_api::ApiError;
use thiserror::Error;

/// Where the poll loop is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailState {
    Polling,
    /// The poll endpoint answered with an error status
    StoppedError,
    /// Maximum running time reached, or the server stopped the session
    StoppedTimeout,
    /// The query produced messages faster than the server allows
    StoppedRateLimit,
    /// Anything else that made further polling pointless
    StoppedFatal,
    /// The user interrupted the run
    Interrupted,
}

impl TailState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Polling)
    }
}

/// Failure inside one poll iteration
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write log output: {0}")]
    Output(#[from] io::Error),
}

/// Why the poll loop ended
#[derive(Debug)]
pub enum StopReason {
    /// A rate signal with severity `Error`
    RateLimited,
    /// A maximum running time signal with severity `Error`
    TimedOut,
    /// The session state carried `isStopped`
    SessionStopped,
    /// The poll body was not JSON, which the server does when throttling
    Throttled(ApiError),
    /// The poll endpoint answered with an error status
    ServerError(ApiError),
    Fatal(PollError),
    Interrupted,
}

impl StopReason {
    /// Terminal state this reason leaves the loop in
    pub fn state(&self) -> TailState {
        match self {
            Self::RateLimited => TailState::StoppedRateLimit,
            Self::TimedOut | Self::SessionStopped => TailState::StoppedTimeout,
            Self::ServerError(_) => TailState::StoppedError,
            Self::Throttled(_) | Self::Fatal(_) => TailState::StoppedFatal,
            Self::Interrupted => TailState::Interrupted,
        }
    }

    pub(crate) fn from_api_error(err: ApiError) -> Self {
        match err {
            ApiError::MalformedBody(_) => Self::Throttled(err),
            ApiError::Status { .. } => Self::ServerError(err),
            other => Self::Fatal(PollError::Api(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_errors_map_to_states() {
        let malformed = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        assert_eq!(
            StopReason::from_api_error(ApiError::MalformedBody(malformed)).state(),
            TailState::StoppedFatal
        );

        let status = ApiError::Status {
            url: "https://api.sumologic.com/api/v1/livetail/session/x/latest/0".into(),
            status: 404,
        };
        assert_eq!(
            StopReason::from_api_error(status).state(),
            TailState::StoppedError
        );

        let rejected = ApiError::Rejected("nope".into());
        assert_eq!(
            StopReason::from_api_error(rejected).state(),
            TailState::StoppedFatal
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TailState::Polling.is_terminal());
        assert!(StopReason::SessionStopped.state().is_terminal());
        assert_eq!(StopReason::TimedOut.state(), TailState::StoppedTimeout);
        assert_eq!(StopReason::RateLimited.state(), TailState::StoppedRateLimit);
    }
}
