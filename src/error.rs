use livetail_api::{ApiError, ApiVersion};
use livetail_tail::{PollError, StopReason};
use thiserror::Error;

/// Where newer releases of the CLI are published
pub const RELEASES_URL: &str = "https://github.com/sumologic/livetail-cli";

/// Everything that ends a run early
///
/// Each variant's message is what the user sees; the top-level handler in
/// `main` logs it and exits.
#[derive(Debug, Error)]
pub enum LiveTailError {
    /// Bad or incomplete command line input, or an unusable prompt
    #[error("{0}")]
    Config(String),

    /// The credential file could not be read, written or removed
    #[error("Unable to access stored credentials: {0:#}")]
    Credentials(anyhow::Error),

    #[error("Unable to resolve deployment using the Access ID / Access Key: {0}")]
    Resolution(#[source] ApiError),

    #[error("Authentication failed. Please check the Access ID and Access Key and try again ({0})")]
    Auth(#[source] ApiError),

    #[error(
        "Incompatible version of CLI (server {server}, client {client}). \
         Please download the latest version from {url}",
        url = RELEASES_URL
    )]
    Version {
        server: ApiVersion,
        client: ApiVersion,
    },

    #[error("Failed to create Live Tail session: {0}")]
    SessionCreate(#[source] ApiError),

    /// The server reported that the query exceeded its message rate
    #[error(
        "Your query produced too many messages and caused the session to end. \
         Please add additional metadata fields to your query to make it more specific."
    )]
    RateLimit,

    /// A poll answer that was not JSON, taken as a sign of API rate limiting
    #[error("API rate limit exceeded. Ending this Live Tail session ({0})")]
    Throttled(#[source] ApiError),

    #[error("Your Live Tail session has timed out.")]
    Timeout,

    #[error("Fatal error has occurred. The Live Tail session has ended: {0}")]
    Fatal(#[source] PollError),
}

impl LiveTailError {
    /// Map the way a session ended to the outcome of the run
    pub fn from_stop(stop: StopReason) -> Result<(), Self> {
        match stop {
            StopReason::Interrupted => Ok(()),
            StopReason::RateLimited => Err(Self::RateLimit),
            StopReason::TimedOut | StopReason::SessionStopped => Err(Self::Timeout),
            StopReason::Throttled(e) => Err(Self::Throttled(e)),
            StopReason::ServerError(e) => Err(Self::Fatal(PollError::Api(e))),
            StopReason::Fatal(e) => Err(Self::Fatal(e)),
        }
    }
}
