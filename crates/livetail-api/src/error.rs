use thiserror::Error;

/// Errors returned by the Live Tail API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or its body could not be read
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client itself could not be configured
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The server answered with a status other than the expected one
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The body was not JSON at all
    #[error("response body is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),

    /// The body was JSON but not of the expected shape
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(#[source] serde_json::Error),

    /// The server flagged the request as failed
    #[error("{0}")]
    Rejected(String),

    /// A redirect did not end on a URL with a usable host
    #[error("could not determine a deployment from {0}")]
    Deployment(String),

    /// The version endpoint returned something that is not `major.minor`
    #[error("server reported an unreadable version {0}")]
    Version(String),
}

impl ApiError {
    pub(crate) fn request(url: &str, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.to_string(),
            source,
        }
    }
}
