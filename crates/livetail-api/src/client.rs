//! Live Tail HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use livetail_types::{
    ApiVersion, CreateSessionRequest, CreateSessionResponse, Credentials, Deployment,
    PollResponse, SessionId, VersionResponse,
};

use crate::ApiError;

const VERSION_ENDPOINT: &str = "livetail/session/version";
const SESSION_ENDPOINT: &str = "livetail/session";

/// Fixed user agent sent with every request
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_3) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/46.0.2490.80 Safari/537.36";

/// HTTP settings shared by every request
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Session endpoints driven by the poll loop
#[async_trait]
pub trait LiveTailApi: Send + Sync {
    /// Start a session for `filter` (`None` matches everything)
    async fn create_session(&self, filter: Option<&str>) -> Result<SessionId, ApiError>;

    /// Fetch everything the session produced from `offset` on
    async fn latest(&self, session: &SessionId, offset: u64) -> Result<PollResponse, ApiError>;

    /// Tear down a session; the response is not inspected
    async fn delete_session(&self, session: &SessionId) -> Result<(), ApiError>;
}

/// Authenticated client bound to a single deployment
#[derive(Clone, Debug)]
pub struct LiveTailClient {
    http: reqwest::Client,
    credentials: Credentials,
    deployment: Deployment,
}

impl LiveTailClient {
    /// Create a client for `deployment` with the fixed JSON headers
    pub fn new(
        credentials: Credentials,
        deployment: Deployment,
        config: &ClientConfig,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            http,
            credentials,
            deployment,
        })
    }

    /// Rebind to another deployment, reusing the connection pool
    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }

    /// Deployment this client talks to
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Find the deployment that owns the account.
    ///
    /// The version endpoint on the current deployment redirects to the
    /// account's own cluster; the host of the final URL is the answer. The
    /// status is irrelevant here, authentication is checked separately.
    pub async fn resolve_deployment(&self) -> Result<Deployment, ApiError> {
        let url = self.deployment.api_url(VERSION_ENDPOINT);
        let response = self.send(Method::GET, &url, None).await?;
        let resolved = deployment_from_url(response.url())?;

        tracing::debug!(from = %self.deployment, to = %resolved, "Resolved deployment");
        Ok(resolved)
    }

    /// Check the credentials and return the server's API version
    pub async fn authenticate(&self) -> Result<ApiVersion, ApiError> {
        let url = self.deployment.api_url(VERSION_ENDPOINT);
        let response = self.send(Method::GET, &url, None).await?;
        let status = response.status().as_u16();
        let body = read_body(response, &url).await?;

        parse_version_body(&url, status, &body)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).basic_auth(
            &self.credentials.access_id,
            Some(self.credentials.access_key.expose()),
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&CreateSessionRequest<'_>>,
    ) -> Result<Response, ApiError> {
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .send()
            .await
            .map_err(|e| ApiError::request(url, e))
    }
}

#[async_trait]
impl LiveTailApi for LiveTailClient {
    async fn create_session(&self, filter: Option<&str>) -> Result<SessionId, ApiError> {
        let url = self.deployment.api_url(SESSION_ENDPOINT);
        let request = CreateSessionRequest {
            filter,
            is_cli: true,
        };
        let response = self.send(Method::POST, &url, Some(&request)).await?;
        let status = response.status().as_u16();
        let body = read_body(response, &url).await?;

        parse_create_body(&url, status, &body)
    }

    async fn latest(&self, session: &SessionId, offset: u64) -> Result<PollResponse, ApiError> {
        let url = self
            .deployment
            .api_url(&format!("{}/{}/latest/{}", SESSION_ENDPOINT, session, offset));
        let response = self.send(Method::GET, &url, None).await?;
        let status = response.status().as_u16();
        let body = read_body(response, &url).await?;

        parse_poll_body(&url, status, &body)
    }

    async fn delete_session(&self, session: &SessionId) -> Result<(), ApiError> {
        let url = self
            .deployment
            .api_url(&format!("{}/{}", SESSION_ENDPOINT, session));
        let response = self.send(Method::DELETE, &url, None).await?;

        tracing::debug!(session = %session, status = %response.status(), "Session delete answered");
        Ok(())
    }
}

/// Turn the final URL of a redirect chain into a deployment.
///
/// `https` URLs keep only `host[:port]`; other schemes are kept so the
/// result still addresses the same base URL.
pub fn deployment_from_url(url: &Url) -> Result<Deployment, ApiError> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::Deployment(url.to_string()))?;

    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    if url.scheme() == "https" {
        Ok(Deployment::new(authority))
    } else {
        Ok(Deployment::new(format!("{}://{}", url.scheme(), authority)))
    }
}

/// Classify a poll answer.
///
/// A body that is not JSON at all is reported before the status is looked
/// at; the server answers that way when it throttles a session.
pub fn parse_poll_body(url: &str, status: u16, body: &str) -> Result<PollResponse, ApiError> {
    let value: Value = serde_json::from_str(body).map_err(ApiError::MalformedBody)?;

    if !(200..300).contains(&status) {
        return Err(ApiError::Status {
            url: url.to_string(),
            status,
        });
    }

    serde_json::from_value(value).map_err(ApiError::UnexpectedShape)
}

/// Read the server's API version; anything but a 200 means the
/// credentials were not accepted.
pub fn parse_version_body(url: &str, status: u16, body: &str) -> Result<ApiVersion, ApiError> {
    expect_ok(url, status)?;

    let version: VersionResponse = decode(body)?;
    ApiVersion::from_json(&version.version)
        .ok_or_else(|| ApiError::Version(version.version.to_string()))
}

/// Extract the id of a freshly created session.
///
/// A 200 can still carry `error: true`; the server's `errorMessage` is
/// passed on as is.
pub fn parse_create_body(url: &str, status: u16, body: &str) -> Result<SessionId, ApiError> {
    expect_ok(url, status)?;

    let created: CreateSessionResponse = decode(body)?;
    if created.error {
        return Err(ApiError::Rejected(
            created
                .error_message
                .unwrap_or_else(|| "the server reported an unspecified error".to_string()),
        ));
    }

    created
        .id
        .filter(|id| !id.is_empty())
        .map(SessionId::new)
        .ok_or_else(|| ApiError::Rejected("the response did not include a session id".into()))
}

fn expect_ok(url: &str, status: u16) -> Result<(), ApiError> {
    if status == 200 {
        Ok(())
    } else {
        Err(ApiError::Status {
            url: url.to_string(),
            status,
        })
    }
}

async fn read_body(response: Response, url: &str) -> Result<String, ApiError> {
    response.text().await.map_err(|e| ApiError::request(url, e))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: Value = serde_json::from_str(body).map_err(ApiError::MalformedBody)?;
    serde_json::from_value(value).map_err(ApiError::UnexpectedShape)
}
