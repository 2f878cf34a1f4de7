//! Shared types for livetail
//!
//! This crate contains the credentials, addressing and wire types used by
//! the API client, the poll loop and the command line front end.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Host that owns the version endpoint used to discover an account's deployment
pub const DEFAULT_DEPLOYMENT: &str = "api.sumologic.com";

/// Version compiled into this client, compared against the server's on login
pub const CLIENT_VERSION: ApiVersion = ApiVersion { major: 2, minor: 0 };

// ============================================================================
// Access Types
// ============================================================================

/// Secret half of an access key pair
///
/// Serializes as a plain string so it can be stored, but never shows up in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw secret, for request signing only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

/// Access id / access key pair used for HTTP basic auth
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub access_id: String,
    pub access_key: AccessKey,
}

impl Credentials {
    pub fn new(access_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: AccessKey::new(access_key),
        }
    }
}

/// API cluster serving an account, e.g. `api.us2.sumologic.com`
///
/// Usually a bare host (optionally with a port). A value that already
/// carries a scheme is used as the base URL verbatim, which is how
/// internal or local deployments are addressed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployment(String);

impl Deployment {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scheme and authority, without a trailing slash
    pub fn base_url(&self) -> String {
        if self.0.contains("://") {
            self.0.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.0)
        }
    }

    /// Full URL of an endpoint below `/api/v1/`
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.base_url(), endpoint)
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new(DEFAULT_DEPLOYMENT)
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque id of a server-side Live Tail session
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Versioning
// ============================================================================

/// `major.minor` version of the Live Tail API
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"2.1"`; a missing minor component counts as 0
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.trim().parse().ok()?;
        let minor = match parts.next() {
            Some(minor) => minor.trim().parse().ok()?,
            None => 0,
        };
        Some(Self { major, minor })
    }

    /// Parse the `version` field of the version endpoint, which may be a
    /// string or a bare JSON number
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => Self::parse(&n.to_string()),
            _ => None,
        }
    }

    /// How a server reporting `server` relates to this (client) version
    pub fn compatibility_with(&self, server: &ApiVersion) -> Compatibility {
        if server.major > self.major {
            Compatibility::Incompatible
        } else if server.minor > self.minor {
            Compatibility::NewerMinor
        } else {
            Compatibility::Compatible
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Outcome of comparing client and server versions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Server has a newer minor version; this client still works
    NewerMinor,
    /// Server has a newer major version; this client must be upgraded
    Incompatible,
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `GET livetail/session/version`
#[derive(Clone, Debug, Deserialize)]
pub struct VersionResponse {
    pub version: Value,
}

/// Body of `POST livetail/session`
#[derive(Clone, Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    /// `None` asks for every message
    pub filter: Option<&'a str>,
    #[serde(rename = "isCLI")]
    pub is_cli: bool,
}

/// Response of `POST livetail/session`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response of `GET livetail/session/{id}/latest/{offset}`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PollResponse {
    /// `None` until the session has something new to report
    #[serde(default)]
    pub state: Option<SessionState>,
    #[serde(default)]
    pub messages: Vec<ServerMessage>,
}

/// Cursor and control information of a running session
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub current_offset: u64,
    #[serde(default)]
    pub is_stopped: bool,
    #[serde(default)]
    pub user_messages: Vec<UserMessage>,
}

/// One rendered log line
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub payload: String,
}

impl ServerMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Severity carried by a user message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum Severity {
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Other,
}

/// Out-of-band status message attached to a session state
///
/// The kind of message is decided by which fields are present, so every
/// field other than `messageType` is kept as-is.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    #[serde(default)]
    pub message_type: Severity,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserMessage {
    const RATE_FIELD: &'static str = "currentRate";
    const RUNNING_TIME_FIELD: &'static str = "maxEngineRunningTime";

    /// Build a message carrying the given signal, mostly useful in tests
    pub fn with_signal(signal: UserSignal) -> Self {
        let (field, severity) = match signal {
            UserSignal::RateLimit(severity) => (Self::RATE_FIELD, severity),
            UserSignal::MaxRunningTime(severity) => (Self::RUNNING_TIME_FIELD, severity),
        };
        let mut fields = Map::new();
        fields.insert(field.to_string(), Value::from(0));
        Self {
            message_type: severity,
            fields,
        }
    }

    /// Control signals carried by this message, rate first
    pub fn signals(&self) -> Vec<UserSignal> {
        let mut signals = Vec::with_capacity(2);
        if self.fields.contains_key(Self::RATE_FIELD) {
            signals.push(UserSignal::RateLimit(self.message_type));
        }
        if self.fields.contains_key(Self::RUNNING_TIME_FIELD) {
            signals.push(UserSignal::MaxRunningTime(self.message_type));
        }
        signals
    }
}

/// Control signal sent by the server alongside log data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserSignal {
    /// The query is producing messages too fast
    RateLimit(Severity),
    /// The session is close to, or past, its maximum running time
    MaxRunningTime(Severity),
}
