//! Live Tail API client for livetail
//!
//! This crate provides deployment discovery, authentication and the session
//! endpoints of the Live Tail HTTP API.

mod client;
mod error;

pub use client::{
    ClientConfig, LiveTailApi, LiveTailClient, deployment_from_url, parse_create_body,
    parse_poll_body, parse_version_body,
};
pub use error::ApiError;

// Re-export types that are used in our public API
pub use livetail_types::{
    ApiVersion, Compatibility, Credentials, Deployment, PollResponse, SessionId,
};
