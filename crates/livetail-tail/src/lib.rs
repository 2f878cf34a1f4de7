//! Live Tail session polling for livetail
//!
//! This crate owns the lifetime of a server-side session: it creates it,
//! polls it until the server or the user stops it, prints every payload and
//! deletes the session again on the way out.

mod poller;
mod state;

pub use poller::{LiveTail, TailConfig, TailReport};
pub use state::{PollError, StopReason, TailState};

// Re-export types used in our public API
pub use livetail_api::{ApiError, LiveTailApi, SessionId};
