//! Engine error taxonomy. Every variant is contained at the component
//! boundary where it occurs: none of these ever takes the engine down.

use std::time::Duration;
use thiserror::Error;

/// A counter readout from the host failed or timed out. The tick that hit
/// it is skipped; the next tick retries from scratch.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("counter query timed out after {0:?}")]
    Timeout(Duration),
    #[error("counter query failed: {0}")]
    Unavailable(String),
}

/// Delivery to one session failed. Bumps that session's retry counter and
/// nothing else.
#[derive(Debug, Error)]
#[error("push to session {session} failed: {reason}")]
pub struct PushError {
    pub session: u64,
    pub reason: String,
}

/// Durable-state read/write failed. Logged and ignored: the engine keeps
/// running with in-memory history only.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// No liveness signal from a viewer within the window. Disconnects that
/// session only.
#[derive(Debug, Error)]
#[error("no liveness signal within {0:?}")]
pub struct SessionTimeout(pub Duration);
