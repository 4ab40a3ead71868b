//! Error Envelope (spec §4.1): deadline-bounded calls, retry-with-backoff,
//! catch-and-fallback (`safe_call`), and the append-only dead-letter log.
//!
//! Mirrors the way the teacher wraps every outbound Twitch/Telegram/Discord
//! call and every store write in a narrow error type and a logged fallback,
//! just generalized into a standalone component instead of being scattered
//! across service modules.

mod dead_letter;
mod deadline;
mod retry;
mod safe_call;

pub use dead_letter::DeadLetterLog;
pub use deadline::with_deadline;
pub use retry::{retry, RetryError};
pub use safe_call::safe_call;

use std::fmt;

/// Error kinds recognized by the envelope (spec §4.1).
#[derive(Debug, Clone)]
pub enum EnvelopeError {
    Timeout,
    UpstreamLlm { status: u16, retryable: bool },
    Store { operation: String, collection: String },
    Transport(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::Timeout => write!(f, "TIMEOUT"),
            EnvelopeError::UpstreamLlm { status, retryable } => {
                write!(f, "UPSTREAM_LLM(status={status}, retryable={retryable})")
            }
            EnvelopeError::Store {
                operation,
                collection,
            } => write!(f, "STORE({operation} on {collection})"),
            EnvelopeError::Transport(msg) => write!(f, "TRANSPORT({msg})"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl EnvelopeError {
    /// Classifies an error as retryable per spec §4.1: TIMEOUT, 5xx, 429, or a
    /// recognized transport error. Client-class 4xx other than 429 is never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            EnvelopeError::Timeout => true,
            EnvelopeError::UpstreamLlm { retryable, .. } => *retryable,
            EnvelopeError::Store { .. } => false,
            EnvelopeError::Transport(_) => true,
        }
    }

    pub fn from_http_status(status: u16) -> Self {
        let retryable = status == 429 || (500..600).contains(&status);
        EnvelopeError::UpstreamLlm { status, retryable }
    }

    /// Classifies a `reqwest::Error` using the transport-error names spec §4.1 lists:
    /// connection-refused, host-not-found, socket-hangup, fetch-failed, connect-timeout.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            EnvelopeError::Timeout
        } else if err.is_connect() || err.is_request() {
            EnvelopeError::Transport(err.to_string())
        } else if let Some(status) = err.status() {
            EnvelopeError::from_http_status(status.as_u16())
        } else {
            EnvelopeError::Transport(err.to_string())
        }
    }
}
