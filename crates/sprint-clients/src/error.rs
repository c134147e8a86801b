//! Upstream-call errors and the retry classification used by [`crate::pipeline`].

use sprint_core::error::EngineError;
use std::time::Duration;

/// What a single HTTP attempt against an upstream returned, already
/// classified into retriable vs. non-retriable per §4.C step 5.
#[derive(Debug, thiserror::Error, Clone)]
pub enum UpstreamError {
    #[error("not found")]
    NotFound,

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("upstream rejected the request: {0}")]
    BadRequest(String),

    #[error("upstream asked to slow down{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream server error: {0}")]
    Server(String),

    #[error("upstream call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    /// Only 5xx, connection errors, and timeouts count toward retry
    /// attempts and the circuit breaker's failure window (§4.B, §4.C).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Server(_) | UpstreamError::Timeout | UpstreamError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if let Some(status) = e.status() {
            status_to_upstream_error(status.as_u16(), e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

impl From<octocrab::Error> for UpstreamError {
    fn from(e: octocrab::Error) -> Self {
        match &e {
            // `GitHubError` carries the API's JSON error body (`message`,
            // `documentation_url`, `errors`) but not the HTTP status code
            // itself, so classification here goes by message content rather
            // than status, unlike the plain-REST path in `status_to_upstream_error`.
            octocrab::Error::GitHub { source, .. } => {
                let msg = source.message.clone();
                let lowered = msg.to_ascii_lowercase();
                if lowered.contains("not found") {
                    UpstreamError::NotFound
                } else if lowered.contains("rate limit") || lowered.contains("abuse") {
                    UpstreamError::RateLimited { retry_after: None }
                } else if lowered.contains("bad credentials") || lowered.contains("require authentication") {
                    UpstreamError::Auth(msg)
                } else {
                    UpstreamError::Server(msg)
                }
            }
            _ => UpstreamError::Transport(e.to_string()),
        }
    }
}

/// Parses a `Retry-After` header's delay-seconds form into a `Duration`
/// (§4.C "429 honours `Retry-After`"). The upstreams this client talks to
/// (Jira-like, GitHub-like) always emit the numeric-seconds form rather
/// than the HTTP-date form, so only that form is handled. Returns `None`
/// when absent or unparseable, in which case the caller falls back to the
/// regular backoff schedule.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn status_to_upstream_error(status: u16, message: String) -> UpstreamError {
    match status {
        401 | 403 => UpstreamError::Auth(message),
        404 => UpstreamError::NotFound,
        429 => UpstreamError::RateLimited { retry_after: None },
        400..=499 => UpstreamError::BadRequest(message),
        _ => UpstreamError::Server(message),
    }
}

/// Maps a terminal (post-retry) client failure onto the response-level
/// taxonomy (§7). Circuit-open and rate-limit-timeout are produced directly
/// by [`crate::pipeline`] rather than through this conversion.
pub fn to_engine_error(provider: &str, endpoint: &str, err: &UpstreamError) -> EngineError {
    match err {
        UpstreamError::NotFound => EngineError::NotFound(format!("{provider}:{endpoint}")),
        UpstreamError::Auth(msg) => EngineError::Auth(msg.clone()),
        UpstreamError::BadRequest(msg) => {
            EngineError::UpstreamFailure(format!("{provider}:{endpoint}: {msg}"))
        }
        UpstreamError::RateLimited { .. } => {
            EngineError::RateLimitExceeded(format!("{provider}:{endpoint}"))
        }
        UpstreamError::Server(msg) => {
            EngineError::UpstreamFailure(format!("{provider}:{endpoint}: {msg}"))
        }
        UpstreamError::Timeout | UpstreamError::Transport(_) => {
            EngineError::UpstreamTimeout(format!("{provider}:{endpoint}"))
        }
    }
}
