//! Shared error type across wsmux crates.

use thiserror::Error;

/// Stable error codes (logs, metrics labels, test vectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Namespace unknown to the responding side.
    BadNamespace,
    /// Room unknown to the responding side.
    BadRoom,
    /// Error text produced by the remote peer.
    Remote,
    /// Message could not be queued for writing.
    Write,
    /// Connection already closed.
    Closed,
    /// Deadline exceeded.
    Timeout,
    /// Wait cancelled by the caller.
    Cancelled,
    /// Malformed payload.
    InvalidPayload,
    /// Peer went away.
    UnexpectedEof,
    /// Transport-level failure.
    Transport,
    /// Invalid input / configuration.
    BadRequest,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and vectors.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadNamespace => "BAD_NAMESPACE",
            ErrorCode::BadRoom => "BAD_ROOM",
            ErrorCode::Remote => "REMOTE",
            ErrorCode::Write => "WRITE",
            ErrorCode::Closed => "CLOSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::UnexpectedEof => "UNEXPECTED_EOF",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, WsMuxError>;

/// Unified error type used by core and engine.
///
/// Errors travel inside [`crate::Message`] values, so the type is `Clone`
/// and comparable. Only the display text crosses the wire; see
/// [`WsMuxError::from_text`] for the reverse mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WsMuxError {
    #[error("bad namespace")]
    BadNamespace,
    #[error("bad room")]
    BadRoom,
    /// Free-form error text, usually returned by a remote event handler.
    #[error("{0}")]
    Remote(String),
    #[error("write closed")]
    Write,
    #[error("use of closed connection")]
    Closed,
    #[error("timeout")]
    Timeout,
    #[error("context canceled")]
    Cancelled,
    #[error("invalid payload")]
    InvalidPayload,
    #[error("unexpected EOF")]
    UnexpectedEof,
    #[error("transport: {0}")]
    Transport(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl WsMuxError {
    /// Build a free-form error, the usual way for handlers to reject.
    pub fn remote(text: impl Into<String>) -> Self {
        WsMuxError::Remote(text.into())
    }

    /// Rebuild an error from its wire text. The two protocol sentinels map
    /// back to their variants; anything else becomes [`WsMuxError::Remote`].
    pub fn from_text(text: &str) -> Self {
        match text {
            "bad namespace" => WsMuxError::BadNamespace,
            "bad room" => WsMuxError::BadRoom,
            other => WsMuxError::Remote(other.to_owned()),
        }
    }

    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            WsMuxError::BadNamespace => ErrorCode::BadNamespace,
            WsMuxError::BadRoom => ErrorCode::BadRoom,
            WsMuxError::Remote(_) => ErrorCode::Remote,
            WsMuxError::Write => ErrorCode::Write,
            WsMuxError::Closed => ErrorCode::Closed,
            WsMuxError::Timeout => ErrorCode::Timeout,
            WsMuxError::Cancelled => ErrorCode::Cancelled,
            WsMuxError::InvalidPayload => ErrorCode::InvalidPayload,
            WsMuxError::UnexpectedEof => ErrorCode::UnexpectedEof,
            WsMuxError::Transport(_) => ErrorCode::Transport,
            WsMuxError::BadRequest(_) => ErrorCode::BadRequest,
            WsMuxError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            WsMuxError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// True when the peer went away or the connection is already torn down.
    pub fn is_close_error(&self) -> bool {
        matches!(
            self,
            WsMuxError::Closed | WsMuxError::UnexpectedEof | WsMuxError::Write
        )
    }

    /// True when a deadline expired.
    pub fn is_timeout_error(&self) -> bool {
        matches!(self, WsMuxError::Timeout)
    }
}
