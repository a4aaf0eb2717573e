use std::time::Duration;

use thiserror::Error;

/// Fieldless classification of [`ComicError`], used for matching and user-facing handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input failed a precondition before any network call.
    InvalidArgument,
    /// A wrapped call did not settle before its deadline.
    Timeout,
    /// The reachability probe failed before the primary call.
    Unreachable,
    /// Execution payload could not be parsed.
    MalformedResponse,
    /// Execution result carried no payload at all.
    EmptyResponse,
    /// Execution payload lacked a success flag or description.
    InvalidResponse,
    /// The remote function reported an error explicitly.
    RemoteError,
    /// The store reported that the target document does not exist.
    NotFound,
    /// A backend answered with a failure status other than 404.
    StoreError,
    /// The media host rejected or failed the upload.
    UploadFailed,
    /// Transport-level failure (connect, TLS, body read).
    Network,
    /// Internal bug or invariant break.
    Internal,
}

/// Error returned by every façade operation.
///
/// Each variant maps to exactly one [`ErrorKind`]; callers match on the variant (or on
/// [`ComicError::kind`]) instead of inspecting messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComicError {
    #[error("invalid argument '{field}': {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// The underlying effect may still complete after this is reported.
    #[error("timed out after {deadline_ms}ms ({label})")]
    Timeout { label: String, deadline_ms: u64 },

    #[error("network error or endpoint unreachable ({endpoint}): {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("invalid response format from function: {0}")]
    MalformedResponse(String),

    #[error("no response received from function")]
    EmptyResponse,

    #[error("invalid response from function: {0}")]
    InvalidResponse(String),

    #[error("function reported an error: {0}")]
    RemoteError(String),

    #[error("document not found: {id}")]
    NotFound { id: String },

    #[error("store error {code}: {message}")]
    StoreError { code: u16, message: String },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ComicError {
    /// Build an `InvalidArgument` for `field`.
    pub fn invalid_argument(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Build a `Timeout` for the call identified by `label`.
    pub fn timeout(label: impl Into<String>, deadline: Duration) -> Self {
        Self::Timeout {
            label: label.into(),
            deadline_ms: deadline.as_millis().min(u128::from(u64::MAX)) as u64,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unreachable { .. } => ErrorKind::Unreachable,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::RemoteError(_) => ErrorKind::RemoteError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::StoreError { .. } => ErrorKind::StoreError,
            Self::UploadFailed(_) => ErrorKind::UploadFailed,
            Self::Network { .. } => ErrorKind::Network,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::RemoteError => "remote_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StoreError => "store_error",
            ErrorKind::UploadFailed => "upload_failed",
            ErrorKind::Network => "network_error",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Whether a read path should offer the user a retry action for this failure.
    pub fn is_retryable_on_read(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Unreachable | ErrorKind::StoreError | ErrorKind::Network
        )
    }
}

/// How a backend failure status is treated by the façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 404: the addressed document does not exist.
    NotFound,
    /// Any other failure status, passed through unmodified.
    Opaque,
}

/// Map backend HTTP status codes to the façade's classification.
pub fn classify_http_status(status: u16) -> StatusClass {
    match status {
        404 => StatusClass::NotFound,
        _ => StatusClass::Opaque,
    }
}
