//! Core building blocks shared by the comic shelf backend and its consumers.
//!
//! This crate defines the error taxonomy, the timeout and retry primitives wrapped around
//! every remote call, the execution-result normalizer and the comic data model.

/// Error taxonomy and HTTP status classification.
pub mod error;
/// Execution-result decoding for the description function.
pub mod normalization;
/// Backoff policy and sequential retry loop.
pub mod retry;
/// Deadline race for remote calls.
pub mod timeout;
/// Comic records, request payloads and tuning values.
pub mod types;

pub use error::{ComicError, ErrorKind, StatusClass, classify_http_status};
pub use normalization::{ExecutionEnvelope, ExecutionPayload, PayloadField, normalize_execution};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use timeout::with_timeout;
pub use types::{
    BackendTuning, ComicPatch, ComicPayload, ComicRecord, ComicStatus, CoverUrl,
    DescriptionRequest, timestamp_now,
};
