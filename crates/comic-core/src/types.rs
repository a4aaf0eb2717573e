use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::{error::ComicError, retry::RetryPolicy};

/// Maximum title length accepted by the collection schema.
pub const TITLE_MAX_CHARS: usize = 255;
/// Highest star rating.
pub const MAX_RATING: u8 = 5;

/// Default deadline for document store calls.
pub const DEFAULT_RECORD_TIMEOUT_MS: u64 = 15_000;
/// Default deadline for one function execution attempt.
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 45_000;
/// Default deadline for the reachability probe.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
/// Default deadline for a cover upload.
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 60_000;

/// Cover size requested by list cards.
pub const LIST_COVER_SIZE: (u32, u32) = (300, 450);
/// Cover size requested by the detail screen.
pub const DETAIL_COVER_SIZE: (u32, u32) = (800, 1200);

const TIMESTAMP_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z";

/// Text form of [`CoverUrl::Placeholder`].
pub const PLACEHOLDER_COVER_URL: &str = "placeholder:cover";

/// Reading status of a comic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ComicStatus {
    /// `read`: rating must be 1-5.
    Read,
    /// `to-read`: rating must be 0.
    ToRead,
}

impl ComicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ToRead => "to-read",
        }
    }
}

impl fmt::Display for ComicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComicStatus {
    type Err = ComicError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "read" => Ok(Self::Read),
            "to-read" => Ok(Self::ToRead),
            "" => Err(ComicError::invalid_argument("status", "status is required")),
            other => Err(ComicError::invalid_argument(
                "status",
                format!("unknown status '{other}', expected 'read' or 'to-read'"),
            )),
        }
    }
}

/// A comic document as stored in the remote collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComicRecord {
    /// Store-assigned document id.
    #[serde(rename = "$id")]
    pub id: String,
    pub title: String,
    pub status: ComicStatus,
    /// Optional attribute; the store returns `null` when it was never set.
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: u8,
    /// Opaque media-host reference, not a URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Full document body sent on create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComicPayload {
    pub title: String,
    pub status: ComicStatus,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ComicPayload {
    /// Build a payload stamped with the current time for both timestamps.
    pub fn new(title: impl Into<String>, status: ComicStatus, rating: u8) -> Self {
        let now = timestamp_now();
        Self {
            title: title.into(),
            status,
            rating,
            cover_image: None,
            description: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_cover_image(mut self, reference: impl Into<String>) -> Self {
        self.cover_image = Some(reference.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check the collection's data rules before submission.
    ///
    /// The backend never calls this; it is offered to callers that build payloads.
    pub fn validate(&self) -> Result<(), ComicError> {
        validate_title(&self.title)?;
        validate_rating(self.status, self.rating)
    }

    /// Whether `record` holds exactly this payload's fields.
    pub fn matches(&self, record: &ComicRecord) -> bool {
        record.title == self.title
            && record.status == self.status
            && record.rating == self.rating
            && record.cover_image == self.cover_image
            && record.description == self.description
            && record.created_at.as_deref() == Some(self.created_at.as_str())
            && record.updated_at.as_deref() == Some(self.updated_at.as_str())
    }
}

/// Fields sent on update. Absent fields are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComicPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ComicStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    /// `Some(None)` sends `null`, removing the stored cover.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub cover_image: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ComicPatch {
    /// Patch that resends every editable field of `record`.
    pub fn from_record(record: &ComicRecord) -> Self {
        Self {
            title: Some(record.title.clone()),
            status: Some(record.status),
            rating: Some(record.rating),
            cover_image: Some(record.cover_image.clone()),
            description: Some(record.description.clone()),
            updated_at: record.updated_at.clone(),
        }
    }

    /// Stamp `updatedAt` with the current time.
    pub fn touched(mut self) -> Self {
        self.updated_at = Some(timestamp_now());
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Keeps an explicit `null` distinct from a missing field.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Input of the description generation function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptionRequest {
    pub title: String,
    pub status: ComicStatus,
    pub rating: u8,
}

impl DescriptionRequest {
    /// Trim and validate raw inputs. An absent rating is sent as 0.
    pub fn new(title: &str, status: &str, rating: Option<u8>) -> Result<Self, ComicError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ComicError::invalid_argument("title", "title is required"));
        }
        let status = status.parse::<ComicStatus>()?;

        Ok(Self {
            title: title.to_owned(),
            status,
            rating: rating.unwrap_or(0),
        })
    }

    /// JSON body handed to the function runtime.
    pub fn to_body(&self) -> Result<String, ComicError> {
        serde_json::to_string(self)
            .map_err(|err| ComicError::Internal(format!("description request encoding: {err}")))
    }
}

/// Display URL derived for a cover reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverUrl {
    /// Resized variant served by the media host.
    Remote(String),
    /// No reference; the presentation layer shows its placeholder.
    Placeholder,
}

impl CoverUrl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Remote(url) => url,
            Self::Placeholder => PLACEHOLDER_COVER_URL,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

/// Deadlines and retry budget applied by the backend façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTuning {
    pub record_timeout: Duration,
    pub execution_timeout: Duration,
    pub probe_timeout: Duration,
    pub upload_timeout: Duration,
    /// Probe reachability before executing the description function.
    pub probe_before_execute: bool,
    pub execution_retry: RetryPolicy,
}

impl Default for BackendTuning {
    fn default() -> Self {
        Self {
            record_timeout: Duration::from_millis(DEFAULT_RECORD_TIMEOUT_MS),
            execution_timeout: Duration::from_millis(DEFAULT_EXECUTION_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            upload_timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
            probe_before_execute: true,
            execution_retry: RetryPolicy::default(),
        }
    }
}

/// Current UTC time as an RFC 3339 string with fixed millisecond precision.
pub fn timestamp_now() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

/// Fixed-width fractional seconds keep the text form sortable.
fn format_timestamp(at: OffsetDateTime) -> String {
    time::format_description::parse(TIMESTAMP_FORMAT)
        .ok()
        .and_then(|format| at.format(&format).ok())
        .unwrap_or_else(|| at.unix_timestamp().to_string())
}

fn validate_title(title: &str) -> Result<(), ComicError> {
    let chars = title.chars().count();
    if title.trim().is_empty() {
        return Err(ComicError::invalid_argument("title", "title is required"));
    }
    if chars > TITLE_MAX_CHARS {
        return Err(ComicError::invalid_argument(
            "title",
            format!("title is {chars} characters, maximum is {TITLE_MAX_CHARS}"),
        ));
    }
    Ok(())
}

fn validate_rating(status: ComicStatus, rating: u8) -> Result<(), ComicError> {
    match status {
        ComicStatus::Read if !(1..=MAX_RATING).contains(&rating) => Err(
            ComicError::invalid_argument("rating", "rating must be between 1 and 5 for read comics"),
        ),
        ComicStatus::ToRead if rating != 0 => Err(ComicError::invalid_argument(
            "rating",
            "rating must be 0 for comics not read yet",
        )),
        _ => Ok(()),
    }
}
