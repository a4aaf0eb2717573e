use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ComicError;

/// Envelope fields that may carry the function's output, in preference order.
const PAYLOAD_FIELDS: [PayloadField; 2] = [PayloadField::Response, PayloadField::ResponseBody];

/// Execution result field that carried the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    /// `response`, used by older runtimes.
    Response,
    /// `responseBody`.
    ResponseBody,
}

impl PayloadField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::ResponseBody => "responseBody",
        }
    }
}

/// Function output before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionPayload {
    /// JSON text that still needs parsing.
    Encoded(String),
    /// Already-structured value.
    Structured(Value),
}

/// Shape of an execution result as far as the payload is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEnvelope {
    Present {
        field: PayloadField,
        payload: ExecutionPayload,
    },
    Absent,
}

impl ExecutionEnvelope {
    /// Select the first present payload field.
    ///
    /// `null` and empty strings count as absent, so an empty `response` falls through to
    /// `responseBody`.
    pub fn decode(execution: &Value) -> Self {
        for field in PAYLOAD_FIELDS {
            let payload = match execution.get(field.as_str()) {
                None | Some(Value::Null) => continue,
                Some(Value::String(text)) if text.is_empty() => continue,
                Some(Value::String(text)) => ExecutionPayload::Encoded(text.clone()),
                Some(value) => ExecutionPayload::Structured(value.clone()),
            };
            return Self::Present { field, payload };
        }
        Self::Absent
    }
}

/// Reduce an execution result to the generated description.
pub fn normalize_execution(execution: &Value) -> Result<String, ComicError> {
    let (field, payload) = match ExecutionEnvelope::decode(execution) {
        ExecutionEnvelope::Present { field, payload } => (field, payload),
        ExecutionEnvelope::Absent => {
            warn!("execution result carried neither response nor responseBody");
            return Err(ComicError::EmptyResponse);
        }
    };

    let reply = match payload {
        ExecutionPayload::Encoded(text) => serde_json::from_str::<Value>(&text).map_err(|err| {
            warn!(field = field.as_str(), error = %err, "failed to parse execution payload");
            ComicError::MalformedResponse(format!("{}: {err}", field.as_str()))
        })?,
        ExecutionPayload::Structured(value) => value,
    };
    debug!(field = field.as_str(), "decoded execution payload");

    let reply = match reply {
        Value::Null => return Err(ComicError::EmptyResponse),
        Value::Object(map) => map,
        other => {
            return Err(ComicError::InvalidResponse(format!(
                "expected an object, got {}",
                json_type_name(&other)
            )));
        }
    };

    if let Some(error) = reply.get("error").filter(|value| is_truthy(value)) {
        let message = match error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Err(ComicError::RemoteError(message));
    }

    if !reply.get("success").is_some_and(is_truthy) {
        return Err(ComicError::InvalidResponse("missing success flag".to_owned()));
    }

    match reply.get("description") {
        Some(Value::String(description)) if !description.is_empty() => Ok(description.clone()),
        _ => Err(ComicError::InvalidResponse(
            "missing description field".to_owned(),
        )),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
