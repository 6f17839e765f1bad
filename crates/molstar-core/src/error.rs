//! Error types for the Molstar bridge.
//!
//! Errors fall into four families that callers are expected to tell apart:
//! construction errors (bad call field values, caught before any I/O),
//! decode errors (JSON that is not the expected shape, unknown variants),
//! transport errors (relay unreachable, timeouts) and protocol-shape errors
//! (a response that does not match the wrapper layout).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The specific way a relay response deviated from the expected wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeViolation {
    /// The body is not JSON, or is JSON but not an object.
    NotAMapping,
    /// No `responses` key, or it is not an array.
    MissingResponses,
    /// `responses` is present but empty.
    EmptyResponses,
    /// `success` is missing or falsy.
    NotSuccessful,
    /// `responses[0]` lacks `data.output`.
    MissingOutput,
    /// `data.output` is present but is not a string.
    OutputNotText,
}

impl std::fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ShapeViolation::NotAMapping => "response body is not a JSON object",
            ShapeViolation::MissingResponses => "missing 'responses' array",
            ShapeViolation::EmptyResponses => "'responses' array is empty",
            ShapeViolation::NotSuccessful => "'success' flag is missing or false",
            ShapeViolation::MissingOutput => "responses[0] has no 'data.output' field",
            ShapeViolation::OutputNotText => "responses[0].data.output is not a string",
        };
        f.write_str(text)
    }
}

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Construction errors
    #[error("Invalid value for {field}: {message}")]
    Construction { field: String, message: String },

    // Decode errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Expected a JSON object for {context}, got {found}")]
    NotAMapping {
        context: &'static str,
        found: &'static str,
    },

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Unknown call variant: {name}")]
    UnknownVariant { name: String },

    #[error("Expected a {expected} call, got {found}")]
    VariantMismatch { expected: String, found: String },

    /// A well-formed relay response whose `output` did not decode.
    #[error("Undecodable viewer reply ({source}); raw body: {body}")]
    ReplyDecode {
        body: String,
        #[source]
        source: Box<BridgeError>,
    },

    // Transport errors
    #[error("Remote unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("HTTP error from {url} (status {status:?}): {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    // Protocol-shape errors
    #[error("Malformed response ({violation}); raw body: {body}")]
    ProtocolShape {
        violation: ShapeViolation,
        body: String,
    },

    // Supervisor errors
    #[error("Viewer server at {url} not reachable after {waited:?}")]
    ReadinessTimeout { url: String, waited: Duration },

    #[error("Failed to launch {program}: {message}")]
    LaunchFailed { program: String, message: String },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a construction error for a call field.
    pub fn construction(field: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Construction {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure against the URL it was sent to.
    pub fn from_reqwest(err: reqwest::Error, url: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else if err.is_connect() {
            BridgeError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            BridgeError::Transport {
                url: url.to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }

    /// Whether the relay could not be reached or did not answer in time.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BridgeError::Unreachable { .. }
                | BridgeError::Timeout { .. }
                | BridgeError::Transport { .. }
        )
    }

    /// Whether the relay answered but the answer had the wrong shape.
    pub fn is_protocol(&self) -> bool {
        matches!(self, BridgeError::ProtocolShape { .. })
    }

    /// Whether a payload could not be decoded into a typed call.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            BridgeError::Json { .. }
                | BridgeError::NotAMapping { .. }
                | BridgeError::MissingField { .. }
                | BridgeError::UnknownVariant { .. }
                | BridgeError::VariantMismatch { .. }
                | BridgeError::ReplyDecode { .. }
        )
    }

    /// The raw relay response body, when the error kept it.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            BridgeError::ProtocolShape { body, .. } | BridgeError::ReplyDecode { body, .. } => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// The underlying failure of a [`BridgeError::ReplyDecode`], or `self`.
    pub fn decode_cause(&self) -> &BridgeError {
        match self {
            BridgeError::ReplyDecode { source, .. } => source.decode_cause(),
            other => other,
        }
    }

    /// The shape violation, if this is a protocol-shape error.
    pub fn shape_violation(&self) -> Option<ShapeViolation> {
        match self {
            BridgeError::ProtocolShape { violation, .. } => Some(*violation),
            _ => None,
        }
    }
}

/// Name a JSON value's kind for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
