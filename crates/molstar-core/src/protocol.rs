//! The relay's response wrapper.
//!
//! A successful call comes back as
//!
//! ```text
//! {"success": true, "responses": [{"data": {"output": "<envelope JSON text>"}}]}
//! ```
//!
//! The viewer's reply is an envelope encoded as JSON *text* inside the JSON
//! body. [`unwrap_output`] is the single place that peels the outer layer;
//! [`decode_response`] then decodes the inner envelope.

use crate::envelope::Envelope;
use crate::error::{BridgeError, Result, ShapeViolation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One viewer's answer: `{"data": {"output": "<envelope JSON text>"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerReply {
    pub data: ReplyData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyData {
    pub output: String,
}

impl ViewerReply {
    /// Wrap a populated envelope the way a viewer page does.
    pub fn new(envelope: &Envelope) -> Result<Self> {
        Ok(Self::from_output(envelope.to_json_compact()?))
    }

    pub fn from_output(output: impl Into<String>) -> Self {
        Self {
            data: ReplyData {
                output: output.into(),
            },
        }
    }
}

/// Body returned by the relay's run endpoint.
///
/// `responses` holds raw JSON values since the relay passes viewer messages
/// through without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub responses: Vec<Value>,
}

impl RunResponse {
    pub fn success(responses: Vec<Value>) -> Self {
        Self {
            success: true,
            message: Some("All viewers answered".to_string()),
            responses,
        }
    }

    pub fn failure(message: impl Into<String>, responses: Vec<Value>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            responses,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

fn shape_error(violation: ShapeViolation, body: &str) -> BridgeError {
    BridgeError::ProtocolShape {
        violation,
        body: body.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Extract the inner envelope text from a relay response body.
///
/// Checks run in a fixed order and stop at the first violation:
/// the body is a JSON object; `responses` is a non-empty array; `success` is
/// truthy; `responses[0].data.output` is a string.
pub fn unwrap_output(body: &str) -> Result<String> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| shape_error(ShapeViolation::NotAMapping, body))?;
    let map = value
        .as_object()
        .ok_or_else(|| shape_error(ShapeViolation::NotAMapping, body))?;

    let responses = map
        .get("responses")
        .and_then(Value::as_array)
        .ok_or_else(|| shape_error(ShapeViolation::MissingResponses, body))?;
    let first = responses
        .first()
        .ok_or_else(|| shape_error(ShapeViolation::EmptyResponses, body))?;

    if !map.get("success").map_or(false, is_truthy) {
        return Err(shape_error(ShapeViolation::NotSuccessful, body));
    }

    let output = first
        .get("data")
        .and_then(|data| data.get("output"))
        .ok_or_else(|| shape_error(ShapeViolation::MissingOutput, body))?;
    output
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| shape_error(ShapeViolation::OutputNotText, body))
}

/// Validate a relay response body and decode the viewer's envelope.
pub fn decode_response(body: &str) -> Result<Envelope> {
    let output = unwrap_output(body)?;
    Envelope::from_json(&output)
}
