//! Two-frame envelope codec for the request/reply protocol.
//!
//! Every message on the wire is a pair of frames: frame 0 carries the topic
//! (opaque bytes, conventionally uppercase ASCII), frame 1 a UTF-8 JSON
//! payload. Requests and replies share the shape; only the payload schema
//! differs. The codec is stateless and owns no sockets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an incoming payload could not be turned into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Frame 1 is not valid JSON (or not valid UTF-8).
    #[error("malformed JSON payload: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// A required field is absent or has the wrong type.
    #[error("missing or wrong-typed field: {0}")]
    MissingField(&'static str),
}

/// A parsed intent request.
///
/// Valid iff `request_id`, `reply_to` and `intent` are all present as
/// strings. Anything less is logged and dropped by the caller — an invalid
/// request never gets a reply.
#[derive(Debug, Clone)]
pub struct Request {
    /// Frame 0, verbatim.
    pub topic: String,
    /// Caller-chosen unique identifier, echoed into the reply.
    pub request_id: String,
    /// Topic the reply must be published on.
    pub reply_to: String,
    /// Free-form text, or a JSON object with `task` / `data` / `skill`.
    pub intent: String,
    /// Caller-supplied Unix time in seconds, if any.
    pub timestamp: Option<f64>,
}

/// Reply status on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Timeout,
}

/// An outgoing reply, prior to serialization.
///
/// `timestamp` is stamped in [`serialize_reply`], not here, so the wire
/// value reflects publish time rather than construction time.
#[derive(Debug, Clone)]
pub struct Reply {
    pub reply_to: String,
    pub request_id: String,
    pub status: Status,
    pub content: String,
    pub error: String,
}

impl Reply {
    /// Reply for a child that exited 0; `content` is its stdout capture.
    pub fn success(request_id: &str, reply_to: &str, content: String) -> Self {
        Self {
            reply_to: reply_to.to_string(),
            request_id: request_id.to_string(),
            status: Status::Success,
            content,
            error: String::new(),
        }
    }

    /// Reply for any failure; `error` carries the human-readable diagnostic.
    pub fn error(request_id: &str, reply_to: &str, error: String) -> Self {
        Self {
            reply_to: reply_to.to_string(),
            request_id: request_id.to_string(),
            status: Status::Error,
            content: String::new(),
            error,
        }
    }
}

/// Wire schema of the reply payload. All five fields always serialize;
/// empty strings stay empty strings, never omitted.
#[derive(Serialize)]
struct ReplyPayload<'a> {
    request_id: &'a str,
    status: Status,
    content: &'a str,
    error: &'a str,
    timestamp: f64,
}

fn string_field(obj: &Value, name: &'static str) -> Result<String, ParseError> {
    obj.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ParseError::MissingField(name))
}

/// Parse the two frames of a request envelope.
///
/// The topic frame is captured verbatim (lossy UTF-8 — topics are opaque to
/// us). The payload frame must be a JSON object carrying the three required
/// string fields.
pub fn parse_request(topic: &[u8], payload: &[u8]) -> Result<Request, ParseError> {
    let value: Value = serde_json::from_slice(payload)?;

    Ok(Request {
        topic: String::from_utf8_lossy(topic).into_owned(),
        request_id: string_field(&value, "request_id")?,
        reply_to: string_field(&value, "reply_to")?,
        intent: string_field(&value, "intent")?,
        timestamp: value.get("timestamp").and_then(Value::as_f64),
    })
}

/// Serialize a reply into its two wire frames, stamping `timestamp` now.
pub fn serialize_reply(reply: &Reply) -> (Vec<u8>, Vec<u8>) {
    let payload = ReplyPayload {
        request_id: &reply.request_id,
        status: reply.status,
        content: &reply.content,
        error: &reply.error,
        timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
    };
    // ReplyPayload has no map keys or non-string-keyed types; serialization
    // cannot fail.
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    (reply.reply_to.clone().into_bytes(), bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let payload = br#"{"request_id":"r1","reply_to":"REPLY_1","intent":"hello","timestamp":1720000000.5}"#;
        let req = parse_request(b"TOPIC_ECHO", payload).expect("valid request should parse");
        assert_eq!(req.topic, "TOPIC_ECHO");
        assert_eq!(req.request_id, "r1");
        assert_eq!(req.reply_to, "REPLY_1");
        assert_eq!(req.intent, "hello");
        assert_eq!(req.timestamp, Some(1720000000.5));
    }

    #[test]
    fn test_parse_without_timestamp() {
        let payload = br#"{"request_id":"r1","reply_to":"R","intent":"x"}"#;
        let req = parse_request(b"T", payload).expect("timestamp is optional");
        assert!(req.timestamp.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let payload = br#"{"request_id":"r1","intent":"x"}"#;
        match parse_request(b"T", payload) {
            Err(ParseError::MissingField(name)) => assert_eq!(name, "reply_to"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        let payload = br#"{"request_id":42,"reply_to":"R","intent":"x"}"#;
        match parse_request(b"T", payload) {
            Err(ParseError::MissingField(name)) => assert_eq!(name, "request_id"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_request(b"T", b"not json"),
            Err(ParseError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_serialize_reply_frames() {
        let reply = Reply::success("r1", "REPLY_1", "output".to_string());
        let (topic, payload) = serialize_reply(&reply);
        assert_eq!(topic, b"REPLY_1");

        let v: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(v["request_id"], "r1");
        assert_eq!(v["status"], "success");
        assert_eq!(v["content"], "output");
        assert_eq!(v["error"], "");
        assert!(v["timestamp"].as_f64().unwrap() > 1_700_000_000.0);
    }

    #[test]
    fn test_error_reply_keeps_empty_content() {
        let reply = Reply::error("r2", "R", "boom".to_string());
        let (_, payload) = serialize_reply(&reply);
        let v: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["content"], "");
        assert_eq!(v["error"], "boom");
    }
}
