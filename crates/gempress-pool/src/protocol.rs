//! Control protocol between the supervisor and its workers.
//!
//! Messages are newline-delimited JSON arrays tagged by their first
//! element: `["stop"]` and `["status"]` in, `["stop", true]`,
//! `["status", true, <job-or-null>, <running>]`, `[<tag>, false]` and
//! `["error", <message>]` back out.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::PoolError;

/// A request the supervisor sends to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Ask the worker to stop claiming jobs and exit after the current one.
    Stop,
    /// Ask for the worker's current job and running flag.
    Status,
}

impl ControlRequest {
    /// Serialize to a JSON line (with newline).
    pub fn to_line(&self) -> String {
        let value = match self {
            ControlRequest::Stop => json!(["stop"]),
            ControlRequest::Status => json!(["status"]),
        };
        let mut line = value.to_string();
        line.push('\n');
        line
    }
}

/// Worker-side view of one incoming control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRequest {
    /// A recognized request.
    Known(ControlRequest),
    /// A well-formed message with an unrecognized tag, echoed back
    /// negatively.
    Unknown(String),
    /// Not a tagged array at all.
    Malformed,
}

/// Parse one line received on a worker's control channel.
pub fn parse_request(line: &str) -> ParsedRequest {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return ParsedRequest::Malformed;
    };
    let Some(items) = value.as_array() else {
        return ParsedRequest::Malformed;
    };
    // An empty array has no tag and counts as malformed.
    let Some(tag) = items.first().and_then(Value::as_str) else {
        return ParsedRequest::Malformed;
    };

    match tag {
        "stop" => ParsedRequest::Known(ControlRequest::Stop),
        "status" => ParsedRequest::Known(ControlRequest::Status),
        other => ParsedRequest::Unknown(other.to_string()),
    }
}

/// A reply a worker sends back over its control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Stop acknowledged; the worker will exit after its current job.
    Stopped,
    /// Status snapshot.
    Status {
        current_job: Option<Uuid>,
        running: bool,
    },
    /// Echo of an unrecognized tag.
    Unknown { tag: String },
    /// The incoming line was not a valid message.
    Error { message: String },
}

impl ControlReply {
    /// The reply for malformed input.
    pub fn invalid_format() -> Self {
        ControlReply::Error {
            message: "Invalid message format".to_string(),
        }
    }

    /// Serialize to a JSON line (with newline).
    pub fn to_line(&self) -> String {
        let value = match self {
            ControlReply::Stopped => json!(["stop", true]),
            ControlReply::Status {
                current_job,
                running,
            } => json!(["status", true, current_job, running]),
            ControlReply::Unknown { tag } => json!([tag, false]),
            ControlReply::Error { message } => json!(["error", message]),
        };
        let mut line = value.to_string();
        line.push('\n');
        line
    }

    /// Deserialize from a JSON line.
    pub fn from_line(line: &str) -> Result<Self, PoolError> {
        let value: Value = serde_json::from_str(line.trim())
            .map_err(|e| PoolError::Protocol(format!("not valid json: {e}")))?;
        let items = value
            .as_array()
            .ok_or_else(|| PoolError::Protocol(format!("not an array: {line}")))?;
        let tag = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| PoolError::Protocol(format!("missing tag: {line}")))?;

        match (tag, items.get(1)) {
            ("stop", Some(Value::Bool(true))) => Ok(ControlReply::Stopped),
            ("status", Some(Value::Bool(true))) if items.len() == 4 => {
                let current_job = match &items[2] {
                    Value::Null => None,
                    Value::String(s) => Some(Uuid::parse_str(s).map_err(|e| {
                        PoolError::Protocol(format!("bad job id in status reply: {e}"))
                    })?),
                    other => {
                        return Err(PoolError::Protocol(format!(
                            "bad job field in status reply: {other}"
                        )))
                    }
                };
                let running = items[3]
                    .as_bool()
                    .ok_or_else(|| PoolError::Protocol(format!("bad running flag: {line}")))?;
                Ok(ControlReply::Status {
                    current_job,
                    running,
                })
            }
            ("error", Some(Value::String(message))) => Ok(ControlReply::Error {
                message: message.clone(),
            }),
            (tag, Some(Value::Bool(false))) => Ok(ControlReply::Unknown {
                tag: tag.to_string(),
            }),
            _ => Err(PoolError::Protocol(format!("unrecognized reply: {line}"))),
        }
    }
}

/// Result of a supervisor status query, including the timeout sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// The worker answered within the timeout.
    Responded {
        current_job: Option<Uuid>,
        running: bool,
    },
    /// No answer within the timeout (or the channel is gone).
    NoResponse,
}

impl WorkerStatus {
    /// Serialize to the wire shape used when reporting status upstream.
    pub fn to_line(&self) -> String {
        let value = match self {
            WorkerStatus::Responded {
                current_job,
                running,
            } => json!(["status", true, current_job, running]),
            WorkerStatus::NoResponse => json!(["no response", false]),
        };
        let mut line = value.to_string();
        line.push('\n');
        line
    }
}
