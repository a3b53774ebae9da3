//! Wire protocol: request, response and event envelopes plus typed arguments and bodies.

use crate::debugger::{Breakpoint, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REQUEST: &str = "request";
pub const RESPONSE: &str = "response";
pub const EVENT: &str = "event";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    CreateSession,
    ListSessions,
    SetSource,
    Start,
    Pause,
    Resume,
    Stop,
    AddBreakpoint,
    RemoveBreakpoint,
    SetBreakpoints,
    GetBreakpoints,
    ListenEvents,
}

/// Request envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Response envelope.
///
/// Failed responses carry `code` and `message`, successful ones may carry a `body`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub request_seq: i64,
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn new(seq: i64, request_seq: i64, command: &str, result: Result<Option<Value>, Status>) -> Self {
        let (success, code, message, body) = match result {
            Ok(body) => (true, None, None, body),
            Err(status) => (false, Some(status.code), Some(status.message), None),
        };
        Self {
            seq,
            r#type: RESPONSE.to_string(),
            request_seq,
            command: command.to_string(),
            success,
            code,
            message,
            body,
        }
    }

    /// Convert response into a call result.
    pub fn into_result(self) -> Result<Option<Value>, Status> {
        if self.success {
            return Ok(self.body);
        }
        Err(Status {
            code: self.code.unwrap_or(Code::Internal),
            message: self.message.unwrap_or_default(),
        })
    }
}

/// Event envelope, sent over a connection turned into an event stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub event: Event,
}

impl EventMessage {
    pub fn new(seq: i64, event: Event) -> Self {
        Self {
            seq,
            r#type: EVENT.to_string(),
            event,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Code {
    NotFound,
    FailedPrecondition,
    InvalidArgument,
    Internal,
}

/// Call failure, a status code plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: Code::NotFound,
            message: message.into(),
        }
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self {
            code: Code::FailedPrecondition,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: Code::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: Code::Internal,
            message: message.into(),
        }
    }
}

// ---------------------------------- arguments -----------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetSourceArgs {
    pub session_id: String,
    pub filename: String,
    /// Raw source bytes.
    pub source: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BreakpointArgs {
    pub session_id: String,
    pub filename: String,
    pub lineno: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetBreakpointsArgs {
    pub session_id: String,
    pub breakpoints: Vec<Breakpoint>,
}

// ---------------------------------- bodies --------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionBody {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListBody {
    pub session_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BreakpointsBody {
    pub breakpoints: Vec<Breakpoint>,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_names() {
        assert_eq!(Command::CreateSession.to_string(), "create_session");
        assert_eq!(
            "listen_events".parse::<Command>().unwrap(),
            Command::ListenEvents
        );
        assert!("launch".parse::<Command>().is_err());
    }

    #[test]
    fn test_error_response() {
        let response = Response::new(
            3,
            7,
            "start",
            Err(Status::failed_precondition("Session already running")),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "seq": 3,
                "type": "response",
                "request_seq": 7,
                "command": "start",
                "success": false,
                "code": "failed_precondition",
                "message": "Session already running",
            })
        );
        assert_eq!(
            response.into_result(),
            Err(Status::failed_precondition("Session already running"))
        );
    }

    #[test]
    fn test_event_message() {
        let msg: EventMessage = serde_json::from_value(json!({
            "seq": 1,
            "type": "event",
            "event": {"kind": "stdout", "message": "hi\n"},
        }))
        .unwrap();
        assert_eq!(
            msg.event,
            Event::Stdout {
                message: "hi\n".to_string()
            }
        );
    }
}
