//! Dispatch protocol exchanged over a client connection.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Clients send `run_cursor_command` and `stop_command`; the server answers
//! with `connection_confirmed`, `command_feedback` and `command_exit`.
//!
//! There is no request identifier: a client correlates results with requests
//! by connection and arrival order only.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timestamp;

/// Client event that queues a command for execution.
pub const RUN_COMMAND_EVENT: &str = "run_cursor_command";
/// Client event asking to stop the running command (acknowledged only).
pub const STOP_COMMAND_EVENT: &str = "stop_command";

/// Interpreter selected by a command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Run the message as a shell command line.
    #[serde(rename = "Terminal")]
    Terminal,
    /// Pipe the message to the agent executable.
    #[serde(rename = "cursor-agent")]
    Agent,
}

impl Mode {
    pub const ALL: [Self; 2] = [Self::Terminal, Self::Agent];

    /// Identifier used on the wire and as the key in the modes table.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Terminal => "Terminal",
            Self::Agent => "cursor-agent",
        }
    }

    /// Resolve a wire value. Absent or unrecognized values mean `Terminal`.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("cursor-agent") => Self::Agent,
            _ => Self::Terminal,
        }
    }

    /// Display metadata served by the modes query.
    pub const fn info(self) -> ModeInfo {
        match self {
            Self::Terminal => ModeInfo {
                name: "Terminal",
                description: "Execute CLI commands directly",
                icon: "\u{1f4bb}",
                color: "#00ff00",
            },
            Self::Agent => ModeInfo {
                name: "cursor-agent",
                description: "AI Assistant for code help",
                icon: "\u{1f916}",
                color: "#00ff00",
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Display metadata for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

/// The static set of supported modes keyed by wire name.
pub fn supported_modes() -> BTreeMap<&'static str, ModeInfo> {
    Mode::ALL
        .into_iter()
        .map(|mode| (mode.wire_name(), mode.info()))
        .collect()
}

/// A command to run, scoped to a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRequest {
    pub message: String,
    pub mode: Mode,
}

impl CommandRequest {
    pub fn new(message: impl Into<String>, mode: Mode) -> Self {
        Self {
            message: message.into(),
            mode,
        }
    }

    /// Validate a `run_cursor_command` payload.
    ///
    /// `message` must be a string. `mode` is optional and falls back to
    /// `Terminal` when missing, null, or not a known mode.
    pub fn from_payload(data: &Value) -> Result<Self, ProtocolError> {
        let obj = data
            .as_object()
            .ok_or_else(|| ProtocolError::InvalidCommand("payload must be an object".into()))?;
        let message = match obj.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(_) => {
                return Err(ProtocolError::InvalidCommand(
                    "`message` must be a string".into(),
                ));
            }
            None => return Err(ProtocolError::InvalidCommand("missing `message`".into())),
        };
        let mode = Mode::from_wire(obj.get("mode").and_then(Value::as_str));
        Ok(Self { message, mode })
    }
}

/// Category of a `command_feedback` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Info,
    Warning,
    Error,
    TerminalOutput,
    AiResponse,
    Success,
}

/// Intermediate result message for one in-flight command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
    pub message: String,
    pub timestamp: String,
}

impl Feedback {
    pub fn new(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: timestamp::now_rfc3339(),
        }
    }
}

/// Payload of `connection_confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfirmed {
    pub message: String,
    pub timestamp: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
}

/// Events sent from the server to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionConfirmed(ConnectionConfirmed),
    CommandFeedback(Feedback),
    CommandExit(i32),
}

impl ServerEvent {
    pub fn confirmed(client_id: impl Into<String>) -> Self {
        Self::ConnectionConfirmed(ConnectionConfirmed {
            message: "Connected to Remote CLI Server".to_string(),
            timestamp: timestamp::now_rfc3339(),
            client_id: client_id.into(),
        })
    }

    pub fn feedback(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self::CommandFeedback(Feedback::new(kind, message))
    }

    pub const fn exit(code: i32) -> Self {
        Self::CommandExit(code)
    }

    /// Serialize to a wire frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Events received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    RunCursorCommand(CommandRequest),
    StopCommand,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        match frame.event.as_str() {
            RUN_COMMAND_EVENT => CommandRequest::from_payload(&frame.data).map(Self::RunCursorCommand),
            STOP_COMMAND_EVENT => Ok(Self::StopCommand),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Encode as a wire frame, as a client would send it.
    pub fn to_frame(&self) -> String {
        let frame = match self {
            Self::RunCursorCommand(request) => serde_json::json!({
                "event": RUN_COMMAND_EVENT,
                "data": request,
            }),
            Self::StopCommand => serde_json::json!({ "event": STOP_COMMAND_EVENT }),
        };
        frame.to_string()
    }
}

/// Body of the health query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub port: u16,
    pub project_root: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(port: u16, project_root: &std::path::Path) -> Self {
        Self {
            status: "healthy",
            port,
            project_root: project_root.display().to_string(),
            timestamp: timestamp::now_rfc3339(),
        }
    }
}

/// Body of the modes query.
#[derive(Debug, Clone, Serialize)]
pub struct ModesResponse {
    pub modes: BTreeMap<&'static str, ModeInfo>,
    pub timestamp: String,
}

impl ModesResponse {
    pub fn current() -> Self {
        Self {
            modes: supported_modes(),
            timestamp: timestamp::now_rfc3339(),
        }
    }
}

/// Errors from decoding client frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON `{event, data}` object.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// A `run_cursor_command` payload failed validation.
    #[error("Invalid command request: {0}")]
    InvalidCommand(String),
}
