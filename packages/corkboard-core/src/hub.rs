/// JSON hub protocol framing for the push channel.
///
/// Every message is a JSON object terminated by the ASCII record separator.
/// A connection opens with a protocol handshake; after that the client
/// invokes `JoinDashboard` or `JoinBoard(id)` and the server invokes
/// `DashboardUpdated` / `BoardUpdated` whenever its data changes.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::Scope;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

pub const JOIN_INVOCATION_ID: &str = "join";

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Invalid hub frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hub handshake rejected: {0}")]
    Handshake(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        target: String,
        arguments: Vec<Value>,
        invocation_id: Option<String>,
    },
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
    },
    /// Streaming and cancellation messages; this client never uses them.
    Other(u8),
}

/// Server-originated invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    DashboardUpdated,
    /// Carries the board id when the server sends one.
    BoardUpdated(Option<String>),
}

impl PushEvent {
    /// Whether the event invalidates the view subscribed to `scope`.
    pub fn concerns(&self, scope: &Scope) -> bool {
        match (self, scope) {
            (PushEvent::DashboardUpdated, Scope::Dashboard) => true,
            (PushEvent::BoardUpdated(None), Scope::Board(_)) => true,
            (PushEvent::BoardUpdated(Some(id)), Scope::Board(viewed)) => id == viewed,
            _ => false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Client handshake frame, separator included.
pub fn handshake_request() -> String {
    format!(r#"{{"protocol":"json","version":1}}{}"#, RECORD_SEPARATOR)
}

/// Validate the server handshake. Returns any frames that arrived in the
/// same transport message after it.
pub fn parse_handshake(text: &str) -> Result<&str, HubError> {
    let (head, rest) = text.split_once(RECORD_SEPARATOR).unwrap_or((text, ""));
    let response: HandshakeResponse = serde_json::from_str(head)?;
    match response.error {
        Some(error) => Err(HubError::Handshake(error)),
        None => Ok(rest),
    }
}

impl HubMessage {
    pub fn join(scope: &Scope) -> Self {
        let (target, arguments) = match scope {
            Scope::Dashboard => ("JoinDashboard", vec![]),
            Scope::Board(id) => ("JoinBoard", vec![Value::String(id.clone())]),
        };
        HubMessage::Invocation {
            target: target.to_string(),
            arguments,
            invocation_id: Some(JOIN_INVOCATION_ID.to_string()),
        }
    }

    /// The invalidation this message announces, if any.
    pub fn event(&self) -> Option<PushEvent> {
        let HubMessage::Invocation {
            target, arguments, ..
        } = self
        else {
            return None;
        };
        match target.as_str() {
            "DashboardUpdated" => Some(PushEvent::DashboardUpdated),
            "BoardUpdated" => Some(PushEvent::BoardUpdated(
                arguments.first().and_then(Value::as_str).map(str::to_string),
            )),
            _ => None,
        }
    }

    /// Encode as one frame, separator included.
    pub fn encode(&self) -> Result<String, HubError> {
        let raw = match self {
            HubMessage::Invocation {
                target,
                arguments,
                invocation_id,
            } => RawMessage {
                kind: INVOCATION,
                target: Some(target.clone()),
                arguments: Some(arguments.clone()),
                invocation_id: invocation_id.clone(),
                ..Default::default()
            },
            HubMessage::Completion {
                invocation_id,
                error,
            } => RawMessage {
                kind: COMPLETION,
                invocation_id: Some(invocation_id.clone()),
                error: error.clone(),
                ..Default::default()
            },
            HubMessage::Ping => RawMessage {
                kind: PING,
                ..Default::default()
            },
            HubMessage::Close { error } => RawMessage {
                kind: CLOSE,
                error: error.clone(),
                ..Default::default()
            },
            HubMessage::Other(kind) => RawMessage {
                kind: *kind,
                ..Default::default()
            },
        };
        let mut frame = serde_json::to_string(&raw)?;
        frame.push(RECORD_SEPARATOR);
        Ok(frame)
    }

    fn decode_one(frame: &str) -> Result<Self, HubError> {
        let raw: RawMessage = serde_json::from_str(frame)?;
        Ok(match raw.kind {
            INVOCATION => HubMessage::Invocation {
                target: raw.target.unwrap_or_default(),
                arguments: raw.arguments.unwrap_or_default(),
                invocation_id: raw.invocation_id,
            },
            COMPLETION => HubMessage::Completion {
                invocation_id: raw.invocation_id.unwrap_or_default(),
                error: raw.error,
            },
            PING => HubMessage::Ping,
            CLOSE => HubMessage::Close { error: raw.error },
            other => HubMessage::Other(other),
        })
    }

    /// Split a transport message into frames and decode each one.
    pub fn decode_all(text: &str) -> Vec<Result<Self, HubError>> {
        text.split(RECORD_SEPARATOR)
            .filter(|frame| !frame.trim().is_empty())
            .map(Self::decode_one)
            .collect()
    }
}
