//! Message types for the Rally protocol.
//!
//! Every message is a JSON object whose `type` field selects the variant.
//! Clients send [`ClientMessage`]s and receive [`ServerMessage`]s.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::codec::ProtocolError;
use crate::state::PlayerState;

/// Message kind identifiers, as they appear in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Create,
    Join,
    State,
    Chat,
    Event,
    Welcome,
    Joined,
    Left,
    Error,
}

impl MessageKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Create => "create",
            MessageKind::Join => "join",
            MessageKind::State => "state",
            MessageKind::Chat => "chat",
            MessageKind::Event => "event",
            MessageKind::Welcome => "welcome",
            MessageKind::Joined => "joined",
            MessageKind::Left => "left",
            MessageKind::Error => "error",
        }
    }

    /// Whether a client is allowed to send this kind.
    #[must_use]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            MessageKind::Create
                | MessageKind::Join
                | MessageKind::State
                | MessageKind::Chat
                | MessageKind::Event
        )
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, ProtocolError> {
        match value {
            "create" => Ok(MessageKind::Create),
            "join" => Ok(MessageKind::Join),
            "state" => Ok(MessageKind::State),
            "chat" => Ok(MessageKind::Chat),
            "event" => Ok(MessageKind::Event),
            "welcome" => Ok(MessageKind::Welcome),
            "joined" => Ok(MessageKind::Joined),
            "left" => Ok(MessageKind::Left),
            "error" => Ok(MessageKind::Error),
            _ => Err(ProtocolError::UnknownKind(value.to_string())),
        }
    }
}

/// Raw transform fields as sent by a client.
///
/// Values are kept untyped so that bad input can be coerced to defaults
/// instead of rejecting the whole message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFields {
    #[serde(default)]
    pub x: Option<Value>,
    #[serde(default)]
    pub y: Option<Value>,
    #[serde(default)]
    pub z: Option<Value>,
    #[serde(default)]
    pub yaw: Option<Value>,
    #[serde(default)]
    pub pitch: Option<Value>,
    #[serde(default)]
    pub chap: Option<Value>,
    #[serde(default)]
    pub anim: Option<Value>,
}

/// A message sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Create a new party and become its first member.
    Create {
        /// Requested display name.
        #[serde(default, deserialize_with = "lenient_string")]
        name: Option<String>,
    },

    /// Join an existing party by code.
    Join {
        /// Requested display name.
        #[serde(default, deserialize_with = "lenient_string")]
        name: Option<String>,
        /// Join code, matched case-insensitively.
        #[serde(default, deserialize_with = "lenient_code")]
        code: Option<String>,
    },

    /// Latest transform of the sender.
    State(StateFields),

    /// Chat line for the whole party.
    Chat {
        #[serde(default, deserialize_with = "lenient_string")]
        text: Option<String>,
    },

    /// Free-form game event relayed to the rest of the party.
    Event {
        /// Event name.
        #[serde(default, deserialize_with = "lenient_string")]
        ev: Option<String>,
        /// Event payload.
        #[serde(default)]
        data: Option<Value>,
    },
}

impl ClientMessage {
    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::Create { .. } => MessageKind::Create,
            ClientMessage::Join { .. } => MessageKind::Join,
            ClientMessage::State(_) => MessageKind::State,
            ClientMessage::Chat { .. } => MessageKind::Chat,
            ClientMessage::Event { .. } => MessageKind::Event,
        }
    }
}

/// A string field; any other JSON type reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// A join code; a number reads as its decimal text.
fn lenient_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Public view of a party member, as listed in a `welcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub color: String,
    /// Last known transform, absent until the member sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlayerState>,
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to a successful `create` or `join`.
    Welcome {
        /// The receiver's own member id.
        id: String,
        /// The party join code.
        code: String,
        /// Members already in the party, excluding the receiver.
        players: Vec<PlayerInfo>,
        /// The receiver's assigned color.
        color: String,
    },

    /// Another member joined the party.
    Joined {
        id: String,
        name: String,
        color: String,
    },

    /// A member left the party.
    Left { id: String },

    /// Relayed transform of another member.
    State {
        id: String,
        #[serde(flatten)]
        state: PlayerState,
    },

    /// Relayed chat line.
    Chat {
        id: String,
        name: String,
        text: String,
    },

    /// Relayed game event.
    Event { id: String, ev: String, data: Value },

    /// Request rejected.
    Error { msg: String },
}

impl ServerMessage {
    /// Get the message kind.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Welcome { .. } => MessageKind::Welcome,
            ServerMessage::Joined { .. } => MessageKind::Joined,
            ServerMessage::Left { .. } => MessageKind::Left,
            ServerMessage::State { .. } => MessageKind::State,
            ServerMessage::Chat { .. } => MessageKind::Chat,
            ServerMessage::Event { .. } => MessageKind::Event,
            ServerMessage::Error { .. } => MessageKind::Error,
        }
    }

    /// Create a new Error message.
    #[must_use]
    pub fn error(msg: impl Into<String>) -> Self {
        ServerMessage::Error { msg: msg.into() }
    }

    /// Create a new Left message.
    #[must_use]
    pub fn left(id: impl Into<String>) -> Self {
        ServerMessage::Left { id: id.into() }
    }
}
