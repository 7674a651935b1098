//! Session router.
//!
//! Turns one inbound message from one connection into the outbound
//! messages it causes. The router holds no state of its own; everything
//! lives in the [`Registry`] it is handed.
//!
//! Only `create`/`join` misuse is answered with an `error`. Every other
//! invalid condition, including undecodable input and unknown kinds, is
//! dropped without a reply.

use rally_protocol::{codec, ClientMessage, ProtocolError, ServerMessage, StateFields};
use rally_transport::ConnectionId;
use serde_json::Value;
use tracing::{debug, trace};

use crate::registry::Registry;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Chat lines are cut to this many characters.
    pub max_chat_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { max_chat_len: 120 }
    }
}

/// A message the router wants delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Send to a single connection.
    Reply {
        to: ConnectionId,
        message: ServerMessage,
    },
    /// Send to every listed connection except `except`.
    Broadcast {
        recipients: Vec<ConnectionId>,
        except: Option<ConnectionId>,
        message: ServerMessage,
    },
}

impl Outbound {
    /// The message being delivered.
    #[must_use]
    pub fn message(&self) -> &ServerMessage {
        match self {
            Outbound::Reply { message, .. } | Outbound::Broadcast { message, .. } => message,
        }
    }

    /// Connections that will receive the message.
    #[must_use]
    pub fn targets(&self) -> Vec<&ConnectionId> {
        match self {
            Outbound::Reply { to, .. } => vec![to],
            Outbound::Broadcast {
                recipients, except, ..
            } => recipients
                .iter()
                .filter(|c| Some(*c) != except.as_ref())
                .collect(),
        }
    }
}

/// Dispatcher from inbound message kind to registry operation.
#[derive(Debug, Clone, Default)]
pub struct SessionRouter {
    config: RouterConfig,
}

impl SessionRouter {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self { config }
    }

    /// Decode raw bytes and dispatch them.
    ///
    /// Undecodable input yields nothing.
    pub fn route(
        &self,
        registry: &mut Registry,
        connection: &ConnectionId,
        raw: &[u8],
    ) -> Vec<Outbound> {
        match codec::decode(raw) {
            Ok(message) => {
                trace!(connection = %connection, kind = message.kind().as_str(), "Dispatching");
                self.dispatch(registry, connection, message)
            }
            Err(ProtocolError::UnknownKind(kind)) => {
                trace!(connection = %connection, kind = %kind, "Ignoring unknown message kind");
                Vec::new()
            }
            Err(e) => {
                debug!(connection = %connection, error = %e, "Dropping malformed message");
                Vec::new()
            }
        }
    }

    /// Dispatch a decoded message.
    pub fn dispatch(
        &self,
        registry: &mut Registry,
        connection: &ConnectionId,
        message: ClientMessage,
    ) -> Vec<Outbound> {
        match message {
            ClientMessage::Create { name } => handle_create(registry, connection, name.as_deref()),
            ClientMessage::Join { name, code } => handle_join(
                registry,
                connection,
                code.as_deref().unwrap_or_default(),
                name.as_deref(),
            ),
            ClientMessage::State(fields) => handle_state(registry, connection, &fields),
            ClientMessage::Chat { text } => self.handle_chat(registry, connection, text),
            ClientMessage::Event { ev, data } => {
                handle_event(registry, connection, ev.unwrap_or_default(), data)
            }
        }
    }

    /// Tear down whatever the connection was part of.
    ///
    /// Safe to call more than once; only the first call produces a `left`.
    pub fn disconnect(&self, registry: &mut Registry, connection: &ConnectionId) -> Vec<Outbound> {
        let Some(removed) = registry.remove_by_connection(connection) else {
            return Vec::new();
        };

        if removed.dissolved() {
            return Vec::new();
        }

        vec![Outbound::Broadcast {
            recipients: removed.remaining,
            except: None,
            message: ServerMessage::left(removed.member_id.to_string()),
        }]
    }

    fn handle_chat(
        &self,
        registry: &Registry,
        connection: &ConnectionId,
        text: Option<String>,
    ) -> Vec<Outbound> {
        let Some(member) = registry.resolve(connection) else {
            return Vec::new();
        };

        let text: String = text
            .unwrap_or_default()
            .chars()
            .take(self.config.max_chat_len)
            .collect();

        // The sender gets its own line back as confirmation.
        vec![Outbound::Broadcast {
            recipients: registry.party_connections(&member.party),
            except: None,
            message: ServerMessage::Chat {
                id: member.id.to_string(),
                name: member.name.clone(),
                text,
            },
        }]
    }
}

fn handle_create(
    registry: &mut Registry,
    connection: &ConnectionId,
    name: Option<&str>,
) -> Vec<Outbound> {
    let message = match registry.create_party(connection, name) {
        Ok(created) => ServerMessage::Welcome {
            id: created.member_id.to_string(),
            code: created.code,
            players: Vec::new(),
            color: created.color,
        },
        Err(e) => {
            debug!(connection = %connection, error = %e, "Create rejected");
            ServerMessage::error(e.to_string())
        }
    };

    vec![Outbound::Reply {
        to: connection.clone(),
        message,
    }]
}

fn handle_join(
    registry: &mut Registry,
    connection: &ConnectionId,
    code: &str,
    name: Option<&str>,
) -> Vec<Outbound> {
    let joined = match registry.join_party(connection, code, name) {
        Ok(joined) => joined,
        Err(e) => {
            debug!(connection = %connection, code = %code, error = %e, "Join rejected");
            return vec![Outbound::Reply {
                to: connection.clone(),
                message: ServerMessage::error(e.to_string()),
            }];
        }
    };

    let id = joined.member_id.to_string();
    vec![
        Outbound::Reply {
            to: connection.clone(),
            message: ServerMessage::Welcome {
                id: id.clone(),
                code: joined.code,
                players: joined.existing,
                color: joined.color.clone(),
            },
        },
        Outbound::Broadcast {
            recipients: joined.peers,
            except: Some(connection.clone()),
            message: ServerMessage::Joined {
                id,
                name: joined.name,
                color: joined.color,
            },
        },
    ]
}

fn handle_state(
    registry: &mut Registry,
    connection: &ConnectionId,
    fields: &StateFields,
) -> Vec<Outbound> {
    let Some(state) = registry.update_state(connection, fields) else {
        return Vec::new();
    };
    let Some(member) = registry.resolve(connection) else {
        return Vec::new();
    };

    vec![Outbound::Broadcast {
        recipients: registry.party_connections(&member.party),
        except: Some(connection.clone()),
        message: ServerMessage::State {
            id: member.id.to_string(),
            state,
        },
    }]
}

fn handle_event(
    registry: &Registry,
    connection: &ConnectionId,
    ev: String,
    data: Option<Value>,
) -> Vec<Outbound> {
    let Some(member) = registry.resolve(connection) else {
        return Vec::new();
    };

    let data = match data {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(data) => data,
    };

    vec![Outbound::Broadcast {
        recipients: registry.party_connections(&member.party),
        except: Some(connection.clone()),
        message: ServerMessage::Event {
            id: member.id.to_string(),
            ev,
            data,
        },
    }]
}
