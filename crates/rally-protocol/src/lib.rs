//! # rally-protocol
//!
//! Wire protocol definitions for the Rally party relay.
//!
//! Clients and the server exchange JSON objects discriminated by a `type`
//! field. This crate defines those messages, the player state carried in
//! them, and the codec that turns bytes into messages and back.
//!
//! ## Message Kinds
//!
//! - `create` / `join` - Party membership
//! - `state` - Player transform updates
//! - `chat` / `event` - Party-wide relay
//! - `welcome` / `joined` / `left` / `error` - Server notifications
//!
//! ## Example
//!
//! ```rust
//! use rally_protocol::{codec, ClientMessage, ServerMessage};
//!
//! let msg = codec::decode(br#"{"type":"create","name":"Ada"}"#).unwrap();
//! assert!(matches!(msg, ClientMessage::Create { .. }));
//!
//! let reply = codec::encode(&ServerMessage::left("2")).unwrap();
//! assert_eq!(&reply[..], br#"{"type":"left","id":"2"}"#);
//! ```

pub mod codec;
pub mod messages;
pub mod state;

pub use codec::{decode, encode, ProtocolError};
pub use messages::{ClientMessage, MessageKind, PlayerInfo, ServerMessage, StateFields};
pub use state::PlayerState;
