//! # rally-core
//!
//! Party registry and session routing for the Rally party relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Codes** - Join codes, default names and member colors
//! - **Directory** - Connection handle to party seat lookup
//! - **Registry** - Parties, members and their lifecycle
//! - **Router** - Inbound message dispatch and fan-out rules
//! - **Hub** - Serialized entry point and disconnect hook
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│     Hub     │────▶│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Outbox    │◀────│  Outbound   │     │  Registry   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

pub mod codes;
pub mod directory;
pub mod hub;
pub mod party;
pub mod registry;
pub mod router;

pub use codes::{CodeSource, RandomCodes};
pub use directory::{Directory, Seat};
pub use hub::Hub;
pub use party::{Member, MemberId, Party, PartyCode};
pub use registry::{
    Created, Joined, Registry, RegistryConfig, RegistryError, RegistryStats, Removed,
};
pub use router::{Outbound, RouterConfig, SessionRouter};
