//! Xbox Live integration
//!
//! Architecture:
//! - api: capability traits the rest of the crate depends on
//! - auth: OAuth2 authorization-code helpers and endpoint constants
//! - client: reqwest implementation of the capability surface
//! - xbl_auth: xal-driven code exchange, refresh and XSTS authorization
//! - headers: Xbox Live request headers (XBL3.0 auth, MS-CV, contract versions)
//! - models: upstream record types and the token set

pub mod api;
pub mod auth;
pub mod client;
pub mod headers;
pub mod models;
pub mod xbl_auth;

pub use api::{ConsoleApi, ConsoleConnector, TransportSettings};
pub use client::{XboxLiveClient, XboxLiveConnector};
pub use models::{PresenceShape, RawPresence, ShapePreference, TokenSet};
