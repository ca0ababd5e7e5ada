//! Network Layer
//!
//! WebSocket transport for observers and bettors. This layer is
//! **non-deterministic** - all round logic runs through `game/`.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{ClientMessage, ErrorCode, RoundInfo, ServerError, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
