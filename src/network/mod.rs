//! Network Layer
//!
//! WebSocket server, wire protocol, and JWT validation. All game rules run
//! through `game/` - this layer only authenticates, parses, and routes.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{
    ClientMessage, ServerMessage, ErrorCode, ServerError,
    GuessSubmission, LeaderboardRequest,
};
pub use server::{GameServer, ServerConfig, GameServerError};
