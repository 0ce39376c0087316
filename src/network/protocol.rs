//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Messages are
//! internally tagged JSON text frames, human-readable on purpose - binary
//! framing is reserved for the store snapshot, where bincode actually works
//! (it cannot encode internally-tagged enums).

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::geo::Coordinate;
use crate::game::engine::{EngineError, GuessScore, RoundStarted};
use crate::game::round::RoundId;
use crate::game::stats::{LeaderboardEntry, SortKey};
use crate::store::UserRecord;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with an externally-issued token.
    Auth(AuthRequest),

    /// Start a new guessing round.
    StartRound,

    /// Submit a guess for an active round.
    SubmitGuess(GuessSubmission),

    /// Request a leaderboard page.
    Leaderboard(LeaderboardRequest),

    /// Request the caller's own profile and quota.
    Profile,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Externally-issued JWT.
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

/// A guess for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessSubmission {
    /// Round being answered (UUID string).
    pub round_id: String,
    /// Guessed latitude in decimal degrees.
    pub lat: f64,
    /// Guessed longitude in decimal degrees.
    pub lng: f64,
}

impl GuessSubmission {
    /// Parse the round id from its UUID string form.
    pub fn parse_round_id(&self) -> Option<RoundId> {
        RoundId::parse(&self.round_id)
    }

    /// The guessed coordinate, unvalidated (the engine validates).
    pub fn coordinate(&self) -> Coordinate {
        Coordinate { lat: self.lat, lng: self.lng }
    }
}

/// Leaderboard page request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRequest {
    /// Ranking metric.
    #[serde(default)]
    pub sort_key: SortKey,
    /// Zero-based page number.
    #[serde(default)]
    pub page: usize,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// A round was created for the caller.
    RoundStarted(RoundStartedInfo),

    /// The guess was accepted and scored.
    GuessResult(GuessResultInfo),

    /// The guess arrived past the deadline; the round expired unscored.
    RoundExpired(RoundExpiredInfo),

    /// One leaderboard page.
    Leaderboard(LeaderboardPage),

    /// The caller's profile and quota.
    Profile(ProfileInfo),

    /// Pong response.
    Pong {
        /// Echo of the client timestamp.
        timestamp: u64,
        /// Server wall-clock millis.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Authenticated user id (hex) if successful.
    pub user_id: Option<String>,
    /// Display name the server will use.
    pub display_name: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// A freshly started round. The true coordinate is never present here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStartedInfo {
    /// Round id (UUID string).
    pub round_id: String,
    /// Opaque panorama reference to render.
    pub content_ref: String,
    /// Server-authoritative deadline.
    pub expires_at: DateTime<Utc>,
    /// Moves left today.
    pub moves_remaining: u32,
}

impl From<RoundStarted> for RoundStartedInfo {
    fn from(started: RoundStarted) -> Self {
        Self {
            round_id: started.round_id.to_string(),
            content_ref: started.content_ref,
            expires_at: started.expires_at,
            moves_remaining: started.moves_remaining,
        }
    }
}

/// Scoring result of an accepted guess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessResultInfo {
    /// Round id (UUID string).
    pub round_id: String,
    /// Great-circle error in meters.
    pub distance_error_m: f64,
    /// Awarded score.
    pub score: f64,
    /// Seconds from round start to the guess.
    pub elapsed_secs: f64,
    /// The true coordinate, safe to reveal now.
    pub true_coordinate: Coordinate,
}

impl GuessResultInfo {
    /// Build from an engine scoring result.
    pub fn from_score(round_id: RoundId, score: GuessScore) -> Self {
        Self {
            round_id: round_id.to_string(),
            distance_error_m: score.distance_error_m,
            score: score.score,
            elapsed_secs: score.elapsed_secs,
            true_coordinate: score.true_coordinate,
        }
    }
}

/// Notification that a round expired instead of scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundExpiredInfo {
    /// Round id (UUID string).
    pub round_id: String,
    /// The deadline that passed.
    pub expired_at: DateTime<Utc>,
}

/// One leaderboard page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardPage {
    /// Ranking metric used.
    pub sort_key: SortKey,
    /// Zero-based page number.
    pub page: usize,
    /// Ranked entries.
    pub entries: Vec<LeaderboardEntry>,
}

/// The caller's own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileInfo {
    /// User id (hex).
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Cumulative score.
    pub total_score: f64,
    /// Completed rounds.
    pub games_played: u32,
    /// Running mean distance error in meters.
    pub avg_error_m: f64,
    /// Running mean time-to-guess in seconds.
    pub avg_time_secs: f64,
    /// Moves left today.
    pub daily_moves_remaining: u32,
    /// Next quota refill instant.
    pub quota_reset_at: DateTime<Utc>,
}

impl From<UserRecord> for ProfileInfo {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.id.to_string(),
            display_name: user.display_name,
            total_score: user.total_score,
            games_played: user.games_played,
            avg_error_m: user.avg_error_m,
            avg_time_secs: user.avg_time_secs,
            daily_moves_remaining: user.daily_moves_remaining,
            quota_reset_at: user.quota_reset_at,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Machine-readable error codes. The presentation layer branches on the
/// code, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No moves left in today's quota.
    QuotaExhausted,
    /// The user already has an active round.
    RoundAlreadyInProgress,
    /// The round already reached a terminal state.
    RoundNotActive,
    /// The round belongs to another user.
    Forbidden,
    /// The content store had no location to serve.
    LocationUnavailable,
    /// A concurrent-write race lost after retrying.
    Conflict,
    /// Malformed request payload (bad coordinate, bad round id, bad JSON).
    InvalidInput,
    /// The referenced round does not exist.
    UnknownRound,
    /// The user is not registered.
    UnknownUser,
    /// Authentication required or failed.
    NotAuthenticated,
    /// Unclassified server-side failure.
    InternalError,
}

/// Error envelope sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Advisory human-readable message.
    pub message: String,
}

impl From<&EngineError> for ServerError {
    fn from(err: &EngineError) -> Self {
        let code = match err {
            EngineError::QuotaExhausted => ErrorCode::QuotaExhausted,
            EngineError::RoundAlreadyInProgress => ErrorCode::RoundAlreadyInProgress,
            EngineError::RoundNotActive => ErrorCode::RoundNotActive,
            EngineError::Forbidden => ErrorCode::Forbidden,
            EngineError::LocationUnavailable => ErrorCode::LocationUnavailable,
            EngineError::Conflict => ErrorCode::Conflict,
            EngineError::InvalidCoordinate { .. } => ErrorCode::InvalidInput,
            EngineError::UnknownRound(_) => ErrorCode::UnknownRound,
            EngineError::UnknownUser(_) => ErrorCode::UnknownUser,
            EngineError::Store(_) => ErrorCode::InternalError,
        };
        Self { code, message: err.to_string() }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// TESTS
// =============================================================================
