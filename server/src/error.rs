use shared::CodecError;
use thiserror::Error;

/// Failure taxonomy shared by every server subsystem
///
/// Subsystems surface these as values; the session dispatch boundary logs
/// them so one bad packet never reaches the tick loops or other sessions.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unknown {kind} {id}")]
    UnknownEntity { kind: &'static str, id: u32 },

    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] bincode::Error),
}

impl ServerError {
    pub fn unknown_player(id: u32) -> Self {
        ServerError::UnknownEntity { kind: "player", id }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServerError::InvalidState(message.into())
    }

    pub fn heartbeat_timeout(player_id: u32, limit: std::time::Duration) -> Self {
        ServerError::Timeout(format!(
            "no heartbeat from player {} within {:?}",
            player_id, limit
        ))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
