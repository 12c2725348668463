use thiserror::Error;

use crate::state::PlayerState;

pub type Result<T> = std::result::Result<T, PlayerError>;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player was killed; it accepts no further commands
    #[error("player is dead")]
    Dead,

    /// The requested transition is not allowed from the current state
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: PlayerState,
        action: &'static str,
    },

    /// Volume must stay within `(0, 1]`
    #[error("volume {0} out of range (0, 1]")]
    InvalidVolume(f32),

    /// The entry has no local resource yet
    #[error("entry is not materialized")]
    NotReady,

    /// The output sink or its process refused the request
    #[error("output sink failed: {0}")]
    Sink(String),

    /// Entry-level failure (materialization, trim bounds)
    #[error(transparent)]
    Entry(#[from] voxentry::EntryError),
}

impl PlayerError {
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink(message.into())
    }
}
