use thiserror::Error;

use super::grid::CellType;
use crate::storage::StorageError;
use crate::validation::UsernameError;

/// Errors raised by world operations.
///
/// The `Display` text of the user-facing variants is exactly what the
/// connection receives, so handlers can forward `err.to_string()` as-is.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("Channel already exists.")]
    ChannelExists,

    #[error("Channel not found.")]
    ChannelNotFound,

    #[error("You are not in any channel.")]
    NotInChannel,

    #[error("User '{0}' not found.")]
    UserNotFound(String),

    #[error("{0} already exists in the muted users")]
    AlreadyMuted(String),

    #[error("{0} is not in the mute list to unmute")]
    NotMuted(String),

    #[error("You cannot move outside the grid")]
    OutOfBounds,

    /// Target cell exists but its terrain cannot be entered.
    #[error("{}", blocked_message(.0))]
    Blocked(CellType),

    #[error("Path not found.")]
    PathNotFound,

    /// A walk step ran into a cell that stopped being passable mid-walk.
    #[error("Path blocked.")]
    PathBlocked,

    /// The walk that requested a step is no longer the session's current walk.
    #[error("walk superseded")]
    WalkSuperseded,

    #[error("Username '{0}' is already connected.")]
    UsernameTaken(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(#[from] UsernameError),

    #[error("map storage error: {0}")]
    Storage(#[from] StorageError),
}

fn blocked_message(kind: &CellType) -> &'static str {
    match kind {
        CellType::Mountain => "You cannot move onto a mountain",
        _ => "You cannot move to that location",
    }
}
