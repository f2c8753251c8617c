//! Control-plane operations.
//!
//! These are the operations an operator (or a companion control service)
//! performs on a running world: kicking, announcements, cross-server private
//! messages, teleports, cell messages, global mutes, map save/reload and
//! queued spawn positions. They are plain methods returning `Result`, so any
//! transport can sit in front of them.

use log::info;
use serde::Deserialize;
use serde_json::Value;

use super::errors::WorldError;
use super::grid::Position;
use super::session::ClientSession;
use super::World;
use crate::logutil::{escape_log, sec_log};
use crate::metrics;
use crate::protocol::ServerEvent;
use crate::storage::{MapFile, StorageError};

/// Body of a cross-server private message. Field names are snake_case on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessageRequest {
    pub from_username: String,
    pub to_username: String,
    pub from_server: String,
    pub message: String,
}

/// Body of a move or load-user request.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementRequest {
    pub username: String,
    pub x: i32,
    pub y: i32,
}

impl World {
    fn require(&self, username: &str) -> Result<std::sync::Arc<ClientSession>, WorldError> {
        self.clients
            .lookup(username)
            .ok_or_else(|| WorldError::UserNotFound(username.to_string()))
    }

    fn kick_session(&self, session: &ClientSession) {
        session.send_event(&ServerEvent::Kicked {
            message: "You have been kicked.".to_string(),
        });
        self.clients.broadcast_event(
            &ServerEvent::Announcement {
                username: session.username().to_string(),
                message: "has been kicked from the server.".to_string(),
            },
            Some(session.id()),
        );
        session.disconnect();
        metrics::inc_kicks();
        sec_log!("Kicked {}", session.username());
    }

    /// Disconnect one user.
    pub fn kick_user(&self, username: &str) -> Result<(), WorldError> {
        let session = self.require(username)?;
        self.kick_session(&session);
        Ok(())
    }

    /// Disconnect everyone. Returns how many sessions were kicked.
    pub fn kick_all(&self) -> usize {
        let sessions = self.clients.snapshot();
        for session in &sessions {
            self.kick_session(session);
        }
        sessions.len()
    }

    /// Forward a pre-built JSON value to every client.
    pub fn broadcast_payload(&self, payload: Value) -> usize {
        self.clients.broadcast_event(&ServerEvent::Payload(payload), None)
    }

    /// Deliver a private message that arrived from another server.
    pub fn send_private(
        &self,
        from_username: &str,
        to_username: &str,
        from_server: &str,
        message: &str,
    ) -> Result<(), WorldError> {
        let target = self.require(to_username)?;
        target.send_event(&ServerEvent::PrivateMessage {
            from: from_username.to_string(),
            from_server: from_server.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    pub fn send_private_request(&self, request: &PrivateMessageRequest) -> Result<(), WorldError> {
        self.send_private(
            &request.from_username,
            &request.to_username,
            &request.from_server,
            &request.message,
        )
    }

    /// Teleport a user, with the same validation and notifications as a step.
    pub fn move_user(&self, username: &str, x: i32, y: i32) -> Result<Position, WorldError> {
        let session = self.require(username)?;
        self.teleport(&session, Position::new(x, y))
    }

    /// Send a cell message to everyone standing on `(x, y)`. Returns the recipient count.
    pub fn message_cell(&self, x: i32, y: i32, message: &str) -> Result<usize, WorldError> {
        let grid = self.grid();
        let cell = grid.cell_at(Position::new(x, y)).ok_or(WorldError::OutOfBounds)?;
        let event = ServerEvent::CellMessage {
            message: message.to_string(),
        };
        let delivered = cell
            .occupants()
            .iter()
            .filter_map(|name| self.clients.lookup(name))
            .filter(|session| session.send_event(&event))
            .count();
        Ok(delivered)
    }

    /// Set the global mute flag; a muted user cannot chat.
    pub fn mute_user(&self, username: &str) -> Result<(), WorldError> {
        self.require(username)?.set_muted(true);
        info!("{} muted", username);
        Ok(())
    }

    pub fn unmute_user(&self, username: &str) -> Result<(), WorldError> {
        self.require(username)?.set_muted(false);
        info!("{} unmuted", username);
        Ok(())
    }

    /// Persist the current terrain through the map store.
    pub fn save_map(&self) -> Result<(), WorldError> {
        let store = self.map_store.as_ref().ok_or(StorageError::Unconfigured)?;
        store.save(&MapFile::from_grid(&self.grid()))?;
        info!("Map saved");
        Ok(())
    }

    /// Replace the grid with the stored terrain and send every client the new snapshot.
    pub fn reload_map(&self) -> Result<(), WorldError> {
        let store = self.map_store.as_ref().ok_or(StorageError::Unconfigured)?;
        let next = store.load()?.into_grid()?;
        info!("Reloading map ({}x{})", next.width(), next.height());
        self.swap_grid(next);
        self.clients.broadcast_event(&self.snapshot_event(), None);
        Ok(())
    }

    /// Queue a spawn position for `username`'s next login.
    pub fn load_user(&self, username: &str, x: i32, y: i32) {
        info!("Queued spawn for {} at ({},{})", escape_log(username), x, y);
        self.pending_spawns
            .insert(username.to_string(), Position::new(x, y));
    }

    pub fn load_user_request(&self, request: &PlacementRequest) {
        self.load_user(&request.username, request.x, request.y);
    }

    pub fn move_user_request(&self, request: &PlacementRequest) -> Result<Position, WorldError> {
        self.move_user(&request.username, request.x, request.y)
    }
}
