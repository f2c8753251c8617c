//! # World - Shared Server State
//!
//! [World] is the single aggregate every connection works against. It owns:
//!
//! - **Grid**: terrain plus per-cell occupants, swappable as a whole on map reload
//! - **Clients**: username → live [session::ClientSession]
//! - **Channels**: named chat rooms
//! - **Pending spawns**: positions queued by the control plane for the next login
//! - **Map store / travel issuer**: persistence and handoff credentials behind traits
//!
//! ## Locking
//!
//! Locks are plain `std::sync` primitives held for one mutation and never
//! across an `.await`. When several are needed they are always taken in the
//! order grid → session state → {cell occupants, channel members}. A poisoned
//! lock is recovered rather than propagated.
//!
//! Movement lives in [movement] and the control-plane operations in [admin];
//! both are `impl World` blocks.

pub mod admin;
pub mod channels;
pub mod clients;
pub mod errors;
pub mod grid;
pub mod movement;
pub mod pathfinding;
pub mod rate_limit;
pub mod session;

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::logutil::{escape_log, sec_log};
use crate::metrics;
use crate::protocol::{Outbound, ServerEvent};
use crate::storage::MapStore;
use crate::travel::TravelIssuer;
use crate::validation::validate_username;

pub use channels::{Channel, ChannelRegistry};
pub use clients::ClientRegistry;
pub use errors::WorldError;
pub use grid::{CellType, Grid, Position};
pub use session::ClientSession;

use rate_limit::CommandRateLimiter;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What to do when a username that is already connected logs in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLoginPolicy {
    /// Refuse the new connection.
    #[default]
    Reject,
    /// Disconnect the existing session and admit the new one.
    Replace,
}

/// Runtime knobs the world needs, derived from the config file.
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub server_name: String,
    pub duplicate_login: DuplicateLoginPolicy,
    pub step_delay: Duration,
    pub max_tokens: u32,
    pub fill_interval: Duration,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            server_name: "current_server_name".to_string(),
            duplicate_login: DuplicateLoginPolicy::Reject,
            step_delay: Duration::from_secs(3),
            max_tokens: rate_limit::DEFAULT_MAX_TOKENS,
            fill_interval: rate_limit::DEFAULT_FILL_INTERVAL,
        }
    }
}

pub struct World {
    settings: WorldSettings,
    grid: RwLock<Arc<Grid>>,
    clients: ClientRegistry,
    channels: ChannelRegistry,
    pending_spawns: DashMap<String, Position>,
    map_store: Option<Arc<dyn MapStore>>,
    travel: Arc<dyn TravelIssuer>,
}

impl World {
    pub fn new(settings: WorldSettings, grid: Grid, travel: Arc<dyn TravelIssuer>) -> Self {
        Self {
            settings,
            grid: RwLock::new(Arc::new(grid)),
            clients: ClientRegistry::new(),
            channels: ChannelRegistry::new(),
            pending_spawns: DashMap::new(),
            map_store: None,
            travel,
        }
    }

    pub fn with_map_store(mut self, store: Arc<dyn MapStore>) -> Self {
        self.map_store = Some(store);
        self
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn server_name(&self) -> &str {
        &self.settings.server_name
    }

    /// The current grid. A later map reload does not affect the returned handle.
    pub fn grid(&self) -> Arc<Grid> {
        Arc::clone(&read(&self.grid))
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn travel(&self) -> &dyn TravelIssuer {
        self.travel.as_ref()
    }

    pub fn snapshot_event(&self) -> ServerEvent {
        ServerEvent::GridSnapshot(self.grid().snapshot())
    }

    /// Validate, register and place a new session.
    ///
    /// The session spawns at its pending spawn when one was queued and is
    /// still enterable, otherwise at the origin.
    pub fn admit(
        &self,
        username: &str,
        origin_server: Option<String>,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Arc<ClientSession>, WorldError> {
        if let Err(e) = validate_username(username) {
            sec_log!("Rejected username '{}': {}", escape_log(username), e);
            return Err(e.into());
        }

        let session = Arc::new(ClientSession::new(
            username,
            origin_server,
            tx,
            CommandRateLimiter::new(self.settings.max_tokens, self.settings.fill_interval),
            self.settings.step_delay,
        ));

        match self.settings.duplicate_login {
            DuplicateLoginPolicy::Reject => {
                if let Err(e) = self.clients.register(Arc::clone(&session)) {
                    sec_log!("Duplicate login rejected for {}", username);
                    return Err(e);
                }
            }
            DuplicateLoginPolicy::Replace => {
                if let Some(prior) = self.clients.replace(Arc::clone(&session)) {
                    sec_log!("Login for {} replaced an existing session", username);
                    prior.send_event(&ServerEvent::Kicked {
                        message: "You have been replaced by a new login.".to_string(),
                    });
                    prior.disconnect();
                    self.detach(&prior);
                }
            }
        }

        let spawn = self.pending_spawns.remove(username).map(|(_, pos)| pos);
        {
            let grid = read(&self.grid);
            let position = spawn
                .filter(|pos| grid.is_passable(*pos))
                .unwrap_or(Position::ORIGIN);
            let mut state = session.state();
            grid.place(username, session.id(), position);
            state.position = position;
            state.placed = true;
        }

        metrics::inc_sessions_opened();
        info!(
            "Admitted {} at {}{}",
            username,
            session.position(),
            session
                .origin_server()
                .map(|s| format!(" from {}", escape_log(s)))
                .unwrap_or_default()
        );
        Ok(session)
    }

    /// Tell everyone else that `session` arrived.
    pub fn announce_arrival(&self, session: &ClientSession) {
        let text = match session.origin_server() {
            Some(server) => format!(
                "{} transferred from {} and joined the chat!",
                session.username(),
                server
            ),
            None => format!("{} joined the chat!", session.username()),
        };
        self.clients.broadcast_text(&text, Some(session.id()));
    }

    /// Tear down a session whose connection ended.
    pub fn depart(&self, session: &ClientSession) {
        session.mark_closed();
        let was_registered = self.clients.unregister(session);
        self.detach(session);
        if was_registered {
            self.clients.broadcast_text(
                &format!("{} left the chat!", session.username()),
                Some(session.id()),
            );
        }
        metrics::inc_sessions_closed();
        debug!("{} departed (registered: {})", session.username(), was_registered);
    }

    /// Remove `session` from its channel and its grid cell.
    fn detach(&self, session: &ClientSession) {
        let grid = read(&self.grid);
        let mut state = session.state();
        if let Some(channel) = state.channel.take() {
            channel.remove_member(session.id());
        }
        if state.placed {
            grid.remove(session.username(), session.id(), state.position);
            state.placed = false;
        }
    }

    /// Move `session` to the cell chosen by `pick`, which receives the current
    /// position while the session lock is held.
    ///
    /// The destination must be in bounds and enterable. Occupancy and the
    /// recorded position change together.
    pub(crate) fn apply_move<F>(&self, session: &ClientSession, pick: F) -> Result<Position, WorldError>
    where
        F: FnOnce(Position) -> Result<Position, WorldError>,
    {
        let grid = read(&self.grid);
        let mut state = session.state();
        if !state.placed {
            return Err(WorldError::WalkSuperseded);
        }
        let from = state.position;
        let to = pick(from)?;
        let kind = grid.terrain_at(to).ok_or(WorldError::OutOfBounds)?;
        if !kind.is_passable() {
            return Err(WorldError::Blocked(kind));
        }
        grid.relocate(session.username(), session.id(), from, to);
        state.position = to;
        Ok(to)
    }

    /// Swap in a new grid, re-seating every placed session on it.
    ///
    /// A session whose cell is out of bounds or no longer enterable moves to
    /// the nearest passable cell. On a grid with no passable cell it stays put,
    /// or goes to the origin when its old cell is out of bounds.
    pub(crate) fn swap_grid(&self, next: Grid) {
        let mut guard = write(&self.grid);
        for session in self.clients.snapshot() {
            let mut state = session.state();
            if !state.placed {
                continue;
            }
            if !next.is_passable(state.position) {
                let from = state.position;
                state.position = match next.nearest_passable(from) {
                    Some(open) => open,
                    None if next.in_bounds(from) => from,
                    None => Position::ORIGIN,
                };
                debug!("Re-seated {} from {} to {}", session.username(), from, state.position);
            }
            next.place(session.username(), session.id(), state.position);
        }
        *guard = Arc::new(next);
    }
}
