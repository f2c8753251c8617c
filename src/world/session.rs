//! Per-connection client state.
//!
//! A [ClientSession] is created when a connection is admitted and shared via
//! `Arc` between the connection task, the registries, channel member lists and
//! any running walk. Mutable fields live behind one state mutex; the walk
//! generation and connected flag are atomics so walks can check them cheaply.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use super::channels::Channel;
use super::errors::WorldError;
use super::grid::Position;
use super::lock;
use super::rate_limit::CommandRateLimiter;
use crate::protocol::{Outbound, ServerEvent};

/// Mutable session fields, guarded together.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub position: Position,
    /// Global mute set by the control plane.
    pub muted: bool,
    /// Local ignore list.
    pub muted_usernames: HashSet<String>,
    pub channel: Option<Arc<Channel>>,
    pub rate_limiter: CommandRateLimiter,
    /// True while the session has an entry in some grid cell.
    pub placed: bool,
}

#[derive(Debug)]
pub struct ClientSession {
    id: Uuid,
    username: String,
    origin_server: Option<String>,
    tx: mpsc::UnboundedSender<Outbound>,
    state: Mutex<SessionState>,
    walk_generation: AtomicU64,
    connected: AtomicBool,
    kick: Notify,
    step_delay: Duration,
}

impl ClientSession {
    pub fn new(
        username: impl Into<String>,
        origin_server: Option<String>,
        tx: mpsc::UnboundedSender<Outbound>,
        rate_limiter: CommandRateLimiter,
        step_delay: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            origin_server,
            tx,
            state: Mutex::new(SessionState {
                position: Position::ORIGIN,
                muted: false,
                muted_usernames: HashSet::new(),
                channel: None,
                rate_limiter,
                placed: false,
            }),
            walk_generation: AtomicU64::new(0),
            connected: AtomicBool::new(true),
            kick: Notify::new(),
            step_delay,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Server the client travelled from, if it arrived with a handoff token.
    pub fn origin_server(&self) -> Option<&str> {
        self.origin_server.as_deref()
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }

    pub fn position(&self) -> Position {
        self.state().position
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.state().muted = muted;
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.state().channel.clone()
    }

    /// Queue a raw outbound message. Returns false once the writer is gone.
    pub fn send(&self, message: Outbound) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send(Outbound::text(text))
    }

    pub fn send_event(&self, event: &ServerEvent) -> bool {
        self.send(Outbound::event(event))
    }

    /// Add `target` to the local ignore list.
    pub fn mute_user(&self, target: &str) -> Result<(), WorldError> {
        if self.state().muted_usernames.insert(target.to_string()) {
            Ok(())
        } else {
            Err(WorldError::AlreadyMuted(target.to_string()))
        }
    }

    pub fn unmute_user(&self, target: &str) -> Result<(), WorldError> {
        if self.state().muted_usernames.remove(target) {
            Ok(())
        } else {
            Err(WorldError::NotMuted(target.to_string()))
        }
    }

    pub fn is_ignoring(&self, username: &str) -> bool {
        self.state().muted_usernames.contains(username)
    }

    /// Consume one command token.
    pub fn allow_command(&self) -> bool {
        self.state().rate_limiter.is_allowed()
    }

    /// Start a new walk and return its generation. Any older walk stops at its next step.
    pub fn begin_walk(&self) -> u64 {
        self.walk_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Invalidate any running walk without starting a new one.
    pub fn supersede_walks(&self) {
        self.walk_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current_walk(&self, generation: u64) -> bool {
        self.is_connected() && self.walk_generation.load(Ordering::SeqCst) == generation
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ask the connection task to end. The request is remembered if the
    /// read loop is not currently waiting.
    pub fn disconnect(&self) {
        self.mark_closed();
        self.kick.notify_one();
    }

    /// Resolves once [ClientSession::disconnect] has been called.
    pub async fn kicked(&self) {
        self.kick.notified().await;
    }

    /// Flag the session as gone and stop its walks.
    pub fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.supersede_walks();
    }
}
