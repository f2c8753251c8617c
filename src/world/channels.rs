//! Named chat channels.
//!
//! Channels live for the lifetime of the process once created. A session is
//! a member of at most one channel; the session's state holds the pointer and
//! the channel holds the member list, and both change under the session lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::errors::WorldError;
use super::lock;
use super::session::ClientSession;

pub struct Channel {
    name: String,
    title: Mutex<Option<String>>,
    members: Mutex<HashMap<Uuid, Arc<ClientSession>>>,
}

impl Channel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            title: Mutex::new(None),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> Option<String> {
        lock(&self.title).clone()
    }

    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.members)
            .values()
            .map(|s| s.username().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn is_member(&self, session: Uuid) -> bool {
        lock(&self.members).contains_key(&session)
    }

    fn add_member(&self, session: &Arc<ClientSession>) {
        lock(&self.members).insert(session.id(), Arc::clone(session));
    }

    pub(crate) fn remove_member(&self, session: Uuid) {
        lock(&self.members).remove(&session);
    }

    /// Send `text` to every member except `sender`, skipping members who ignore the sender.
    pub fn broadcast_to_members(&self, sender: &ClientSession, text: &str) -> usize {
        let members: Vec<Arc<ClientSession>> = lock(&self.members).values().cloned().collect();
        members
            .iter()
            .filter(|m| m.id() != sender.id())
            .filter(|m| !m.is_ignoring(sender.username()))
            .filter(|m| m.send_text(text))
            .count()
    }
}

// Members point back at sessions that point at the channel, so Debug stays shallow.
impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("title", &self.title())
            .field("members", &self.member_names())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: DashMap<String, Arc<Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, name: &str) -> Result<Arc<Channel>, WorldError> {
        match self.channels.entry(name.to_string()) {
            Entry::Occupied(_) => Err(WorldError::ChannelExists),
            Entry::Vacant(slot) => {
                let channel = Arc::new(Channel::new(name));
                slot.insert(Arc::clone(&channel));
                Ok(channel)
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Move `session` into channel `name`, leaving its current channel first.
    pub fn join(&self, session: &Arc<ClientSession>, name: &str) -> Result<Arc<Channel>, WorldError> {
        let channel = self.lookup(name).ok_or(WorldError::ChannelNotFound)?;
        let mut state = session.state();
        if let Some(previous) = state.channel.take() {
            previous.remove_member(session.id());
        }
        channel.add_member(session);
        state.channel = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// Leave the current channel, returning it.
    pub fn leave(&self, session: &ClientSession) -> Result<Arc<Channel>, WorldError> {
        let mut state = session.state();
        let channel = state.channel.take().ok_or(WorldError::NotInChannel)?;
        channel.remove_member(session.id());
        Ok(channel)
    }

    /// Set the title of the session's current channel.
    pub fn set_title(&self, session: &ClientSession, title: &str) -> Result<Arc<Channel>, WorldError> {
        let channel = session.channel().ok_or(WorldError::NotInChannel)?;
        *lock(&channel.title) = Some(title.to_string());
        Ok(channel)
    }
}
