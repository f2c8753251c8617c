//! Process-wide directory of connected sessions.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::errors::WorldError;
use super::session::ClientSession;
use crate::protocol::{Outbound, ServerEvent};

/// Username → session. Iteration always works on a cloned snapshot so callers
/// can register, unregister or send while walking the list.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<ClientSession>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` unless its username is already present.
    pub fn register(&self, session: Arc<ClientSession>) -> Result<(), WorldError> {
        match self.clients.entry(session.username().to_string()) {
            Entry::Occupied(_) => Err(WorldError::UsernameTaken(session.username().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Insert `session`, returning whichever session held the name before.
    pub fn replace(&self, session: Arc<ClientSession>) -> Option<Arc<ClientSession>> {
        self.clients
            .insert(session.username().to_string(), session)
    }

    /// Remove `session` only if it is still the registered holder of its name.
    pub fn unregister(&self, session: &ClientSession) -> bool {
        let id = session.id();
        self.clients
            .remove_if(session.username(), |_, held| held.id() == id)
            .is_some()
    }

    pub fn lookup(&self, username: &str) -> Option<Arc<ClientSession>> {
        self.clients.get(username).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Arc<ClientSession>)) {
        for session in self.snapshot() {
            f(&session);
        }
    }

    /// Connected usernames, sorted.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Send a text line to everyone except the session with id `except`.
    pub fn broadcast_text(&self, text: &str, except: Option<Uuid>) -> usize {
        self.broadcast(Outbound::text(text), except)
    }

    pub fn broadcast_event(&self, event: &ServerEvent, except: Option<Uuid>) -> usize {
        self.broadcast(Outbound::event(event), except)
    }

    fn broadcast(&self, message: Outbound, except: Option<Uuid>) -> usize {
        let mut delivered = 0;
        self.for_each(|session| {
            if Some(session.id()) != except && session.send(message.clone()) {
                delivered += 1;
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::rate_limit::CommandRateLimiter;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session(name: &str) -> (Arc<ClientSession>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = ClientSession::new(name, None, tx, CommandRateLimiter::default(), Duration::ZERO);
        (Arc::new(s), rx)
    }

    #[test]
    fn register_rejects_taken_name() {
        let registry = ClientRegistry::new();
        let (a, _ra) = session("alice");
        let (b, _rb) = session("alice");
        registry.register(a).unwrap();
        let err = registry.register(b).unwrap_err();
        assert_eq!(err.to_string(), "Username 'alice' is already connected.");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_session_cannot_unregister_successor() {
        let registry = ClientRegistry::new();
        let (old, _ro) = session("alice");
        let (new, _rn) = session("alice");
        registry.register(Arc::clone(&old)).unwrap();
        let prior = registry.replace(Arc::clone(&new)).unwrap();
        assert_eq!(prior.id(), old.id());
        assert!(!registry.unregister(&old));
        assert_eq!(registry.lookup("alice").unwrap().id(), new.id());
        assert!(registry.unregister(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_skips_excluded_sender() {
        let registry = ClientRegistry::new();
        let (a, mut ra) = session("alice");
        let (b, mut rb) = session("bob");
        registry.register(Arc::clone(&a)).unwrap();
        registry.register(b).unwrap();
        assert_eq!(registry.broadcast_text("hello", Some(a.id())), 1);
        assert!(ra.try_recv().is_err());
        assert_eq!(rb.try_recv().unwrap(), Outbound::Line("hello\n".into()));
        assert_eq!(registry.usernames(), vec!["alice", "bob"]);
    }
}
