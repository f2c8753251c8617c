//! Process-wide counters.
//!
//! Cheap relaxed atomics bumped from the connection and world code paths.
//! They live only as long as the server process; `start` logs a
//! [Snapshot::summary] when it shuts down.
use std::sync::atomic::{AtomicU64, Ordering};

static SESSIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_THROTTLED: AtomicU64 = AtomicU64::new(0);
static WALKS_STARTED: AtomicU64 = AtomicU64::new(0);
static WALKS_SUPERSEDED: AtomicU64 = AtomicU64::new(0);
static KICKS: AtomicU64 = AtomicU64::new(0);

pub fn inc_sessions_opened() {
    SESSIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_sessions_closed() {
    SESSIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_commands_dispatched() {
    COMMANDS_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_commands_throttled() {
    COMMANDS_THROTTLED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_walks_started() {
    WALKS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_walks_superseded() {
    WALKS_SUPERSEDED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_kicks() {
    KICKS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub commands_dispatched: u64,
    pub commands_throttled: u64,
    pub walks_started: u64,
    pub walks_superseded: u64,
    pub kicks: u64,
}

impl Snapshot {
    /// Sessions opened and not yet closed.
    pub fn sessions_active(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_closed)
    }

    /// One-line report for the shutdown log.
    pub fn summary(&self) -> String {
        format!(
            "{} session(s) ({} still open), {} command(s) ({} throttled), {} walk(s) ({} superseded), {} kick(s)",
            self.sessions_opened,
            self.sessions_active(),
            self.commands_dispatched,
            self.commands_throttled,
            self.walks_started,
            self.walks_superseded,
            self.kicks
        )
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sessions_opened: SESSIONS_OPENED.load(Ordering::Relaxed),
        sessions_closed: SESSIONS_CLOSED.load(Ordering::Relaxed),
        commands_dispatched: COMMANDS_DISPATCHED.load(Ordering::Relaxed),
        commands_throttled: COMMANDS_THROTTLED.load(Ordering::Relaxed),
        walks_started: WALKS_STARTED.load(Ordering::Relaxed),
        walks_superseded: WALKS_SUPERSEDED.load(Ordering::Relaxed),
        kicks: KICKS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests bump them concurrently, so only
    // monotonic growth is asserted.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_sessions_opened();
        inc_commands_throttled();
        inc_kicks();
        let after = snapshot();
        assert!(after.sessions_opened > before.sessions_opened);
        assert!(after.commands_throttled > before.commands_throttled);
        assert!(after.kicks > before.kicks);
    }

    #[test]
    fn active_sessions_never_underflow() {
        let snap = Snapshot {
            sessions_opened: 1,
            sessions_closed: 3,
            ..Snapshot::default()
        };
        assert_eq!(snap.sessions_active(), 0);
    }

    #[test]
    fn summary_reports_every_counter() {
        let snap = Snapshot {
            sessions_opened: 4,
            sessions_closed: 3,
            commands_dispatched: 20,
            commands_throttled: 2,
            walks_started: 5,
            walks_superseded: 1,
            kicks: 1,
        };
        assert_eq!(
            snap.summary(),
            "4 session(s) (1 still open), 20 command(s) (2 throttled), 5 walk(s) (1 superseded), 1 kick(s)"
        );
    }
}
