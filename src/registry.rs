//! Executor-scoped registry of live sessions, keyed by session id.
use super::session::Session;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Maps conversation threads to their sessions so the inbound
/// dispatcher can route frames.
///
/// The registry never owns a session.  Client sessions are owned by
/// their handles; server sessions by the worker that adopted them.
/// Entries whose session has been dropped are purged on access.
pub struct SessionRegistry {
    sessions: HashMap<String, Weak<RefCell<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry {
            sessions: HashMap::new(),
        }
    }

    /// Register a session under its id.
    ///
    /// Re-inserting an id that maps to a live session is a no-op.
    pub fn insert(&mut self, session_id: &str, session: &Rc<RefCell<Session>>) {
        if let Some(entry) = self.sessions.get(session_id) {
            if entry.upgrade().is_some() {
                return;
            }
        }

        self.sessions
            .insert(session_id.to_string(), Rc::downgrade(session));
    }

    /// Find a live session by id.
    pub fn lookup(&mut self, session_id: &str) -> Option<Rc<RefCell<Session>>> {
        match self.sessions.get(session_id) {
            Some(entry) => match entry.upgrade() {
                Some(ses) => Some(ses),
                None => {
                    // The owner went away without an explicit remove.
                    self.sessions.remove(session_id);
                    None
                }
            },
            None => None,
        }
    }

    pub fn remove(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    /// Number of registered ids, live or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
