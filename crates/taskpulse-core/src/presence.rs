//! Online-session tracking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use crate::lock;

/// Opaque identity of one connection. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Set of currently connected sessions.
#[derive(Default)]
pub struct PresenceRegistry {
    members: Mutex<BTreeSet<SessionId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Returns `false` if it was already present.
    pub fn join(&self, id: SessionId) -> bool {
        lock(&self.members).insert(id)
    }

    /// Remove a session. Returns `false` if it was not present.
    pub fn leave(&self, id: &SessionId) -> bool {
        lock(&self.members).remove(id)
    }

    /// Current members, sorted by id.
    pub fn snapshot(&self) -> Vec<SessionId> {
        lock(&self.members).iter().cloned().collect()
    }

    /// Number of connected sessions.
    pub fn count(&self) -> usize {
        lock(&self.members).len()
    }
}
