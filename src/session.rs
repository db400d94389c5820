//!
//! netconfd session model
//! ----------------------
//! A NETCONF session carries a unique numeric id plus one backend handle
//! per datastore. Handles are opaque transaction-capable sessions against
//! the underlying store; they are owned by the session and never shared
//! across sessions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::datastore::DatastoreSession;

/// Identity of a configuration datastore as named in RPC target/source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datastore {
    Running,
    Startup,
    Candidate,
    Url,
    Config,
    Error,
}

impl Datastore {
    pub fn name(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Startup => "startup",
            Datastore::Candidate => "candidate",
            Datastore::Url => "url",
            Datastore::Config => "config",
            Datastore::Error => "error",
        }
    }

    /// Map a `target/*` or `source/*` element name to its datastore.
    pub fn from_element(name: &str) -> Datastore {
        match name {
            "running" => Datastore::Running,
            "startup" => Datastore::Startup,
            "candidate" => Datastore::Candidate,
            "url" => Datastore::Url,
            "config" => Datastore::Config,
            _ => Datastore::Error,
        }
    }
}

/// Per-session state: id and the datastore backend handles.
#[derive(Clone)]
pub struct Session {
    id: u32,
    running: Arc<dyn DatastoreSession>,
    running_config: Arc<dyn DatastoreSession>,
    startup: Arc<dyn DatastoreSession>,
    candidate: Arc<dyn DatastoreSession>,
}

impl Session {
    pub fn new(
        id: u32,
        running: Arc<dyn DatastoreSession>,
        running_config: Arc<dyn DatastoreSession>,
        startup: Arc<dyn DatastoreSession>,
        candidate: Arc<dyn DatastoreSession>,
    ) -> Self {
        Self { id, running, running_config, startup, candidate }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Handle used by `get`, `edit-config` and lock operations on running.
    pub fn running(&self) -> &Arc<dyn DatastoreSession> {
        &self.running
    }

    /// Handle used when `get-config` reads the running datastore.
    pub fn running_config(&self) -> &Arc<dyn DatastoreSession> {
        &self.running_config
    }

    pub fn startup(&self) -> &Arc<dyn DatastoreSession> {
        &self.startup
    }

    pub fn candidate(&self) -> &Arc<dyn DatastoreSession> {
        &self.candidate
    }

    /// Handle locked/unlocked for the given datastore, when it has one.
    pub fn lock_handle(&self, target: Datastore) -> Option<&Arc<dyn DatastoreSession>> {
        match target {
            Datastore::Running => Some(&self.running),
            Datastore::Startup => Some(&self.startup),
            Datastore::Candidate => Some(&self.candidate),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_names_round_trip() {
        for ds in [Datastore::Running, Datastore::Startup, Datastore::Candidate] {
            assert_eq!(Datastore::from_element(ds.name()), ds);
        }
        assert_eq!(Datastore::from_element("bogus"), Datastore::Error);
    }
}
