//!
//! netconfd datastore lock table
//! -----------------------------
//! Process-wide arbitration of per-datastore exclusive locks. The table
//! maps each lockable datastore to the owning session id and is protected
//! by a single readers-writer lock: the acquire path takes the read lock
//! for the fast busy check, then re-checks under the write lock because
//! ownership may change between the two.
//!
//! The backing datastore is locked as well, so a lock taken here strictly
//! happens-before any mutation on that datastore by another session.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{NcError, NcResult};
use crate::session::{Datastore, Session};

#[derive(Debug, Default)]
struct Owners {
    running: Option<u32>,
    startup: Option<u32>,
    candidate: Option<u32>,
}

impl Owners {
    fn slot(&self, target: Datastore) -> Option<&Option<u32>> {
        match target {
            Datastore::Running => Some(&self.running),
            Datastore::Startup => Some(&self.startup),
            Datastore::Candidate => Some(&self.candidate),
            _ => None,
        }
    }

    fn slot_mut(&mut self, target: Datastore) -> Option<&mut Option<u32>> {
        match target {
            Datastore::Running => Some(&mut self.running),
            Datastore::Startup => Some(&mut self.startup),
            Datastore::Candidate => Some(&mut self.candidate),
            _ => None,
        }
    }
}

/// The per-datastore lock table.
#[derive(Debug, Default)]
pub struct LockTable {
    owners: RwLock<Owners>,
}

static GLOBAL: Lazy<std::sync::Arc<LockTable>> =
    Lazy::new(|| std::sync::Arc::new(LockTable::default()));

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table; lives from first use to shutdown.
    pub fn global() -> std::sync::Arc<LockTable> {
        GLOBAL.clone()
    }

    /// Current owner session id, if the datastore is locked.
    pub fn owner(&self, target: Datastore) -> Option<u32> {
        self.owners.read().slot(target).copied().flatten()
    }

    /// Acquire the lock on `target` for `session`, locking the backing
    /// datastore as well. Fails with lock-denied carrying the owner's
    /// session id, or id 0 when the backend holds the lock externally.
    pub fn acquire(&self, target: Datastore, session: &Session) -> NcResult<()> {
        let handle = session
            .lock_handle(target)
            .ok_or_else(|| NcError::invalid_value(format!("invalid <lock> target ({})", target.name())))?;

        {
            let owners = self.owners.read();
            let slot = owners
                .slot(target)
                .ok_or_else(|| NcError::invalid_value(format!("invalid <lock> target ({})", target.name())))?;
            if let Some(owner) = *slot {
                return Err(Self::denied(target, session, owner));
            }
        }

        let mut owners = self.owners.write();
        // check again, ownership could change between unlock and relock
        let slot = owners
            .slot_mut(target)
            .ok_or_else(|| NcError::invalid_value(format!("invalid <lock> target ({})", target.name())))?;
        if let Some(owner) = *slot {
            return Err(Self::denied(target, session, owner));
        }

        if let Err(e) = handle.lock_datastore() {
            // lock is held outside this server
            warn!(target: "netconfd::locks",
                "locking datastore {} by session {} failed ({})", target.name(), session.id(), e);
            return Err(NcError::lock_denied(
                0,
                format!("locking the {} datastore failed ({})", target.name(), e),
            ));
        }

        *slot = Some(session.id());
        debug!(target: "netconfd::locks", "session {} locked {}", session.id(), target.name());
        Ok(())
    }

    /// Release the lock on `target` held by `session`.
    pub fn release(&self, target: Datastore, session: &Session) -> NcResult<()> {
        let handle = session
            .lock_handle(target)
            .ok_or_else(|| NcError::invalid_value(format!("invalid <unlock> target ({})", target.name())))?;

        {
            let owners = self.owners.read();
            let slot = owners
                .slot(target)
                .ok_or_else(|| NcError::invalid_value(format!("invalid <unlock> target ({})", target.name())))?;
            match *slot {
                None => {
                    return Err(NcError::op_failed(format!(
                        "unlocking the {} datastore by session {} failed (lock is not active)",
                        target.name(),
                        session.id()
                    )));
                }
                Some(owner) if owner != session.id() => {
                    return Err(Self::denied(target, session, owner));
                }
                Some(_) => {}
            }
        }

        let mut owners = self.owners.write();
        if let Err(e) = handle.unlock_datastore() {
            warn!(target: "netconfd::locks",
                "unlocking datastore {} by session {} failed ({})", target.name(), session.id(), e);
            return Err(NcError::lock_denied(
                0,
                format!("unlocking the {} datastore failed ({})", target.name(), e),
            ));
        }
        if let Some(slot) = owners.slot_mut(target) {
            *slot = None;
        }
        debug!(target: "netconfd::locks", "session {} unlocked {}", session.id(), target.name());
        Ok(())
    }

    /// Session teardown: release every lock owned by the departing session.
    /// Backend unlock failures are logged, never surfaced.
    pub fn clean_session(&self, session: &Session) {
        let mut owners = self.owners.write();
        for target in [Datastore::Running, Datastore::Startup, Datastore::Candidate] {
            let slot = owners.slot_mut(target).expect("lockable datastore");
            if *slot == Some(session.id()) {
                if let Some(handle) = session.lock_handle(target) {
                    if let Err(e) = handle.unlock_datastore() {
                        warn!(target: "netconfd::locks",
                            "teardown unlock of {} for session {} failed ({})",
                            target.name(), session.id(), e);
                    }
                }
                *slot = None;
                debug!(target: "netconfd::locks",
                    "teardown cleared {} lock of session {}", target.name(), session.id());
            }
        }
    }

    fn denied(target: Datastore, session: &Session, owner: u32) -> NcError {
        NcError::lock_denied(
            owner,
            format!(
                "locking the {} datastore by session {} failed (datastore is already locked by session {})",
                target.name(),
                session.id(),
                owner
            ),
        )
    }
}
