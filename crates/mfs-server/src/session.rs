//! Session table with bounded admission.
//!
//! Slots map session ids to reply streams. Admission blocks on a condvar
//! while every slot is taken and wakes one waiter per release, so ids are
//! recycled in first-fit order. The mutex is leaf-only: nothing else is
//! acquired while it is held (replies are written under it, which is safe
//! because no lock order puts anything after it).

use mfs_error::{MfsError, Result};
use mfs_types::SessionId;
use parking_lot::{Condvar, Mutex};
use std::os::unix::net::UnixStream;
use tracing::trace;

pub(crate) struct SessionTable {
    slots: Mutex<Vec<Option<UnixStream>>>,
    freed: Condvar,
}

impl SessionTable {
    pub(crate) fn new(max_sessions: usize) -> Self {
        Self {
            slots: Mutex::new((0..max_sessions).map(|_| None).collect()),
            freed: Condvar::new(),
        }
    }

    /// Take the first free slot, blocking while the table is full.
    pub(crate) fn admit(&self, reply: UnixStream) -> SessionId {
        let mut slots = self.slots.lock();
        loop {
            if let Some(idx) = slots.iter().position(Option::is_none) {
                slots[idx] = Some(reply);
                trace!(session = idx, "session slot taken");
                return SessionId(idx as u32);
            }
            self.freed.wait(&mut slots);
        }
    }

    /// Free a slot, handing back its reply stream, and wake one waiter.
    pub(crate) fn release(&self, id: SessionId) -> Result<UnixStream> {
        let idx = id.0 as usize;
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(idx).ok_or_else(|| {
            MfsError::InvalidArgument(format!("session id {} out of range", id.0))
        })?;
        let stream = slot
            .take()
            .ok_or_else(|| MfsError::NotFound(format!("session {} is not mounted", id.0)))?;
        drop(slots);
        self.freed.notify_one();
        trace!(session = idx, "session slot released");
        Ok(stream)
    }

    /// Run `f` against the session's reply stream.
    pub(crate) fn reply(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut UnixStream) -> Result<()>,
    ) -> Result<()> {
        let idx = id.0 as usize;
        let mut slots = self.slots.lock();
        let stream = slots
            .get_mut(idx)
            .and_then(Option::as_mut)
            .ok_or_else(|| MfsError::NotFound(format!("session {} is not mounted", id.0)))?;
        f(stream)
    }

    #[must_use]
    pub(crate) fn active(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// True when `id` is mounted and is the only active session.
    #[must_use]
    pub(crate) fn is_sole(&self, id: SessionId) -> bool {
        let slots = self.slots.lock();
        let taken = slots.iter().filter(|s| s.is_some()).count();
        taken == 1
            && slots
                .get(id.0 as usize)
                .is_some_and(Option::is_some)
    }
}
