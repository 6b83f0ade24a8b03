//! Open-file table.
//!
//! Session-scoped handles mapping a [`Handle`] to an owning inode plus two
//! independent cursors. Read and write offsets are decoupled so concurrent
//! read-after-write and write-after-read on one handle cannot corrupt each
//! other's positioning. Slot allocation is first-fit over a bitmap guarded
//! by the table's own mutex, independent of the global table lock.

use crate::bitmap::{bitmap_clear, bitmap_find_free, bitmap_get, bitmap_len, bitmap_set};
use mfs_error::{MfsError, Result};
use mfs_types::{Handle, Inum};
use parking_lot::{Mutex, RwLock};
use tracing::trace;

#[derive(Debug)]
pub struct OpenFileEntry {
    pub inum: Inum,
    pub read_offset: u64,
    pub write_offset: u64,
}

pub(crate) struct OpenFileTable {
    capacity: usize,
    map: Mutex<Vec<u8>>,
    entries: Vec<RwLock<OpenFileEntry>>,
}

impl OpenFileTable {
    pub(crate) fn new(capacity: usize) -> Self {
        let entries = (0..capacity)
            .map(|_| {
                RwLock::new(OpenFileEntry {
                    inum: Inum(0),
                    read_offset: 0,
                    write_offset: 0,
                })
            })
            .collect();
        Self {
            capacity,
            map: Mutex::new(vec![0u8; bitmap_len(capacity)]),
            entries,
        }
    }

    /// First-fit allocation of a handle slot.
    pub(crate) fn add(&self, inum: Inum, read_offset: u64, write_offset: u64) -> Result<Handle> {
        let mut map = self.map.lock();
        let Some(slot) = bitmap_find_free(&map, self.capacity) else {
            return Err(MfsError::Exhausted {
                resource: "open file",
            });
        };
        bitmap_set(&mut map, slot);
        drop(map);

        let mut entry = self.entries[slot].write();
        entry.inum = inum;
        entry.read_offset = read_offset;
        entry.write_offset = write_offset;
        drop(entry);

        trace!(slot, inum = inum.0, "open-file slot taken");
        Ok(Handle(slot as u32))
    }

    /// Release a handle slot. Fails when the slot is not currently taken.
    pub(crate) fn remove(&self, handle: Handle) -> Result<()> {
        let slot = handle.0 as usize;
        if slot >= self.capacity {
            return Err(MfsError::InvalidArgument(format!(
                "handle {} out of range",
                handle.0
            )));
        }
        let mut map = self.map.lock();
        if !bitmap_get(&map, slot) {
            return Err(MfsError::NotFound(format!("handle {} is not open", handle.0)));
        }
        bitmap_clear(&mut map, slot);
        drop(map);

        trace!(slot, "open-file slot released");
        Ok(())
    }

    /// Access a taken entry's lock.
    pub(crate) fn entry(&self, handle: Handle) -> Result<&RwLock<OpenFileEntry>> {
        let slot = handle.0 as usize;
        if slot >= self.capacity {
            return Err(MfsError::InvalidArgument(format!(
                "handle {} out of range",
                handle.0
            )));
        }
        if !bitmap_get(&self.map.lock(), slot) {
            return Err(MfsError::NotFound(format!("handle {} is not open", handle.0)));
        }
        Ok(&self.entries[slot])
    }
}
