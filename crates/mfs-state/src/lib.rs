#![forbid(unsafe_code)]
//! Concurrent storage engine for MiniFS.
//!
//! `FsState` owns four structures:
//!
//! 1. the **global table lock**: one mutex guarding the inode and block
//!    allocation bitmaps together,
//! 2. the **block arena**: fixed buffers with per-block locks,
//! 3. the **inode table**: each slot behind its own `RwLock`,
//! 4. the **open-file table**: bitmap-guarded handles with their own locks.
//!
//! Lock-ordering protocol: an inode lock may be held while taking the table
//! lock or a block lock, never the reverse. Open-file locks and inode locks
//! are never held simultaneously; callers snapshot the entry's fields, drop
//! the guard, then cross domains.

pub mod bitmap;
mod block;
pub mod dir;
mod inode;
mod open_file;

pub use block::{EMPTY_SLOT, init_slots, read_slot, write_slot};
pub use inode::Inode;
pub use open_file::OpenFileEntry;

use crate::bitmap::{bitmap_clear, bitmap_count_free, bitmap_find_free, bitmap_get, bitmap_len, bitmap_set};
use crate::block::BlockArena;
use crate::open_file::OpenFileTable;
use mfs_error::{MfsError, Result};
use mfs_types::{BlockId, FsParams, Handle, InodeKind, Inum};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

/// Inode + block allocation bitmaps, guarded together by one mutex.
struct AllocMaps {
    inodes: Vec<u8>,
    blocks: Vec<u8>,
}

/// Process-wide shared filesystem state.
pub struct FsState {
    params: FsParams,
    tables: Mutex<AllocMaps>,
    arena: BlockArena,
    inodes: Vec<RwLock<Inode>>,
    handles: OpenFileTable,
}

impl FsState {
    #[must_use]
    pub fn new(params: FsParams) -> Self {
        let arena = BlockArena::new(params.block_size, params.block_count);
        let inodes = (0..params.inode_count)
            .map(|_| RwLock::new(Inode::vacant(&params)))
            .collect();
        let tables = Mutex::new(AllocMaps {
            inodes: vec![0u8; bitmap_len(params.inode_count)],
            blocks: vec![0u8; bitmap_len(params.block_count)],
        });
        let handles = OpenFileTable::new(params.max_open_files);
        Self {
            params,
            tables,
            arena,
            inodes,
            handles,
        }
    }

    #[must_use]
    pub fn params(&self) -> &FsParams {
        &self.params
    }

    fn valid_inum(&self, inum: Inum) -> Result<usize> {
        let idx = inum.0 as usize;
        if idx >= self.params.inode_count {
            return Err(MfsError::InvalidArgument(format!(
                "inode number {} out of range",
                inum.0
            )));
        }
        Ok(idx)
    }

    // ── Block store ─────────────────────────────────────────────────────

    /// First-fit block allocation under the global table lock.
    pub fn block_alloc(&self) -> Result<BlockId> {
        let mut tables = self.tables.lock();
        let Some(slot) = bitmap_find_free(&tables.blocks, self.params.block_count) else {
            return Err(MfsError::Exhausted { resource: "block" });
        };
        bitmap_set(&mut tables.blocks, slot);
        drop(tables);
        trace!(block = slot, "block allocated");
        Ok(BlockId(slot as u32))
    }

    /// Return one block to the free pool. Rejects out-of-range ids.
    pub fn block_free(&self, id: BlockId) -> Result<()> {
        self.free_blocks(std::slice::from_ref(&id))
    }

    /// Return a batch of blocks under a single table-lock acquisition.
    pub fn free_blocks(&self, ids: &[BlockId]) -> Result<()> {
        for id in ids {
            if id.0 as usize >= self.params.block_count {
                return Err(MfsError::InvalidArgument(format!(
                    "block id {} out of range",
                    id.0
                )));
            }
        }
        let mut tables = self.tables.lock();
        for id in ids {
            bitmap_clear(&mut tables.blocks, id.0 as usize);
        }
        drop(tables);
        trace!(count = ids.len(), "blocks freed");
        Ok(())
    }

    /// Read access to a block's bytes.
    pub fn with_block<T>(&self, id: BlockId, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        self.arena.with_block(id, f)
    }

    /// Write access to a block's bytes. The caller must hold the owning
    /// inode's lock so content mutation stays serialized per file.
    pub fn with_block_mut<T>(&self, id: BlockId, f: impl FnOnce(&mut [u8]) -> T) -> Result<T> {
        self.arena.with_block_mut(id, f)
    }

    #[must_use]
    pub fn free_block_count(&self) -> usize {
        bitmap_count_free(&self.tables.lock().blocks, self.params.block_count)
    }

    #[must_use]
    pub fn free_inode_count(&self) -> usize {
        bitmap_count_free(&self.tables.lock().inodes, self.params.inode_count)
    }

    // ── Inode table ─────────────────────────────────────────────────────

    /// Create a new inode of `kind` in the first free slot.
    ///
    /// The slot is marked TAKEN before the table lock is released, so the
    /// nested block allocation for a directory (which takes the table lock
    /// itself) cannot hand the slot to anyone else in between.
    pub fn inode_create(&self, kind: InodeKind) -> Result<Inum> {
        let slot = {
            let mut tables = self.tables.lock();
            let Some(slot) = bitmap_find_free(&tables.inodes, self.params.inode_count) else {
                return Err(MfsError::Exhausted { resource: "inode" });
            };
            bitmap_set(&mut tables.inodes, slot);
            slot
        };
        let inum = Inum(slot as u32);

        match kind {
            InodeKind::Directory => {
                let entries_block = match self.block_alloc() {
                    Ok(block) => block,
                    Err(err) => {
                        bitmap_clear(&mut self.tables.lock().inodes, slot);
                        return Err(err);
                    }
                };
                self.with_block_mut(entries_block, |buf| {
                    dir::init_entries(
                        buf,
                        self.params.max_file_name,
                        self.params.dir_entries_per_block(),
                    )
                })??;
                *self.inodes[slot].write() = Inode::new_directory(&self.params, entries_block);
            }
            InodeKind::File => {
                *self.inodes[slot].write() = Inode::new_file(&self.params);
            }
        }

        debug!(inum = inum.0, ?kind, "inode created");
        Ok(inum)
    }

    /// Delete an inode, returning every block it owns to the free pool.
    ///
    /// Fails when `inum` is out of range or the slot is already free. Any
    /// open-file handle referencing the inode must be closed first; the
    /// table does not track handles per inode.
    pub fn inode_delete(&self, inum: Inum) -> Result<()> {
        let idx = self.valid_inum(inum)?;
        {
            let mut tables = self.tables.lock();
            if !bitmap_get(&tables.inodes, idx) {
                return Err(MfsError::NotFound(format!("inode {} is not taken", inum.0)));
            }
            bitmap_clear(&mut tables.inodes, idx);
        }

        let owned = {
            let mut inode = self.inodes[idx].write();
            let owned = if inode.size > 0 {
                self.collect_owned_blocks(&inode)?
            } else {
                Vec::new()
            };
            inode.reset();
            owned
        };
        if !owned.is_empty() {
            self.free_blocks(&owned)?;
        }

        debug!(inum = inum.0, freed = owned.len(), "inode deleted");
        Ok(())
    }

    /// Access an inode slot's lock. Range-checked only; whether the slot is
    /// semantically taken is the caller's concern (as with the handles the
    /// façade hands out, a valid inum implies a live inode in correct usage).
    pub fn inode(&self, inum: Inum) -> Result<&RwLock<Inode>> {
        let idx = self.valid_inum(inum)?;
        Ok(&self.inodes[idx])
    }

    /// Release every block an inode owns and reset it to the empty-file
    /// shape, leaving the slot taken. Used by truncate-on-open.
    pub fn release_inode_blocks(&self, inum: Inum) -> Result<()> {
        let idx = self.valid_inum(inum)?;
        let owned = {
            let mut inode = self.inodes[idx].write();
            let owned = self.collect_owned_blocks(&inode)?;
            inode.reset();
            owned
        };
        if !owned.is_empty() {
            self.free_blocks(&owned)?;
        }
        debug!(inum = inum.0, freed = owned.len(), "inode blocks released");
        Ok(())
    }

    /// Every block reachable from the inode: the direct chain, the blocks
    /// referenced by the indirect block, and the indirect block itself.
    fn collect_owned_blocks(&self, inode: &Inode) -> Result<Vec<BlockId>> {
        let mut owned: Vec<BlockId> = inode.direct.iter().copied().flatten().collect();
        if let Some(indirect) = inode.indirect {
            let slots = self.params.indirect_slots();
            let referenced = self.with_block(indirect, |buf| {
                let mut ids = Vec::new();
                for idx in 0..slots {
                    if let Some(id) = read_slot(buf, idx)? {
                        ids.push(id);
                    }
                }
                Ok::<_, MfsError>(ids)
            })??;
            owned.extend(referenced);
            owned.push(indirect);
        }
        Ok(owned)
    }

    // ── Directory operations ────────────────────────────────────────────

    /// Snapshot a directory's kind and entries block, then drop the inode
    /// guard before touching the block (inode lock → block lock, scoped).
    fn dir_block(&self, dir: Inum) -> Result<BlockId> {
        let guard = self.inode(dir)?.read();
        if guard.kind != InodeKind::Directory {
            return Err(MfsError::NotDirectory);
        }
        guard
            .dir_block()
            .ok_or_else(|| MfsError::InvalidArgument(format!("directory {} has no block", dir.0)))
    }

    /// First-fit insert of `(name, child)` into the directory.
    pub fn add_dir_entry(&self, dir: Inum, child: Inum, name: &str) -> Result<()> {
        self.valid_inum(child)?;
        let block = self.dir_block(dir)?;
        self.with_block_mut(block, |buf| {
            dir::insert_entry(
                buf,
                self.params.max_file_name,
                self.params.dir_entries_per_block(),
                name,
                child,
            )
        })??;
        trace!(dir = dir.0, child = child.0, name, "directory entry added");
        Ok(())
    }

    /// Linear-scan lookup of `name` in the directory.
    pub fn find_in_dir(&self, dir: Inum, name: &str) -> Result<Inum> {
        let block = self.dir_block(dir)?;
        let found = self.with_block(block, |buf| {
            dir::find_entry(
                buf,
                self.params.max_file_name,
                self.params.dir_entries_per_block(),
                name,
            )
        })??;
        found.ok_or_else(|| MfsError::NotFound(name.to_owned()))
    }

    /// Clear the entry matching `(name, child)`.
    pub fn remove_dir_entry(&self, dir: Inum, child: Inum, name: &str) -> Result<()> {
        let block = self.dir_block(dir)?;
        let cleared = self.with_block_mut(block, |buf| {
            dir::clear_entry(
                buf,
                self.params.max_file_name,
                self.params.dir_entries_per_block(),
                name,
                child,
            )
        })??;
        if !cleared {
            return Err(MfsError::NotFound(name.to_owned()));
        }
        Ok(())
    }

    // ── Open-file table ─────────────────────────────────────────────────

    pub fn handle_add(&self, inum: Inum, read_offset: u64, write_offset: u64) -> Result<Handle> {
        self.valid_inum(inum)?;
        self.handles.add(inum, read_offset, write_offset)
    }

    pub fn handle_remove(&self, handle: Handle) -> Result<()> {
        self.handles.remove(handle)
    }

    pub fn open_file(&self, handle: Handle) -> Result<&RwLock<OpenFileEntry>> {
        self.handles.entry(handle)
    }
}
