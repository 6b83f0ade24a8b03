//! Inode records.
//!
//! An inode describes a file or directory: its kind, byte size, the direct
//! block list, and the optional single indirect block. The *content* of the
//! indirect block (an array of little-endian block indices) lives in the
//! block arena; only its id is stored here. Each inode slot is wrapped in
//! its own `RwLock` by the table.

use mfs_types::{BlockId, FsParams, InodeKind};

#[derive(Debug)]
pub struct Inode {
    pub kind: InodeKind,
    pub size: u64,
    /// Direct block list; `None` = unused slot.
    pub direct: Vec<Option<BlockId>>,
    /// Single indirect block, allocated lazily on first use.
    pub indirect: Option<BlockId>,
}

impl Inode {
    /// A fresh, empty file inode.
    pub(crate) fn new_file(params: &FsParams) -> Self {
        Self {
            kind: InodeKind::File,
            size: 0,
            direct: vec![None; params.direct_blocks],
            indirect: None,
        }
    }

    /// A directory inode owning `entries_block` as its single data block.
    pub(crate) fn new_directory(params: &FsParams, entries_block: BlockId) -> Self {
        let mut direct = vec![None; params.direct_blocks];
        direct[0] = Some(entries_block);
        Self {
            kind: InodeKind::Directory,
            size: params.block_size as u64,
            direct,
            indirect: None,
        }
    }

    /// Placeholder for a slot that is currently free.
    pub(crate) fn vacant(params: &FsParams) -> Self {
        Self::new_file(params)
    }

    /// Drop every block reference and reset to an empty file shape.
    ///
    /// Does not free the blocks; the table does that (it owns the bitmap).
    pub(crate) fn reset(&mut self) {
        self.size = 0;
        self.direct.iter_mut().for_each(|slot| *slot = None);
        self.indirect = None;
    }

    /// The directory's entries block (direct slot 0).
    pub fn dir_block(&self) -> Option<BlockId> {
        self.direct.first().copied().flatten()
    }
}
