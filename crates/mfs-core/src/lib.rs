#![forbid(unsafe_code)]
//! MiniFS filesystem façade.
//!
//! [`FileSystem`] is the in-process entry point: a flat root directory of
//! files backed by the in-memory block store in `mfs-state`. All state is
//! owned by the value; dropping it releases everything. Paths are absolute
//! with a single component (`/name`).

mod data;

pub use mfs_error::{MfsError, Result};
pub use mfs_types::{FsParams, Handle, InodeKind, Inum, OpenFlags, ROOT_INUM};

use mfs_state::FsState;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct FileSystem {
    state: FsState,
}

impl FileSystem {
    /// Initialize a filesystem with the root directory at inode 0.
    pub fn new(params: FsParams) -> Result<Self> {
        let state = FsState::new(params);
        let root = state.inode_create(InodeKind::Directory)?;
        debug_assert_eq!(root, ROOT_INUM);
        info!(
            blocks = state.params().block_count,
            inodes = state.params().inode_count,
            "filesystem initialized"
        );
        Ok(Self { state })
    }

    pub fn with_default_params() -> Result<Self> {
        Self::new(FsParams::default())
    }

    #[must_use]
    pub fn params(&self) -> &FsParams {
        self.state.params()
    }

    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.state.free_block_count()
    }

    #[must_use]
    pub fn free_inodes(&self) -> usize {
        self.state.free_inode_count()
    }

    /// Valid paths are `/name`: absolute, one component, non-empty name.
    fn file_name(path: &str) -> Result<&str> {
        let name = path.strip_prefix('/').ok_or_else(|| {
            MfsError::InvalidArgument(format!("path {path:?} is not absolute"))
        })?;
        if name.is_empty() || name.contains('/') {
            return Err(MfsError::InvalidArgument(format!(
                "path {path:?} must name exactly one root entry"
            )));
        }
        Ok(name)
    }

    /// Resolve a path to its inode number.
    pub fn lookup(&self, path: &str) -> Result<Inum> {
        let name = Self::file_name(path)?;
        self.state.find_in_dir(ROOT_INUM, name)
    }

    /// Open a file, creating / truncating / appending per `flags`.
    ///
    /// Returns a handle whose read and write cursors both start at 0, or at
    /// the end of file with `APPEND`.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<Handle> {
        let name = Self::file_name(path)?;
        let (inum, offset) = match self.state.find_in_dir(ROOT_INUM, name) {
            Ok(inum) => {
                if flags.contains(OpenFlags::TRUNCATE) {
                    let has_content = {
                        let guard = self.state.inode(inum)?.read();
                        guard.kind == InodeKind::File && guard.size > 0
                    };
                    if has_content {
                        self.state.release_inode_blocks(inum)?;
                    }
                }
                let offset = if flags.contains(OpenFlags::APPEND) {
                    self.state.inode(inum)?.read().size
                } else {
                    0
                };
                (inum, offset)
            }
            Err(MfsError::NotFound(_)) if flags.contains(OpenFlags::CREATE) => {
                let inum = self.state.inode_create(InodeKind::File)?;
                if let Err(err) = self.state.add_dir_entry(ROOT_INUM, inum, name) {
                    if let Err(rollback) = self.state.inode_delete(inum) {
                        warn!(inum = inum.0, %rollback, "rollback of failed create");
                    }
                    return Err(err);
                }
                (inum, 0)
            }
            Err(err) => return Err(err),
        };
        let handle = self.state.handle_add(inum, offset, offset)?;
        debug!(path, flags = flags.bits(), handle = handle.0, "file opened");
        Ok(handle)
    }

    /// Release an open handle. The file itself stays.
    pub fn close(&self, handle: Handle) -> Result<()> {
        self.state.handle_remove(handle)
    }

    /// Read up to `len` bytes from the handle's read cursor.
    ///
    /// The result is clamped to the file size and may span several blocks;
    /// the cursor advances by the returned length.
    pub fn read(&self, handle: Handle, len: usize) -> Result<Vec<u8>> {
        let (inum, offset) = {
            let entry = self.state.open_file(handle)?.read();
            (entry.inum, entry.read_offset)
        };
        let out = data::read_at(&self.state, inum, offset, len)?;
        self.state.open_file(handle)?.write().read_offset = offset + out.len() as u64;
        Ok(out)
    }

    /// Write `bytes` at the handle's write cursor.
    ///
    /// Returns the count actually written; a short count means the block
    /// store ran dry mid-write. The cursor advances by the returned count.
    pub fn write(&self, handle: Handle, bytes: &[u8]) -> Result<usize> {
        let (inum, offset) = {
            let entry = self.state.open_file(handle)?.read();
            (entry.inum, entry.write_offset)
        };
        let written = data::write_at(&self.state, inum, offset, bytes)?;
        self.state.open_file(handle)?.write().write_offset = offset + written as u64;
        Ok(written)
    }

    /// Copy a file's full content to `dest` on the host filesystem.
    pub fn copy_to_host(&self, src: &str, dest: &Path) -> Result<()> {
        let handle = self.open(src, OpenFlags::NONE)?;
        let copied = self.copy_open_file(handle, dest);
        let closed = self.close(handle);
        copied?;
        closed
    }

    fn copy_open_file(&self, handle: Handle, dest: &Path) -> Result<()> {
        let inum = self.state.open_file(handle)?.read().inum;
        let size = self.state.inode(inum)?.read().size as usize;
        let bytes = self.read(handle, size)?;
        std::fs::write(dest, &bytes)?;
        info!(bytes = bytes.len(), dest = %dest.display(), "copied file to host");
        Ok(())
    }
}
