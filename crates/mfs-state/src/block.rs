//! Fixed-size block arena.
//!
//! Blocks are owned buffers of exactly `block_size` bytes, indexed by
//! [`BlockId`]. All access goes through the bounds-checked closure accessors;
//! there is no way to obtain a raw offset into neighboring storage. Free vs.
//! taken state lives in the global table lock, not here.

use mfs_error::{MfsError, Result};
use mfs_types::BlockId;
use parking_lot::RwLock;

/// Sentinel stored *inside* an indirect block for an empty slot.
pub const EMPTY_SLOT: i32 = -1;

pub(crate) struct BlockArena {
    blocks: Vec<RwLock<Box<[u8]>>>,
}

impl BlockArena {
    pub(crate) fn new(block_size: usize, block_count: usize) -> Self {
        let blocks = (0..block_count)
            .map(|_| RwLock::new(vec![0u8; block_size].into_boxed_slice()))
            .collect();
        Self { blocks }
    }

    fn slot(&self, id: BlockId) -> Result<&RwLock<Box<[u8]>>> {
        self.blocks
            .get(id.0 as usize)
            .ok_or_else(|| MfsError::InvalidArgument(format!("block id {} out of range", id.0)))
    }

    /// Read access to a block's bytes.
    pub(crate) fn with_block<T>(&self, id: BlockId, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let guard = self.slot(id)?.read();
        Ok(f(&guard))
    }

    /// Write access to a block's bytes. The caller must own the inode that
    /// references `id` (the inode lock serializes content mutation).
    pub(crate) fn with_block_mut<T>(
        &self,
        id: BlockId,
        f: impl FnOnce(&mut [u8]) -> T,
    ) -> Result<T> {
        let mut guard = self.slot(id)?.write();
        Ok(f(&mut guard))
    }
}

/// Read indirect slot `idx` from an indirect block's bytes.
///
/// Returns `None` for the `-1` empty sentinel.
pub fn read_slot(block: &[u8], idx: usize) -> Result<Option<BlockId>> {
    let off = idx * 4;
    let bytes = block
        .get(off..off + 4)
        .ok_or_else(|| MfsError::InvalidArgument(format!("indirect slot {idx} out of range")))?;
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if raw == EMPTY_SLOT {
        Ok(None)
    } else {
        u32::try_from(raw)
            .map(|id| Some(BlockId(id)))
            .map_err(|_| MfsError::InvalidArgument(format!("negative block index in slot {idx}")))
    }
}

/// Write indirect slot `idx` into an indirect block's bytes.
pub fn write_slot(block: &mut [u8], idx: usize, id: Option<BlockId>) -> Result<()> {
    let off = idx * 4;
    let dst = block
        .get_mut(off..off + 4)
        .ok_or_else(|| MfsError::InvalidArgument(format!("indirect slot {idx} out of range")))?;
    let raw = match id {
        Some(id) => i32::try_from(id.0)
            .map_err(|_| MfsError::InvalidArgument(format!("block id {} exceeds i32", id.0)))?,
        None => EMPTY_SLOT,
    };
    dst.copy_from_slice(&raw.to_le_bytes());
    Ok(())
}

/// Mark every slot of a fresh indirect block empty.
pub fn init_slots(block: &mut [u8]) {
    for chunk in block.chunks_exact_mut(4) {
        chunk.copy_from_slice(&EMPTY_SLOT.to_le_bytes());
    }
}
