//! File data engine.
//!
//! Maps a byte offset onto the direct-then-indirect block chain and moves
//! data in per-block chunks. The write path is a plain loop: each iteration
//! resolves one block, copies up to a block boundary, advances. Allocation
//! is eager for the direct chain (all slots on first write) and lazy for the
//! indirect block and everything behind it.
//!
//! Lock order inside these functions: the caller-facing entry points take
//! the inode lock first and only then the table lock (through allocation)
//! or a block lock, never the reverse.

use mfs_error::{MfsError, Result};
use mfs_state::{FsState, Inode, init_slots, read_slot, write_slot};
use mfs_types::{BlockId, FsParams, InodeKind, Inum};
use tracing::trace;

/// Block holding logical block `index`, if one is allocated there.
fn block_at(state: &FsState, inode: &Inode, index: usize) -> Result<Option<BlockId>> {
    let params = state.params();
    if index < params.direct_blocks {
        return Ok(inode.direct[index]);
    }
    let slot = index - params.direct_blocks;
    if slot >= params.indirect_slots() {
        return Ok(None);
    }
    let Some(indirect) = inode.indirect else {
        return Ok(None);
    };
    state.with_block(indirect, |buf| read_slot(buf, slot))?
}

/// Block holding logical block `index`, allocating on the way as needed.
fn ensure_block(
    state: &FsState,
    params: &FsParams,
    inode: &mut Inode,
    index: usize,
) -> Result<BlockId> {
    if index < params.direct_blocks {
        if let Some(id) = inode.direct[index] {
            return Ok(id);
        }
        let id = state.block_alloc()?;
        inode.direct[index] = Some(id);
        return Ok(id);
    }

    let slot = index - params.direct_blocks;
    if slot >= params.indirect_slots() {
        return Err(MfsError::Exhausted {
            resource: "file capacity",
        });
    }
    let indirect = match inode.indirect {
        Some(id) => id,
        None => {
            let id = state.block_alloc()?;
            state.with_block_mut(id, init_slots)?;
            inode.indirect = Some(id);
            trace!(block = id.0, "indirect block allocated");
            id
        }
    };
    if let Some(id) = state.with_block(indirect, |buf| read_slot(buf, slot))?? {
        return Ok(id);
    }
    let id = state.block_alloc()?;
    state.with_block_mut(indirect, |buf| write_slot(buf, slot, Some(id)))??;
    Ok(id)
}

/// Read up to `len` bytes starting at `offset`, clamped to the file size.
///
/// Spans block boundaries in one call. A block missing inside the sized
/// region reads as zeros.
pub(crate) fn read_at(state: &FsState, inum: Inum, offset: u64, len: usize) -> Result<Vec<u8>> {
    let guard = state.inode(inum)?.read();
    if len == 0 || offset >= guard.size {
        return Ok(Vec::new());
    }
    let available = (guard.size - offset) as usize;
    let to_read = len.min(available);
    let block_size = state.params().block_size;

    let mut out = vec![0u8; to_read];
    let mut done = 0usize;
    let mut pos = offset as usize;
    while done < to_read {
        let index = pos / block_size;
        let within = pos % block_size;
        let chunk = (block_size - within).min(to_read - done);
        if let Some(block) = block_at(state, &guard, index)? {
            state.with_block(block, |buf| {
                out[done..done + chunk].copy_from_slice(&buf[within..within + chunk]);
            })?;
        }
        done += chunk;
        pos += chunk;
    }
    Ok(out)
}

/// Write `data` starting at `offset`.
///
/// Returns the byte count actually written; a short count means block
/// allocation ran dry mid-write. A nonzero write with no remaining capacity
/// at `offset` fails with `Exhausted`; a zero-length write is a no-op.
pub(crate) fn write_at(state: &FsState, inum: Inum, offset: u64, data: &[u8]) -> Result<usize> {
    if data.is_empty() {
        return Ok(0);
    }
    let params = state.params().clone();
    let mut guard = state.inode(inum)?.write();
    if guard.kind != InodeKind::File {
        return Err(MfsError::InvalidArgument(
            "write target is not a file".into(),
        ));
    }
    let capacity = params.max_file_bytes();
    if offset >= capacity {
        return Err(MfsError::Exhausted {
            resource: "file capacity",
        });
    }
    let goal = data.len().min((capacity - offset) as usize);

    // First write to an empty file claims the whole direct chain at once.
    if guard.direct[0].is_none() {
        let mut fresh = Vec::with_capacity(params.direct_blocks);
        for _ in 0..params.direct_blocks {
            match state.block_alloc() {
                Ok(id) => fresh.push(id),
                Err(err) => {
                    state.free_blocks(&fresh)?;
                    return Err(err);
                }
            }
        }
        for (slot, id) in guard.direct.iter_mut().zip(fresh) {
            *slot = Some(id);
        }
    }

    let block_size = params.block_size;
    let mut done = 0usize;
    let mut pos = offset as usize;
    while done < goal {
        let index = pos / block_size;
        let within = pos % block_size;
        let chunk = (block_size - within).min(goal - done);
        let block = match ensure_block(state, &params, &mut guard, index) {
            Ok(id) => id,
            // Out of blocks mid-write: report the partial count.
            Err(err) if done > 0 => {
                trace!(inum = inum.0, done, %err, "write stopped short");
                break;
            }
            Err(err) => return Err(err),
        };
        state.with_block_mut(block, |buf| {
            buf[within..within + chunk].copy_from_slice(&data[done..done + chunk]);
        })?;
        done += chunk;
        pos += chunk;
    }

    let end = offset + done as u64;
    if end > guard.size {
        guard.size = end;
    }
    Ok(done)
}
