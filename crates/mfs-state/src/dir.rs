//! Directory entry layout.
//!
//! A directory's single data block holds a flat array of fixed-width
//! entries: `max_file_name` bytes of NUL-padded name followed by a
//! little-endian `i32` inode number, `-1` meaning the slot is empty.
//! Insert is first-fit; lookup is a linear scan. These functions operate on
//! the raw block bytes; locking and inode validation happen in the table.

use mfs_error::{MfsError, Result};
use mfs_types::Inum;

const EMPTY_ENTRY: i32 = -1;

/// Byte range of entry `idx`'s name within the block.
fn name_range(idx: usize, max_name: usize) -> std::ops::Range<usize> {
    let base = idx * (max_name + 4);
    base..base + max_name
}

/// Byte offset of entry `idx`'s inode number within the block.
fn inum_offset(idx: usize, max_name: usize) -> usize {
    idx * (max_name + 4) + max_name
}

fn read_inum(block: &[u8], idx: usize, max_name: usize) -> Result<i32> {
    let off = inum_offset(idx, max_name);
    let bytes = block
        .get(off..off + 4)
        .ok_or_else(|| MfsError::InvalidArgument(format!("directory entry {idx} out of range")))?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn write_inum(block: &mut [u8], idx: usize, max_name: usize, value: i32) -> Result<()> {
    let off = inum_offset(idx, max_name);
    let dst = block
        .get_mut(off..off + 4)
        .ok_or_else(|| MfsError::InvalidArgument(format!("directory entry {idx} out of range")))?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Truncate `name` to what an entry can store: `max_name - 1` bytes, leaving
/// room for the NUL terminator.
fn stored_name(name: &str, max_name: usize) -> &[u8] {
    let bytes = name.as_bytes();
    &bytes[..bytes.len().min(max_name - 1)]
}

/// Mark every entry in a fresh directory block empty.
pub fn init_entries(block: &mut [u8], max_name: usize, entry_count: usize) -> Result<()> {
    block.fill(0);
    for idx in 0..entry_count {
        write_inum(block, idx, max_name, EMPTY_ENTRY)?;
    }
    Ok(())
}

/// First-fit insert of `(name, child)` into the block.
///
/// The name is truncated to the maximum stored length and NUL-padded.
pub fn insert_entry(
    block: &mut [u8],
    max_name: usize,
    entry_count: usize,
    name: &str,
    child: Inum,
) -> Result<()> {
    if name.is_empty() {
        return Err(MfsError::InvalidArgument(
            "directory entry name cannot be empty".into(),
        ));
    }
    let child_raw = i32::try_from(child.0)
        .map_err(|_| MfsError::InvalidArgument(format!("inode number {} exceeds i32", child.0)))?;

    for idx in 0..entry_count {
        if read_inum(block, idx, max_name)? == EMPTY_ENTRY {
            let stored = stored_name(name, max_name);
            let range = name_range(idx, max_name);
            block[range.clone()].fill(0);
            block[range.start..range.start + stored.len()].copy_from_slice(stored);
            write_inum(block, idx, max_name, child_raw)?;
            return Ok(());
        }
    }

    Err(MfsError::Exhausted {
        resource: "directory entry",
    })
}

/// Linear scan for `name`; returns the first matching entry's inode number.
pub fn find_entry(
    block: &[u8],
    max_name: usize,
    entry_count: usize,
    name: &str,
) -> Result<Option<Inum>> {
    let wanted = stored_name(name, max_name);
    for idx in 0..entry_count {
        let raw = read_inum(block, idx, max_name)?;
        if raw == EMPTY_ENTRY {
            continue;
        }
        let range = name_range(idx, max_name);
        let stored = &block[range];
        let len = stored.iter().position(|&b| b == 0).unwrap_or(max_name);
        if &stored[..len] == wanted {
            let inum = u32::try_from(raw).map_err(|_| {
                MfsError::InvalidArgument(format!("negative inode number in entry {idx}"))
            })?;
            return Ok(Some(Inum(inum)));
        }
    }
    Ok(None)
}

/// Mark the entry matching `(name, child)` empty.
///
/// Returns `true` when an entry was cleared.
pub fn clear_entry(
    block: &mut [u8],
    max_name: usize,
    entry_count: usize,
    name: &str,
    child: Inum,
) -> Result<bool> {
    let wanted = stored_name(name, max_name);
    let child_raw = i32::try_from(child.0)
        .map_err(|_| MfsError::InvalidArgument(format!("inode number {} exceeds i32", child.0)))?;

    for idx in 0..entry_count {
        if read_inum(block, idx, max_name)? != child_raw {
            continue;
        }
        let range = name_range(idx, max_name);
        let stored = &block[range.clone()];
        let len = stored.iter().position(|&b| b == 0).unwrap_or(max_name);
        if &stored[..len] == wanted {
            block[range].fill(0);
            write_inum(block, idx, max_name, EMPTY_ENTRY)?;
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_NAME: usize = 8;
    const COUNT: usize = 4;

    fn fresh_block() -> Vec<u8> {
        let mut block = vec![0u8; COUNT * (MAX_NAME + 4)];
        init_entries(&mut block, MAX_NAME, COUNT).unwrap();
        block
    }

    #[test]
    fn init_marks_every_entry_empty() {
        let block = fresh_block();
        assert_eq!(find_entry(&block, MAX_NAME, COUNT, "x").unwrap(), None);
        for idx in 0..COUNT {
            assert_eq!(read_inum(&block, idx, MAX_NAME).unwrap(), EMPTY_ENTRY);
        }
    }

    #[test]
    fn insert_then_find() {
        let mut block = fresh_block();
        insert_entry(&mut block, MAX_NAME, COUNT, "f1", Inum(3)).unwrap();
        insert_entry(&mut block, MAX_NAME, COUNT, "f2", Inum(5)).unwrap();
        assert_eq!(
            find_entry(&block, MAX_NAME, COUNT, "f1").unwrap(),
            Some(Inum(3))
        );
        assert_eq!(
            find_entry(&block, MAX_NAME, COUNT, "f2").unwrap(),
            Some(Inum(5))
        );
        assert_eq!(find_entry(&block, MAX_NAME, COUNT, "f3").unwrap(), None);
    }

    #[test]
    fn insert_is_first_fit_after_clear() {
        let mut block = fresh_block();
        insert_entry(&mut block, MAX_NAME, COUNT, "a", Inum(1)).unwrap();
        insert_entry(&mut block, MAX_NAME, COUNT, "b", Inum(2)).unwrap();
        assert!(clear_entry(&mut block, MAX_NAME, COUNT, "a", Inum(1)).unwrap());
        insert_entry(&mut block, MAX_NAME, COUNT, "c", Inum(7)).unwrap();
        // "c" reused slot 0.
        assert_eq!(read_inum(&block, 0, MAX_NAME).unwrap(), 7);
    }

    #[test]
    fn full_directory_is_exhausted() {
        let mut block = fresh_block();
        for idx in 0..COUNT {
            insert_entry(&mut block, MAX_NAME, COUNT, &format!("f{idx}"), Inum(idx as u32))
                .unwrap();
        }
        let err = insert_entry(&mut block, MAX_NAME, COUNT, "one-more", Inum(9)).unwrap_err();
        assert!(matches!(err, MfsError::Exhausted { .. }));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut block = fresh_block();
        let err = insert_entry(&mut block, MAX_NAME, COUNT, "", Inum(1)).unwrap_err();
        assert!(matches!(err, MfsError::InvalidArgument(_)));
    }

    #[test]
    fn long_names_are_truncated_consistently() {
        let mut block = fresh_block();
        // Both exceed the 7 stored bytes and collapse to the same key.
        insert_entry(&mut block, MAX_NAME, COUNT, "longname-one", Inum(4)).unwrap();
        assert_eq!(
            find_entry(&block, MAX_NAME, COUNT, "longname-two").unwrap(),
            Some(Inum(4))
        );
    }

    #[test]
    fn clear_requires_matching_name_and_inum() {
        let mut block = fresh_block();
        insert_entry(&mut block, MAX_NAME, COUNT, "a", Inum(1)).unwrap();
        assert!(!clear_entry(&mut block, MAX_NAME, COUNT, "a", Inum(2)).unwrap());
        assert!(!clear_entry(&mut block, MAX_NAME, COUNT, "b", Inum(1)).unwrap());
        assert!(clear_entry(&mut block, MAX_NAME, COUNT, "a", Inum(1)).unwrap());
        assert_eq!(find_entry(&block, MAX_NAME, COUNT, "a").unwrap(), None);
    }
}
