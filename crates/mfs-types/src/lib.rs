#![forbid(unsafe_code)]
//! Core identifier and geometry types for MiniFS.
//!
//! Unit-carrying newtypes prevent mixing block indices, inode numbers, and
//! open-file handles; `FsParams` is the single validated source of geometry
//! for every other crate.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use thiserror::Error;

/// Index into the data-block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Index into the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Inum(pub u32);

/// Opaque open-file handle (index into the open-file table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u32);

/// Identifier of one mounted client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// The root directory always lives at inode 0.
pub const ROOT_INUM: Inum = Inum(0);

/// What an inode describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeKind {
    File,
    Directory,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("invalid parameter: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Validated filesystem geometry.
///
/// Constructed once and shared by every layer; no other crate hard-codes
/// sizes. The indirect-slot count is derived, not stored: the indirect block
/// holds `block_size / 4` little-endian block indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsParams {
    /// Data block size in bytes. Must be a power of two and at least large
    /// enough for one directory entry.
    pub block_size: usize,
    /// Total number of data blocks.
    pub block_count: usize,
    /// Total number of inode slots.
    pub inode_count: usize,
    /// Capacity of the open-file table.
    pub max_open_files: usize,
    /// Maximum file name length, including the trailing NUL byte.
    pub max_file_name: usize,
    /// Number of direct block slots per inode.
    pub direct_blocks: usize,
}

impl FsParams {
    pub fn new(
        block_size: usize,
        block_count: usize,
        inode_count: usize,
        max_open_files: usize,
        max_file_name: usize,
        direct_blocks: usize,
    ) -> Result<Self, ParamsError> {
        if !block_size.is_power_of_two() || block_size < 64 {
            return Err(ParamsError::InvalidField {
                field: "block_size",
                reason: "must be a power of two >= 64",
            });
        }
        if block_count == 0 {
            return Err(ParamsError::InvalidField {
                field: "block_count",
                reason: "must be > 0",
            });
        }
        if inode_count == 0 {
            return Err(ParamsError::InvalidField {
                field: "inode_count",
                reason: "must be > 0",
            });
        }
        if max_open_files == 0 {
            return Err(ParamsError::InvalidField {
                field: "max_open_files",
                reason: "must be > 0",
            });
        }
        if max_file_name < 2 {
            return Err(ParamsError::InvalidField {
                field: "max_file_name",
                reason: "must hold at least one byte plus NUL",
            });
        }
        if max_file_name + 4 > block_size {
            return Err(ParamsError::InvalidField {
                field: "max_file_name",
                reason: "one directory entry must fit in a block",
            });
        }
        if direct_blocks == 0 {
            return Err(ParamsError::InvalidField {
                field: "direct_blocks",
                reason: "must be > 0",
            });
        }
        Ok(Self {
            block_size,
            block_count,
            inode_count,
            max_open_files,
            max_file_name,
            direct_blocks,
        })
    }

    /// Number of block indices the single indirect block can hold.
    #[must_use]
    pub fn indirect_slots(&self) -> usize {
        self.block_size / 4
    }

    /// Directory entry footprint: NUL-padded name plus an i32 inode number.
    #[must_use]
    pub fn dir_entry_size(&self) -> usize {
        self.max_file_name + 4
    }

    /// Number of directory entries that fit in the directory's single block.
    #[must_use]
    pub fn dir_entries_per_block(&self) -> usize {
        self.block_size / self.dir_entry_size()
    }

    /// Maximum file size reachable through the direct + indirect chain.
    #[must_use]
    pub fn max_file_bytes(&self) -> u64 {
        ((self.direct_blocks + self.indirect_slots()) * self.block_size) as u64
    }
}

impl Default for FsParams {
    fn default() -> Self {
        // 1 KiB blocks, 1 MiB of data, 64 inodes.
        Self {
            block_size: 1024,
            block_count: 1024,
            inode_count: 64,
            max_open_files: 20,
            max_file_name: 40,
            direct_blocks: 10,
        }
    }
}

/// Open flags, combinable with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const NONE: Self = Self(0);
    /// Create the file if it does not exist.
    pub const CREATE: Self = Self(0b001);
    /// Release all content on open.
    pub const TRUNCATE: Self = Self(0b010);
    /// Start both cursors at the current end of file.
    pub const APPEND: Self = Self(0b100);

    const ALL: u32 = 0b111;

    /// Reconstruct flags from their wire representation.
    ///
    /// Returns `None` when unknown bits are set.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL != 0 {
            return None;
        }
        Some(Self(bits))
    }

    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_validate() {
        let p = FsParams::default();
        let same = FsParams::new(
            p.block_size,
            p.block_count,
            p.inode_count,
            p.max_open_files,
            p.max_file_name,
            p.direct_blocks,
        )
        .unwrap();
        assert_eq!(p, same);
        assert_eq!(p.indirect_slots(), 256);
        assert_eq!(p.dir_entry_size(), 44);
        assert_eq!(p.dir_entries_per_block(), 23);
        assert_eq!(p.max_file_bytes(), (10 + 256) * 1024);
    }

    #[test]
    fn rejects_non_power_of_two_block_size() {
        let err = FsParams::new(1000, 16, 8, 4, 40, 10).unwrap_err();
        assert!(matches!(
            err,
            ParamsError::InvalidField {
                field: "block_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_entry_larger_than_block() {
        let err = FsParams::new(64, 16, 8, 4, 64, 10).unwrap_err();
        assert!(matches!(
            err,
            ParamsError::InvalidField {
                field: "max_file_name",
                ..
            }
        ));
    }

    #[test]
    fn flags_combine_and_round_trip() {
        let flags = OpenFlags::CREATE | OpenFlags::APPEND;
        assert!(flags.contains(OpenFlags::CREATE));
        assert!(flags.contains(OpenFlags::APPEND));
        assert!(!flags.contains(OpenFlags::TRUNCATE));
        assert_eq!(OpenFlags::from_bits(flags.bits()), Some(flags));
        assert_eq!(OpenFlags::from_bits(0b1000), None);
    }
}
