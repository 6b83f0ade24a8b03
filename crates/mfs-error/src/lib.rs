#![forbid(unsafe_code)]
//! Error types for MiniFS.
//!
//! `MfsError` is the single user-facing error type returned by the state
//! layer, the façade, and the protocol server. Every variant maps to exactly
//! one POSIX errno via [`MfsError::to_errno`]; the server sends `-errno` on
//! the reply channel, so clients observe one signed status per request and
//! treat any negative value as failure.
//!
//! Lock primitives are `parking_lot` and cannot fail, so there is no
//! lock-failure variant; that failure mode does not exist here.

use thiserror::Error;

/// Unified error type for all MiniFS operations.
#[derive(Debug, Error)]
pub enum MfsError {
    /// Bad path, empty name, out-of-range handle/inode/block id, unknown
    /// flag bits.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A directory operation was attempted on a non-directory inode.
    #[error("not a directory")]
    NotDirectory,

    /// Lookup miss, or an operation on a slot that is not taken.
    #[error("not found: {0}")]
    NotFound(String),

    /// No free inode/block/handle/session slot.
    #[error("no free {resource} slot")]
    Exhausted { resource: &'static str },

    /// The operation's precondition is not met yet (e.g. shutdown while
    /// other sessions are still mounted).
    #[error("resource busy")]
    Busy,

    /// Malformed request frame or unknown opcode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport failure (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MfsError {
    /// Convert this error into a POSIX errno for the reply channel.
    ///
    /// The mapping is exhaustive: adding a variant without assigning its
    /// errno is a compile error.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::InvalidArgument(_) => libc::EINVAL,
            Self::NotDirectory => libc::ENOTDIR,
            Self::NotFound(_) => libc::ENOENT,
            Self::Exhausted { .. } => libc::ENOSPC,
            Self::Busy => libc::EBUSY,
            Self::Protocol(_) => libc::EBADMSG,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// The negative status value written back on a reply channel.
    #[must_use]
    pub fn to_status(&self) -> i32 {
        -self.to_errno()
    }
}

/// Result alias using `MfsError`.
pub type Result<T> = std::result::Result<T, MfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_all_variants() {
        let cases: Vec<(MfsError, libc::c_int)> = vec![
            (MfsError::InvalidArgument("x".into()), libc::EINVAL),
            (MfsError::NotDirectory, libc::ENOTDIR),
            (MfsError::NotFound("f".into()), libc::ENOENT),
            (MfsError::Exhausted { resource: "inode" }, libc::ENOSPC),
            (MfsError::Busy, libc::EBUSY),
            (MfsError::Protocol("bad opcode".into()), libc::EBADMSG),
            (MfsError::Io(std::io::Error::other("t")), libc::EIO),
        ];

        for (error, expected) in &cases {
            assert_eq!(error.to_errno(), *expected, "wrong errno for {error:?}");
            assert_eq!(error.to_status(), -expected);
        }
    }

    #[test]
    fn io_error_preserves_raw_os_error() {
        let raw = std::io::Error::from_raw_os_error(libc::EPIPE);
        let err = MfsError::Io(raw);
        assert_eq!(err.to_errno(), libc::EPIPE);
    }

    #[test]
    fn display_formatting() {
        let err = MfsError::Exhausted { resource: "block" };
        assert_eq!(err.to_string(), "no free block slot");

        let nf = MfsError::NotFound("/missing".into());
        assert_eq!(nf.to_string(), "not found: /missing");
    }
}
