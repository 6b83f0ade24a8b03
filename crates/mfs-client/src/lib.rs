#![forbid(unsafe_code)]
//! MiniFS client library.
//!
//! Speaks the request/reply protocol against a running server. The client
//! binds its own reply socket, names it in the mount frame, and the server
//! connects back; that one reply stream then carries every reply for the
//! session. Each request travels on a fresh short-lived connection to the
//! server's well-known socket.

use mfs_error::{MfsError, Result};
use mfs_proto::{Request, read_payload, read_status};
use mfs_types::{Handle, OpenFlags, SessionId};
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One mounted session against a MiniFS server.
pub struct Client {
    server_path: PathBuf,
    reply_path: PathBuf,
    reply: UnixStream,
    session: SessionId,
}

impl Client {
    /// Mount against the server at `server_path`, binding the reply socket
    /// at `reply_path`. Blocks while the server's session table is full.
    pub fn mount(server_path: impl Into<PathBuf>, reply_path: impl Into<PathBuf>) -> Result<Self> {
        let server_path = server_path.into();
        let reply_path = reply_path.into();

        let listener = UnixListener::bind(&reply_path)?;
        send_request(
            &server_path,
            &Request::Mount {
                reply_path: reply_path.display().to_string(),
            },
        )?;
        // The server connects back once it has granted a session slot.
        let (mut reply, _) = listener.accept()?;
        let status = read_status(&mut reply)?;
        let session = SessionId(check(status, "mount")? as u32);

        info!(session = session.0, "mounted");
        Ok(Self {
            server_path,
            reply_path,
            reply,
            session,
        })
    }

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<Handle> {
        self.request(Request::Open {
            session: self.session,
            path: path.to_owned(),
            flags,
        })
        .map(|status| Handle(status as u32))
    }

    pub fn close(&mut self, handle: Handle) -> Result<()> {
        self.request(Request::Close {
            session: self.session,
            handle,
        })
        .map(drop)
    }

    /// Write `data` at the handle's write cursor; returns the accepted count.
    pub fn write(&mut self, handle: Handle, data: &[u8]) -> Result<usize> {
        self.request(Request::Write {
            session: self.session,
            handle,
            data: data.to_vec(),
        })
        .map(|status| status as usize)
    }

    /// Read up to `len` bytes from the handle's read cursor.
    pub fn read(&mut self, handle: Handle, len: u32) -> Result<Vec<u8>> {
        let count = self.request(Request::Read {
            session: self.session,
            handle,
            len,
        })?;
        read_payload(&mut self.reply, count as usize)
    }

    /// Release this session's slot on the server.
    pub fn unmount(mut self) -> Result<()> {
        self.request(Request::Unmount {
            session: self.session,
        })
        .map(drop)
    }

    /// Ask the server to stop. Succeeds only when this is the sole active
    /// session; otherwise the server stays up, the call fails with the busy
    /// status, and the session remains usable.
    pub fn shutdown(&mut self) -> Result<()> {
        self.request(Request::Shutdown {
            session: self.session,
        })
        .map(drop)
    }

    fn request(&mut self, request: Request) -> Result<i32> {
        debug!(session = self.session.0, opcode = ?request.opcode(), "request");
        send_request(&self.server_path, &request)?;
        let status = read_status(&mut self.reply)?;
        check(status, "request")
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.reply_path);
    }
}

fn send_request(server_path: &Path, request: &Request) -> Result<()> {
    let mut stream = UnixStream::connect(server_path)?;
    request.encode(&mut stream)
}

/// Replies carry `-errno` on failure; rebuild the OS error from it.
fn check(status: i32, op: &str) -> Result<i32> {
    if status < 0 {
        let err = io::Error::from_raw_os_error(-status);
        debug!(op, status, "server refused");
        return Err(MfsError::Io(err));
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_status_maps_back_to_os_error() {
        let err = check(-libc_ebusy(), "op").unwrap_err();
        let MfsError::Io(io_err) = err else {
            panic!("expected an io error");
        };
        assert_eq!(io_err.raw_os_error(), Some(libc_ebusy()));
        assert_eq!(check(7, "op").unwrap(), 7);
    }

    // EBUSY without pulling libc into this crate's dependency set.
    fn libc_ebusy() -> i32 {
        MfsError::Busy.to_errno()
    }
}
