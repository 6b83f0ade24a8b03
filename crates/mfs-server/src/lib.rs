#![forbid(unsafe_code)]
//! MiniFS protocol server.
//!
//! One listener on a well-known socket path; each incoming connection
//! carries exactly one request frame. Dispatch is inline on the accept
//! loop, except mounts: admission can block while the session table is
//! full, so each mount runs on a short-lived helper thread and the loop
//! stays free to service the unmount that will unblock it. Replies travel
//! on the per-session reply stream the server opened back at mount time.

mod session;

use mfs_core::FileSystem;
use mfs_error::{MfsError, Result};
use mfs_proto::{Request, write_data_reply, write_status};
use mfs_types::{FsParams, SessionId};
use serde::Serialize;
use session::SessionTable;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_SESSIONS: usize = 4;

pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub max_sessions: usize,
    pub params: FsParams,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            params: FsParams::default(),
        }
    }

    #[must_use]
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    #[must_use]
    pub fn params(mut self, params: FsParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Serialize)]
struct ServerStats {
    free_inodes: usize,
    free_blocks: usize,
    active_sessions: usize,
}

pub struct Server {
    config: ServerConfig,
    fs: FileSystem,
    sessions: Arc<SessionTable>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let fs = FileSystem::new(config.params.clone())?;
        let sessions = Arc::new(SessionTable::new(config.max_sessions));
        Ok(Self {
            config,
            fs,
            sessions,
        })
    }

    /// Accept and dispatch requests until a shutdown request succeeds.
    pub fn serve(&self) -> Result<()> {
        // A previous run may have left its socket file behind.
        let _ = std::fs::remove_file(&self.config.socket_path);
        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!(
            path = %self.config.socket_path.display(),
            max_sessions = self.config.max_sessions,
            "serving"
        );

        let result = self.serve_loop(&listener);

        let _ = std::fs::remove_file(&self.config.socket_path);
        let stats = ServerStats {
            free_inodes: self.fs.free_inodes(),
            free_blocks: self.fs.free_blocks(),
            active_sessions: self.sessions.active(),
        };
        if let Ok(json) = serde_json::to_string(&stats) {
            info!(stats = %json, "server stopped");
        }
        result
    }

    fn serve_loop(&self, listener: &UnixListener) -> Result<()> {
        for conn in listener.incoming() {
            let mut conn = conn?;
            let request = match Request::decode(&mut conn) {
                Ok(request) => request,
                // A bad frame poisons only its own connection.
                Err(err) => {
                    warn!(%err, "dropping malformed request");
                    continue;
                }
            };
            drop(conn);
            if self.dispatch(request) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Handle one request; returns `true` when the server should stop.
    fn dispatch(&self, request: Request) -> bool {
        debug!(opcode = ?request.opcode(), session = ?request.session(), "dispatch");
        match request {
            Request::Mount { reply_path } => {
                self.spawn_mount(reply_path);
            }
            Request::Unmount { session } => match self.sessions.release(session) {
                Ok(mut stream) => {
                    if let Err(err) = write_status(&mut stream, 0) {
                        warn!(session = session.0, %err, "unmount ack failed");
                    }
                    info!(session = session.0, "session unmounted");
                }
                Err(err) => warn!(session = session.0, %err, "unmount refused"),
            },
            Request::Open {
                session,
                path,
                flags,
            } => {
                let status = match self.fs.open(&path, flags) {
                    Ok(handle) => handle.0 as i32,
                    Err(err) => err.to_status(),
                };
                self.send_status(session, status);
            }
            Request::Close { session, handle } => {
                let status = match self.fs.close(handle) {
                    Ok(()) => 0,
                    Err(err) => err.to_status(),
                };
                self.send_status(session, status);
            }
            Request::Write {
                session,
                handle,
                data,
            } => {
                let status = match self.fs.write(handle, &data) {
                    Ok(written) => written as i32,
                    Err(err) => err.to_status(),
                };
                self.send_status(session, status);
            }
            Request::Read {
                session,
                handle,
                len,
            } => {
                let outcome = match self.fs.read(handle, len as usize) {
                    Ok(data) => self
                        .sessions
                        .reply(session, |stream| write_data_reply(stream, &data)),
                    Err(err) => self
                        .sessions
                        .reply(session, |stream| write_status(stream, err.to_status())),
                };
                if let Err(err) = outcome {
                    warn!(session = session.0, %err, "read reply failed");
                }
            }
            Request::Shutdown { session } => {
                if self.sessions.is_sole(session) {
                    info!(session = session.0, "shutdown accepted");
                    self.send_status(session, 0);
                    return true;
                }
                debug!(
                    session = session.0,
                    active = self.sessions.active(),
                    "shutdown refused while other sessions are active"
                );
                self.send_status(session, MfsError::Busy.to_status());
            }
        }
        false
    }

    /// Admission can block; run it off the accept loop.
    fn spawn_mount(&self, reply_path: String) {
        let sessions = Arc::clone(&self.sessions);
        let spawned = thread::Builder::new()
            .name("mount-admission".into())
            .spawn(move || match UnixStream::connect(&reply_path) {
                Ok(stream) => {
                    let session = sessions.admit(stream);
                    let acked = sessions.reply(session, |stream| {
                        write_status(stream, session.0 as i32)
                    });
                    match acked {
                        Ok(()) => info!(session = session.0, "session mounted"),
                        Err(err) => {
                            warn!(session = session.0, %err, "mount ack failed");
                            let _ = sessions.release(session);
                        }
                    }
                }
                Err(err) => warn!(%reply_path, %err, "cannot reach reply channel"),
            });
        if let Err(err) = spawned {
            warn!(%err, "cannot spawn mount-admission thread");
        }
    }

    fn send_status(&self, session: SessionId, status: i32) {
        if let Err(err) = self
            .sessions
            .reply(session, |stream| write_status(stream, status))
        {
            warn!(session = session.0, status, %err, "reply failed");
        }
    }
}
