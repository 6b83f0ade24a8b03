#![forbid(unsafe_code)]
//! End-to-end client/server exercises over real Unix sockets: mount
//! admission at the session bound, data round trips, error propagation,
//! and the shutdown contract.

use mfs_client::Client;
use mfs_error::MfsError;
use mfs_server::{Server, ServerConfig};
use mfs_types::OpenFlags;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn start_server(dir: &Path, max_sessions: usize) -> (PathBuf, JoinHandle<mfs_error::Result<()>>) {
    let socket = dir.join("srv");
    let server = Server::new(ServerConfig::new(&socket).max_sessions(max_sessions)).unwrap();
    let handle = thread::spawn(move || server.serve());
    wait_for(&socket);
    (socket, handle)
}

fn wait_for(socket: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !socket.exists() {
        assert!(Instant::now() < deadline, "server socket never appeared");
        thread::sleep(Duration::from_millis(5));
    }
}

fn errno_of(err: &MfsError) -> Option<i32> {
    match err {
        MfsError::Io(io_err) => io_err.raw_os_error(),
        _ => None,
    }
}

#[test]
fn mount_write_read_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 4);

    let mut client = Client::mount(&socket, dir.path().join("r0")).unwrap();
    let handle = client
        .open("/greeting", OpenFlags::CREATE)
        .unwrap();
    assert_eq!(client.write(handle, b"hello over the wire").unwrap(), 19);
    assert_eq!(client.read(handle, 64).unwrap(), b"hello over the wire");
    assert_eq!(client.read(handle, 64).unwrap(), b"");
    client.close(handle).unwrap();

    client.shutdown().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn blocked_mount_proceeds_after_unmount() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 1);

    let first = Client::mount(&socket, dir.path().join("r1")).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let socket = socket.clone();
        let reply = dir.path().join("r2");
        thread::spawn(move || {
            let client = Client::mount(&socket, reply).unwrap();
            tx.send(client.session()).unwrap();
            client
        })
    };

    // The table is full, so the second mount must still be waiting.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    first.unmount().unwrap();
    let session = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(session.0, 0, "freed slot is recycled");

    let mut second = waiter.join().unwrap();
    second.shutdown().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn shutdown_requires_a_sole_session() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 4);

    let mut one = Client::mount(&socket, dir.path().join("ra")).unwrap();
    let two = Client::mount(&socket, dir.path().join("rb")).unwrap();
    assert_ne!(one.session(), two.session());

    let err = one.shutdown().unwrap_err();
    assert_eq!(errno_of(&err), Some(MfsError::Busy.to_errno()));

    // The refused session is still usable.
    let handle = one.open("/still-here", OpenFlags::CREATE).unwrap();
    one.close(handle).unwrap();

    two.unmount().unwrap();
    one.shutdown().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn server_errors_become_negative_statuses() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 4);
    let mut client = Client::mount(&socket, dir.path().join("rc")).unwrap();

    let err = client.open("/missing", OpenFlags::NONE).unwrap_err();
    assert_eq!(errno_of(&err), Some(MfsError::NotFound(String::new()).to_errno()));

    let err = client.open("bad-path", OpenFlags::CREATE).unwrap_err();
    assert_eq!(
        errno_of(&err),
        Some(MfsError::InvalidArgument(String::new()).to_errno())
    );

    // Closing a never-opened handle fails rather than succeeding twice.
    assert!(client.close(mfs_types::Handle(17)).is_err());

    client.shutdown().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn malformed_frames_do_not_stop_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 4);

    // An unknown opcode followed by garbage, on its own connection.
    {
        use std::io::Write;
        let mut raw = UnixStream::connect(&socket).unwrap();
        raw.write_all(&[0xFF; 8]).unwrap();
    }

    let mut client = Client::mount(&socket, dir.path().join("rd")).unwrap();
    let handle = client.open("/after-junk", OpenFlags::CREATE).unwrap();
    client.close(handle).unwrap();

    client.shutdown().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn append_and_truncate_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (socket, server) = start_server(dir.path(), 4);
    let mut client = Client::mount(&socket, dir.path().join("re")).unwrap();

    let h = client.open("/f", OpenFlags::CREATE).unwrap();
    client.write(h, b"AA").unwrap();
    client.close(h).unwrap();

    let h = client.open("/f", OpenFlags::APPEND).unwrap();
    client.write(h, b"BB").unwrap();
    client.close(h).unwrap();

    let h = client.open("/f", OpenFlags::NONE).unwrap();
    assert_eq!(client.read(h, 16).unwrap(), b"AABB");
    client.close(h).unwrap();

    let h = client.open("/f", OpenFlags::TRUNCATE).unwrap();
    client.write(h, b"C").unwrap();
    assert_eq!(client.read(h, 16).unwrap(), b"C");
    client.close(h).unwrap();

    client.shutdown().unwrap();
    server.join().unwrap().unwrap();
}
