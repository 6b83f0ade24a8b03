#![forbid(unsafe_code)]
//! MiniFS wire protocol.
//!
//! One request per frame: a one-byte opcode followed by a fixed-layout
//! payload of little-endian 32-bit fields; names travel as 40-byte
//! NUL-padded strings, and a write frame carries `len` raw bytes after the
//! fixed header. Replies are a single little-endian `i32` (status, handle,
//! session id, or signed byte count); a read reply with a positive count is
//! followed by that many raw bytes.
//!
//! Frames decode into the tagged [`Request`] enum exactly once; unknown
//! opcodes and malformed payloads are [`MfsError::Protocol`], never a
//! panic. All stream transfers use `read_exact`/`write_all`, so a short
//! transfer surfaces as an error and interrupts are retried.

use mfs_error::{MfsError, Result};
use mfs_types::{Handle, OpenFlags, SessionId};
use std::io::{Read, Write};

/// Fixed width of every name field on the wire (NUL padding included).
pub const NAME_LEN: usize = 40;

/// Upper bound on a single read or write payload. Caps the allocation a
/// decoded length can force on the server.
pub const MAX_IO_BYTES: usize = 1 << 20;

/// One-byte operation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Mount = 1,
    Unmount = 2,
    Open = 3,
    Close = 4,
    Write = 5,
    Read = 6,
    Shutdown = 7,
}

impl TryFrom<u8> for Opcode {
    type Error = MfsError;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(Self::Mount),
            2 => Ok(Self::Unmount),
            3 => Ok(Self::Open),
            4 => Ok(Self::Close),
            5 => Ok(Self::Write),
            6 => Ok(Self::Read),
            7 => Ok(Self::Shutdown),
            other => Err(MfsError::Protocol(format!("unknown opcode {other}"))),
        }
    }
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Mount {
        reply_path: String,
    },
    Unmount {
        session: SessionId,
    },
    Open {
        session: SessionId,
        path: String,
        flags: OpenFlags,
    },
    Close {
        session: SessionId,
        handle: Handle,
    },
    Write {
        session: SessionId,
        handle: Handle,
        data: Vec<u8>,
    },
    Read {
        session: SessionId,
        handle: Handle,
        len: u32,
    },
    Shutdown {
        session: SessionId,
    },
}

impl Request {
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Mount { .. } => Opcode::Mount,
            Self::Unmount { .. } => Opcode::Unmount,
            Self::Open { .. } => Opcode::Open,
            Self::Close { .. } => Opcode::Close,
            Self::Write { .. } => Opcode::Write,
            Self::Read { .. } => Opcode::Read,
            Self::Shutdown { .. } => Opcode::Shutdown,
        }
    }

    /// The session a request belongs to; `None` for mount.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::Mount { .. } => None,
            Self::Unmount { session }
            | Self::Open { session, .. }
            | Self::Close { session, .. }
            | Self::Write { session, .. }
            | Self::Read { session, .. }
            | Self::Shutdown { session } => Some(*session),
        }
    }

    /// Encode the frame onto a byte stream.
    pub fn encode(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&[self.opcode() as u8])?;
        match self {
            Self::Mount { reply_path } => {
                out.write_all(&encode_name(reply_path)?)?;
            }
            Self::Unmount { session } | Self::Shutdown { session } => {
                out.write_all(&session.0.to_le_bytes())?;
            }
            Self::Open {
                session,
                path,
                flags,
            } => {
                out.write_all(&session.0.to_le_bytes())?;
                out.write_all(&encode_name(path)?)?;
                out.write_all(&flags.bits().to_le_bytes())?;
            }
            Self::Close { session, handle } => {
                out.write_all(&session.0.to_le_bytes())?;
                out.write_all(&handle.0.to_le_bytes())?;
            }
            Self::Write {
                session,
                handle,
                data,
            } => {
                if data.len() > MAX_IO_BYTES {
                    return Err(MfsError::Protocol(format!(
                        "write payload of {} bytes exceeds the frame limit",
                        data.len()
                    )));
                }
                out.write_all(&session.0.to_le_bytes())?;
                out.write_all(&handle.0.to_le_bytes())?;
                out.write_all(&(data.len() as u32).to_le_bytes())?;
                out.write_all(data)?;
            }
            Self::Read {
                session,
                handle,
                len,
            } => {
                out.write_all(&session.0.to_le_bytes())?;
                out.write_all(&handle.0.to_le_bytes())?;
                out.write_all(&len.to_le_bytes())?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Decode one frame from a byte stream.
    pub fn decode(input: &mut impl Read) -> Result<Self> {
        let mut tag = [0u8; 1];
        input.read_exact(&mut tag)?;
        let opcode = Opcode::try_from(tag[0])?;
        match opcode {
            Opcode::Mount => Ok(Self::Mount {
                reply_path: read_name(input)?,
            }),
            Opcode::Unmount => Ok(Self::Unmount {
                session: SessionId(read_u32(input)?),
            }),
            Opcode::Open => {
                let session = SessionId(read_u32(input)?);
                let path = read_name(input)?;
                let raw_flags = read_u32(input)?;
                let flags = OpenFlags::from_bits(raw_flags).ok_or_else(|| {
                    MfsError::Protocol(format!("unknown open flag bits {raw_flags:#b}"))
                })?;
                Ok(Self::Open {
                    session,
                    path,
                    flags,
                })
            }
            Opcode::Close => Ok(Self::Close {
                session: SessionId(read_u32(input)?),
                handle: Handle(read_u32(input)?),
            }),
            Opcode::Write => {
                let session = SessionId(read_u32(input)?);
                let handle = Handle(read_u32(input)?);
                let len = read_u32(input)? as usize;
                if len > MAX_IO_BYTES {
                    return Err(MfsError::Protocol(format!(
                        "write payload of {len} bytes exceeds the frame limit"
                    )));
                }
                let mut data = vec![0u8; len];
                input.read_exact(&mut data)?;
                Ok(Self::Write {
                    session,
                    handle,
                    data,
                })
            }
            Opcode::Read => {
                let session = SessionId(read_u32(input)?);
                let handle = Handle(read_u32(input)?);
                let len = read_u32(input)?;
                if len as usize > MAX_IO_BYTES {
                    return Err(MfsError::Protocol(format!(
                        "read request of {len} bytes exceeds the frame limit"
                    )));
                }
                Ok(Self::Read {
                    session,
                    handle,
                    len,
                })
            }
            Opcode::Shutdown => Ok(Self::Shutdown {
                session: SessionId(read_u32(input)?),
            }),
        }
    }
}

/// Write the single-`i32` reply value.
pub fn write_status(out: &mut impl Write, value: i32) -> Result<()> {
    out.write_all(&value.to_le_bytes())?;
    out.flush()?;
    Ok(())
}

/// Read the single-`i32` reply value.
pub fn read_status(input: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Reply to a read request: signed byte count, then that many raw bytes.
pub fn write_data_reply(out: &mut impl Write, data: &[u8]) -> Result<()> {
    out.write_all(&(data.len() as i32).to_le_bytes())?;
    out.write_all(data)?;
    out.flush()?;
    Ok(())
}

/// Read `len` raw bytes following a positive read-reply count.
pub fn read_payload(input: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    if len > MAX_IO_BYTES {
        return Err(MfsError::Protocol(format!(
            "reply payload of {len} bytes exceeds the frame limit"
        )));
    }
    let mut data = vec![0u8; len];
    input.read_exact(&mut data)?;
    Ok(data)
}

fn read_u32(input: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    // One byte stays reserved for the NUL terminator.
    if bytes.is_empty() || bytes.len() >= NAME_LEN {
        return Err(MfsError::Protocol(format!(
            "name of {} bytes does not fit a {NAME_LEN}-byte field",
            bytes.len()
        )));
    }
    let mut field = [0u8; NAME_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

fn read_name(input: &mut impl Read) -> Result<String> {
    let mut field = [0u8; NAME_LEN];
    input.read_exact(&mut field)?;
    let len = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    if len == 0 {
        return Err(MfsError::Protocol("empty name field".into()));
    }
    String::from_utf8(field[..len].to_vec())
        .map_err(|_| MfsError::Protocol("name field is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(req: &Request) -> Request {
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        Request::decode(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn every_variant_round_trips() {
        let requests = vec![
            Request::Mount {
                reply_path: "/tmp/reply.sock".into(),
            },
            Request::Unmount {
                session: SessionId(3),
            },
            Request::Open {
                session: SessionId(1),
                path: "/file".into(),
                flags: OpenFlags::CREATE | OpenFlags::APPEND,
            },
            Request::Close {
                session: SessionId(1),
                handle: Handle(4),
            },
            Request::Write {
                session: SessionId(2),
                handle: Handle(0),
                data: b"payload bytes".to_vec(),
            },
            Request::Read {
                session: SessionId(2),
                handle: Handle(0),
                len: 512,
            },
            Request::Shutdown {
                session: SessionId(0),
            },
        ];
        for req in requests {
            assert_eq!(round_trip(&req), req);
        }
    }

    #[test]
    fn unknown_opcode_is_a_protocol_error() {
        let err = Request::decode(&mut Cursor::new(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, MfsError::Protocol(_)));
        let err = Request::decode(&mut Cursor::new(vec![9u8; 64])).unwrap_err();
        assert!(matches!(err, MfsError::Protocol(_)));
    }

    #[test]
    fn unknown_flag_bits_are_rejected() {
        let mut buf = Vec::new();
        buf.push(Opcode::Open as u8);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&encode_name("/f").unwrap());
        buf.extend_from_slice(&0b1000u32.to_le_bytes());
        let err = Request::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MfsError::Protocol(_)));
    }

    #[test]
    fn oversized_write_length_is_rejected() {
        let mut buf = Vec::new();
        buf.push(Opcode::Write as u8);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&((MAX_IO_BYTES as u32) + 1).to_le_bytes());
        let err = Request::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MfsError::Protocol(_)));
    }

    #[test]
    fn names_keep_one_byte_for_the_terminator() {
        assert!(encode_name(&"x".repeat(NAME_LEN)).is_err());
        assert!(encode_name(&"x".repeat(NAME_LEN - 1)).is_ok());
        assert!(encode_name("").is_err());
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut buf = Vec::new();
        Request::Unmount {
            session: SessionId(1),
        }
        .encode(&mut buf)
        .unwrap();
        buf.pop();
        let err = Request::decode(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, MfsError::Io(_)));
    }

    #[test]
    fn status_and_data_replies_round_trip() {
        let mut buf = Vec::new();
        write_status(&mut buf, -2).unwrap();
        assert_eq!(read_status(&mut Cursor::new(buf)).unwrap(), -2);

        let mut buf = Vec::new();
        write_data_reply(&mut buf, b"abc").unwrap();
        let mut cursor = Cursor::new(buf);
        let count = read_status(&mut cursor).unwrap();
        assert_eq!(count, 3);
        assert_eq!(read_payload(&mut cursor, 3).unwrap(), b"abc");
    }
}
