//! The request/response tagged unions carried one-per-page over IPC.

use crate::modes::{MmapFlags, OpenMode};
use crate::status::Status;

/// A server-assigned handle for an open file.
///
/// The low bits index the open-file table slot (mod [`crate::layout::MAX_OPEN`]);
/// the high bits are a version counter bumped on every reuse of the slot, so
/// a stale `FileId` from a closed file is detectably different from whatever
/// now occupies its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

/// Requests a client may send to the server, one per IPC message.
#[derive(Debug, Clone)]
pub enum Request {
    Open { path: String, mode: OpenMode },
    BlockRequest { file: FileId, file_offset: u32, perm: MmapFlags },
    Read { file: FileId, n: u32 },
    Write { file: FileId, buf: Vec<u8> },
    Stat { file: FileId },
    Flush { file: FileId },
    Remove { path: String },
    Sync,
    SetSize { file: FileId, size: u32 },
}

/// File metadata returned by [`Request::Stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub name: String,
    pub size: u32,
    pub is_dir: bool,
}

/// Responses the server sends back, one per request.
#[derive(Debug, Clone)]
pub enum Response {
    /// `Open` succeeded; carries the new file's id. The descriptor page
    /// itself travels out-of-band via the IPC page transfer.
    Opened { file: FileId },
    /// `BlockRequest` succeeded; the block's page travels out-of-band via
    /// the IPC page transfer, mapped under `granted` permission.
    Block { granted: MmapFlags },
    Read { buf: Vec<u8> },
    Written { n: u32 },
    Stat(Stat),
    /// Plain acknowledgement, used by `Flush`/`Remove`/`Sync`/`SetSize`.
    Ack,
    /// Request failed; no page accompanies this response.
    Err(Status),
}

impl Response {
    pub fn status(&self) -> Status {
        match self {
            Response::Err(s) => *s,
            _ => Status::Ok,
        }
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn take_u32(buf: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn take_bytes(buf: &[u8], pos: &mut usize) -> Vec<u8> {
    let len = take_u32(buf, pos) as usize;
    let out = buf[*pos..*pos + len].to_vec();
    *pos += len;
    out
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn take_string(buf: &[u8], pos: &mut usize) -> String {
    String::from_utf8(take_bytes(buf, pos)).expect("request carried non-UTF-8 path")
}

impl Status {
    fn code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Invalid => 1,
            Status::BadEnv => 2,
            Status::NoDisk => 3,
            Status::NoMem => 4,
            Status::FileExists => 5,
            Status::NotFound => 6,
            Status::BadPath => 7,
            Status::MaxOpen => 8,
            Status::ModeErr => 9,
            Status::IpcNotRecv => 10,
        }
    }

    fn from_code(code: u8) -> Status {
        match code {
            0 => Status::Ok,
            1 => Status::Invalid,
            2 => Status::BadEnv,
            3 => Status::NoDisk,
            4 => Status::NoMem,
            5 => Status::FileExists,
            6 => Status::NotFound,
            7 => Status::BadPath,
            8 => Status::MaxOpen,
            9 => Status::ModeErr,
            _ => Status::IpcNotRecv,
        }
    }
}

impl Request {
    /// Serialize to the opaque byte payload a [`Channel`](crate) message
    /// carries -- the Rust-side equivalent of writing a tagged union into
    /// the shared request page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Request::Open { path, mode } => {
                buf.push(0);
                put_string(&mut buf, path);
                put_u32(&mut buf, mode.bits());
            }
            Request::BlockRequest { file, file_offset, perm } => {
                buf.push(1);
                put_u32(&mut buf, file.0);
                put_u32(&mut buf, *file_offset);
                put_u32(&mut buf, perm.bits());
            }
            Request::Read { file, n } => {
                buf.push(2);
                put_u32(&mut buf, file.0);
                put_u32(&mut buf, *n);
            }
            Request::Write { file, buf: data } => {
                buf.push(3);
                put_u32(&mut buf, file.0);
                put_bytes(&mut buf, data);
            }
            Request::Stat { file } => {
                buf.push(4);
                put_u32(&mut buf, file.0);
            }
            Request::Flush { file } => {
                buf.push(5);
                put_u32(&mut buf, file.0);
            }
            Request::Remove { path } => {
                buf.push(6);
                put_string(&mut buf, path);
            }
            Request::Sync => buf.push(7),
            Request::SetSize { file, size } => {
                buf.push(8);
                put_u32(&mut buf, file.0);
                put_u32(&mut buf, *size);
            }
        }
        buf
    }

    /// Deserialize a request previously produced by [`Request::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Request {
        let mut pos = 1;
        match buf[0] {
            0 => {
                let path = take_string(buf, &mut pos);
                let mode = OpenMode::from_bits_truncate(take_u32(buf, &mut pos));
                Request::Open { path, mode }
            }
            1 => {
                let file = FileId(take_u32(buf, &mut pos));
                let file_offset = take_u32(buf, &mut pos);
                let perm = MmapFlags::from_bits_truncate(take_u32(buf, &mut pos));
                Request::BlockRequest { file, file_offset, perm }
            }
            2 => {
                let file = FileId(take_u32(buf, &mut pos));
                let n = take_u32(buf, &mut pos);
                Request::Read { file, n }
            }
            3 => {
                let file = FileId(take_u32(buf, &mut pos));
                let data = take_bytes(buf, &mut pos);
                Request::Write { file, buf: data }
            }
            4 => Request::Stat { file: FileId(take_u32(buf, &mut pos)) },
            5 => Request::Flush { file: FileId(take_u32(buf, &mut pos)) },
            6 => Request::Remove { path: take_string(buf, &mut pos) },
            7 => Request::Sync,
            8 => {
                let file = FileId(take_u32(buf, &mut pos));
                let size = take_u32(buf, &mut pos);
                Request::SetSize { file, size }
            }
            tag => panic!("unknown request tag {tag}"),
        }
    }
}

impl Response {
    /// Serialize to the opaque byte payload a [`Channel`](crate) message
    /// carries.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Response::Opened { file } => {
                buf.push(0);
                put_u32(&mut buf, file.0);
            }
            Response::Block { granted } => {
                buf.push(1);
                put_u32(&mut buf, granted.bits());
            }
            Response::Read { buf: data } => {
                buf.push(2);
                put_bytes(&mut buf, data);
            }
            Response::Written { n } => {
                buf.push(3);
                put_u32(&mut buf, *n);
            }
            Response::Stat(stat) => {
                buf.push(4);
                put_string(&mut buf, &stat.name);
                put_u32(&mut buf, stat.size);
                buf.push(stat.is_dir as u8);
            }
            Response::Ack => buf.push(5),
            Response::Err(status) => {
                buf.push(6);
                buf.push(status.code());
            }
        }
        buf
    }

    /// Deserialize a response previously produced by [`Response::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Response {
        let mut pos = 1;
        match buf[0] {
            0 => Response::Opened { file: FileId(take_u32(buf, &mut pos)) },
            1 => Response::Block { granted: MmapFlags::from_bits_truncate(take_u32(buf, &mut pos)) },
            2 => Response::Read { buf: take_bytes(buf, &mut pos) },
            3 => Response::Written { n: take_u32(buf, &mut pos) },
            4 => {
                let name = take_string(buf, &mut pos);
                let size = take_u32(buf, &mut pos);
                let is_dir = buf[pos] != 0;
                Response::Stat(Stat { name, size, is_dir })
            }
            5 => Response::Ack,
            6 => Response::Err(Status::from_code(buf[pos])),
            tag => panic!("unknown response tag {tag}"),
        }
    }
}

#[cfg(test)]
mod wire_tests {
    use super::*;

    #[test]
    fn open_request_roundtrips() {
        let req = Request::Open { path: "/a/b".to_string(), mode: OpenMode::O_RDWR | OpenMode::O_CREAT };
        let bytes = req.to_bytes();
        match Request::from_bytes(&bytes) {
            Request::Open { path, mode } => {
                assert_eq!(path, "/a/b");
                assert_eq!(mode, OpenMode::O_RDWR | OpenMode::O_CREAT);
            }
            _ => panic!("expected Open"),
        }
    }

    #[test]
    fn write_request_roundtrips() {
        let req = Request::Write { file: FileId(7), buf: vec![1, 2, 3, 4] };
        let bytes = req.to_bytes();
        match Request::from_bytes(&bytes) {
            Request::Write { file, buf } => {
                assert_eq!(file, FileId(7));
                assert_eq!(buf, vec![1, 2, 3, 4]);
            }
            _ => panic!("expected Write"),
        }
    }

    #[test]
    fn err_response_roundtrips() {
        let resp = Response::Err(Status::NotFound);
        let bytes = resp.to_bytes();
        match Response::from_bytes(&bytes) {
            Response::Err(s) => assert_eq!(s, Status::NotFound),
            _ => panic!("expected Err"),
        }
    }

    #[test]
    fn stat_response_roundtrips() {
        let resp = Response::Stat(Stat { name: "leaf".to_string(), size: 42, is_dir: false });
        let bytes = resp.to_bytes();
        match Response::from_bytes(&bytes) {
            Response::Stat(stat) => {
                assert_eq!(stat.name, "leaf");
                assert_eq!(stat.size, 42);
                assert!(!stat.is_dir);
            }
            _ => panic!("expected Stat"),
        }
    }
}
