//! Negative-integer status codes returned in every response.

/// The error taxonomy reported to clients (§7's "client errors" and
/// "resource exhaustion" classes). Programmer errors are not part of this
/// enum -- they panic at the point of detection instead of being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Invalid,
    BadEnv,
    NoDisk,
    NoMem,
    FileExists,
    NotFound,
    BadPath,
    MaxOpen,
    ModeErr,
    IpcNotRecv,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::Invalid => "invalid argument",
            Status::BadEnv => "bad environment",
            Status::NoDisk => "no free block",
            Status::NoMem => "no free virtual memory",
            Status::FileExists => "file exists",
            Status::NotFound => "not found",
            Status::BadPath => "bad path",
            Status::MaxOpen => "too many open files",
            Status::ModeErr => "mode mismatch",
            Status::IpcNotRecv => "no message available",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Status {}
