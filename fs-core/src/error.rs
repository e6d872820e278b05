//! Errors raised by the disk-layout layer (components A-E).

use fs_proto::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No free block to satisfy an allocation.
    NoDisk,
    /// A path component, or the file at the end of the path, is missing.
    NotFound,
    /// `create` was asked to make a file that already exists.
    Exists,
    /// A path component exceeded `MAXNAMELEN`, or was otherwise malformed.
    BadPath,
    /// A file-block index is out of the addressable range, or an argument
    /// was otherwise invalid.
    Invalid,
}

impl From<Error> for Status {
    fn from(e: Error) -> Status {
        match e {
            Error::NoDisk => Status::NoDisk,
            Error::NotFound => Status::NotFound,
            Error::Exists => Status::FileExists,
            Error::BadPath => Status::BadPath,
            Error::Invalid => Status::Invalid,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}
