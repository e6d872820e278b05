//! Wire protocol and on-disk layout shared between the file-system server
//! and its clients.
//!
//! This crate has no kernel dependency -- it is pure data definitions --
//! so both `fs-server` and `fs-client` depend on it without pulling in each
//! other's internals.

pub mod layout;
pub mod modes;
pub mod protocol;
pub mod status;

pub use layout::{FileRecord, FileType, Superblock, BLKSIZE, MAXFILE, MAXNAMELEN, MAXPATHLEN, MAX_OPEN, NDIRECT, NINDIRECT};
pub use modes::{MmapFlags, OpenMode};
pub use protocol::{FileId, Request, Response, Stat};
pub use status::Status;
