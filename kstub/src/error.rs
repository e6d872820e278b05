//! Primitive-level failures from the kernel boundary.
//!
//! Higher crates layer their own error types on top of this one (see
//! `fs_core::Error` and `fs_proto::Status`); `KernelError` is reserved for
//! failures below the file-system abstraction: IPC transport, page-table
//! operations, and resource exhaustion at the virtual-memory level.

use std::fmt;

/// An error raised by a [`crate::page_table::PageTable`] or
/// [`crate::channel::Channel`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A disk sector or block read/write failed.
    IoError,
    /// No free virtual address range of the requested size.
    NoMem,
    /// A permission combination or argument was not valid.
    InvalidArgument,
    /// The peer on an IPC channel is gone.
    BadEnv,
    /// A receive was attempted but no message (or no page) was sent.
    IpcNotRecv,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelError::IoError => "i/o error",
            KernelError::NoMem => "out of virtual memory",
            KernelError::InvalidArgument => "invalid argument",
            KernelError::BadEnv => "peer environment is gone",
            KernelError::IpcNotRecv => "no message available",
        };
        f.write_str(s)
    }
}

impl std::error::Error for KernelError {}
