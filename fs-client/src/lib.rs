//! The client side of the file system: a per-process mmap region manager
//! and the fork/duppage cooperation that keeps those regions correct
//! across a fork. Neither module touches the server's on-disk state
//! directly -- everything here goes through the wire protocol or the
//! local page table.

pub mod fork;
pub mod mmap;

pub use fork::{duppage, fork_address_space};
pub use mmap::MmapManager;
