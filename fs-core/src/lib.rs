//! Disk layout and file-system logic: buffer cache, block bitmap, file
//! layout walker, and path resolver.
//!
//! This crate has no kernel dependency beyond the trait boundary in
//! `kstub`, and is exercised in tests purely against `kstub`'s in-memory
//! page table and block-device doubles.

pub mod bitmap;
pub mod buffer_cache;
pub mod disk;
pub mod error;
pub mod file_layout;
pub mod fs;
pub mod path;

pub use buffer_cache::BufferCache;
pub use error::Error;
pub use fs::FileSystem;
pub use path::Slot;
