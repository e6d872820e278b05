//! Kernel-primitive boundary for the file-system server workspace.
//!
//! This crate is the seam between the file-system logic (`fs-core`,
//! `fs-server`, `fs-client`) and the microkernel that actually schedules
//! processes, owns physical memory, and dispatches page faults and IPC
//! traps. It defines the primitives those crates consume --
//! [`addressing::Va`], [`page::Page`]/[`page::Permission`],
//! [`page_table::PageTable`], [`channel::Channel`], and [`error::KernelError`]
//! -- and ships an in-memory implementation of each so the rest of the
//! workspace is host-testable without a real kernel.

pub mod addressing;
pub mod channel;
pub mod disk;
pub mod error;
pub mod page;
pub mod page_table;

pub use addressing::{Va, PAGE_SIZE};
pub use channel::{Channel, MemChannel, Message};
pub use disk::{BlockDisk, MemDisk};
pub use error::KernelError;
pub use page::{Page, Permission};
pub use page_table::{FaultKind, MemPageTable, PageTable};
