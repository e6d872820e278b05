//! The file-system server: open-file table, IPC dispatch, and block
//! hand-off on top of `fs-core`'s disk logic.

pub mod block_handoff;
pub mod dispatch;
pub mod open_file;

pub use dispatch::Server;
pub use open_file::{Entry, OpenFileTable};
