//! The single-page IPC transport.
//!
//! The real kernel's `ipc_send`/`ipc_recv` exchange one 64-bit value plus an
//! optional page mapping between exactly two environments, synchronously:
//! the sender blocks until a receiver is waiting, and the receiver blocks
//! until a sender arrives. [`Channel`] captures just that contract so
//! `fs-server`'s dispatch loop and `fs-client`'s request helpers can be
//! written once against the trait and exercised in tests against
//! [`MemChannel`] without a real kernel underneath.

use crate::error::KernelError;
use crate::page::{Page, Permission};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A message in flight: the tagged value every request/response carries,
/// plus an optional page transfer.
#[derive(Clone)]
pub struct Message {
    /// Opaque payload; `fs-proto` defines what the bytes mean.
    pub value: Vec<u8>,
    /// A page handed over with the message, and the permission it is
    /// granted under in the receiver's address space.
    pub page: Option<(Page, Permission)>,
}

/// One endpoint of a single-page IPC channel.
pub trait Channel {
    /// Send `msg` to the peer. Blocks (in a real kernel) until received;
    /// the in-memory double never blocks since it is only ever driven by a
    /// single test thread at a time.
    fn send(&self, msg: Message) -> Result<(), KernelError>;

    /// Receive the next message sent to this endpoint.
    ///
    /// Returns [`KernelError::IpcNotRecv`] if no message is queued -- this
    /// is the transport-fault case the dispatch loop must log and recover
    /// from rather than treat as fatal.
    fn recv(&self) -> Result<Message, KernelError>;
}

/// An in-memory, single-direction mailbox channel for tests.
///
/// Two `MemChannel`s wired to the same queue (via [`MemChannel::pair`])
/// model one direction of the client/server IPC each; a full duplex
/// connection is just two pairs.
#[derive(Default)]
pub struct MemChannel {
    queue: Mutex<VecDeque<Message>>,
}

impl MemChannel {
    /// A fresh, empty channel.
    pub fn new() -> Self {
        MemChannel {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl Channel for MemChannel {
    fn send(&self, msg: Message) -> Result<(), KernelError> {
        self.queue.lock().unwrap().push_back(msg);
        Ok(())
    }

    fn recv(&self) -> Result<Message, KernelError> {
        self.queue.lock().unwrap().pop_front().ok_or(KernelError::IpcNotRecv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_without_send_is_not_recv() {
        let ch = MemChannel::new();
        assert_eq!(ch.recv().unwrap_err(), KernelError::IpcNotRecv);
    }

    #[test]
    fn fifo_order() {
        let ch = MemChannel::new();
        ch.send(Message { value: vec![1], page: None }).unwrap();
        ch.send(Message { value: vec![2], page: None }).unwrap();
        assert_eq!(ch.recv().unwrap().value, vec![1]);
        assert_eq!(ch.recv().unwrap().value, vec![2]);
    }
}
