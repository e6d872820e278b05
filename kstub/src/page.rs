//! Page allocation and the memory-permission bitflags.

use crate::addressing::PAGE_SIZE;
use std::sync::Arc;

/// Possible memory permissions for a page mapping.
///
/// Extends the kernel's page-permission bits (`READ`/`WRITE`/`EXECUTABLE`/
/// `USER`) with the two mapping-discipline bits this file system needs to
/// negotiate block handoffs and fork duplication: `COW` (private, copy on
/// first write) and `SHARE` (same physical page visible to every holder).
bitflags::bitflags! {
    #[derive(Default)]
    pub struct Permission: usize {
        /// Page is readable.
        const READ = 1 << 0;
        /// Page is writable.
        const WRITE = 1 << 1;
        /// Page is executable.
        const EXECUTABLE = 1 << 2;
        /// Page can be referred to by a user application.
        const USER = 1 << 3;
        /// Mapping is copy-on-write: private, duplicated on first write.
        const COW = 1 << 4;
        /// Mapping is shared: writes are visible to every holder.
        const SHARE = 1 << 5;
    }
}

impl Permission {
    /// `COW` and `SHARE` together describe an invalid mapping discipline.
    pub fn is_valid(&self) -> bool {
        !(self.contains(Permission::COW) && self.contains(Permission::SHARE))
    }
}

/// A memory page: a reference-counted 4 KiB buffer.
///
/// A real kernel holds a page's reference count in its physical frame
/// table and exposes it implicitly through `Clone`/`Drop`; this stub models
/// the same lifecycle directly with `Arc`, which gives callers an explicit
/// `refcount()` query — the signal the open-file table's liveness rule and
/// fork's COW/SHARE discrimination both depend on.
#[derive(Clone)]
pub struct Page {
    inner: Arc<std::sync::Mutex<[u8; PAGE_SIZE]>>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Allocate a new zeroed page.
    pub fn new() -> Self {
        Page {
            inner: Arc::new(std::sync::Mutex::new([0u8; PAGE_SIZE])),
        }
    }

    /// Number of live holders of this page (this handle plus every clone).
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Copy this page's contents into a brand new, independently owned page.
    pub fn deep_copy(&self) -> Page {
        let copy = Page::new();
        copy.inner.lock().unwrap().copy_from_slice(&*self.inner.lock().unwrap());
        copy
    }

    /// Run `f` with read access to the page's bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> R {
        f(&self.inner.lock().unwrap())
    }

    /// Run `f` with mutable access to the page's bytes.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    /// Identity of the underlying allocation, stable across clones.
    ///
    /// Two `Page` handles compare equal under this identity iff they refer
    /// to the same physical allocation (as opposed to two pages that happen
    /// to hold identical bytes).
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}
