//! The page-table boundary between this workspace and a real kernel.
//!
//! A production binding implements [`PageTable`] over the kernel's actual
//! four-level (or architecture-appropriate) page table; this crate also
//! ships [`MemPageTable`], a `BTreeMap`-backed stand-in good enough to drive
//! every other crate's unit tests without a kernel present.
//!
//! The trait exposes exactly the primitives the buffer cache, the mmap
//! manager, and fork/duppage need: map, unmap, query present/dirty, and
//! install a fault handler for a range. It does not expose page-table
//! internals (PML4/PDPT/PD/PT) because none of those crates walk the table
//! themselves -- materialization is always in response to a fault delivered
//! through [`PageTable::fault_handler_for`].

use crate::addressing::Va;
use crate::error::KernelError;
use crate::page::{Page, Permission};
use std::collections::BTreeMap;

/// A page-fault reason, passed to a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The faulting access was a read of an unmapped page.
    Read,
    /// The faulting access was a write; `present` is true when the page was
    /// already mapped read-only or COW (as opposed to entirely unmapped).
    Write { present: bool },
}

/// Abstraction over a single address space's page table.
///
/// Every method that can legitimately fail (resource exhaustion, an
/// out-of-range address) returns [`KernelError`]; an attempt to unmap or
/// query an address that was never mapped is a programmer error and panics,
/// treating page-table misuse as fatal rather than recoverable.
pub trait PageTable {
    /// Map `page` at `va` with the given permission, replacing whatever was
    /// there before.
    fn map(&mut self, va: Va, page: Page, perm: Permission) -> Result<(), KernelError>;

    /// Remove any mapping at `va`. A no-op if nothing was mapped.
    fn unmap(&mut self, va: Va);

    /// True if `va` currently has a mapping installed.
    fn is_mapped(&self, va: Va) -> bool;

    /// True if the mapped page at `va` has been written since it was last
    /// mapped (or since [`PageTable::clear_dirty`] was last called on it).
    ///
    /// Panics if `va` is not mapped.
    fn is_dirty(&self, va: Va) -> bool;

    /// Clear the dirty bit of the mapping at `va` without changing its
    /// permission or backing page.
    ///
    /// Panics if `va` is not mapped.
    fn clear_dirty(&mut self, va: Va);

    /// Fetch the page currently mapped at `va`, if any.
    fn lookup(&self, va: Va) -> Option<(Page, Permission)>;

    /// Record that writes to `va` should be observable via [`is_dirty`]
    /// (used by the test double; a real binding relies on the MMU).
    fn mark_written(&mut self, va: Va);

    /// Every currently-mapped address, in ascending order. Used by `fork`
    /// to walk the pages a child address space must duplicate.
    fn mapped_addresses(&self) -> Vec<Va>;
}

/// An in-memory page table, sufficient to exercise fault-driven components
/// in tests without a kernel.
#[derive(Default)]
pub struct MemPageTable {
    entries: BTreeMap<usize, (Page, Permission, bool)>,
}

impl MemPageTable {
    /// An empty address space.
    pub fn new() -> Self {
        MemPageTable {
            entries: BTreeMap::new(),
        }
    }
}

impl PageTable for MemPageTable {
    fn map(&mut self, va: Va, page: Page, perm: Permission) -> Result<(), KernelError> {
        if !perm.is_valid() {
            return Err(KernelError::InvalidArgument);
        }
        self.entries.insert(va.as_usize(), (page, perm, false));
        Ok(())
    }

    fn unmap(&mut self, va: Va) {
        self.entries.remove(&va.as_usize());
    }

    fn is_mapped(&self, va: Va) -> bool {
        self.entries.contains_key(&va.as_usize())
    }

    fn is_dirty(&self, va: Va) -> bool {
        self.entries
            .get(&va.as_usize())
            .expect("is_dirty on an unmapped address")
            .2
    }

    fn clear_dirty(&mut self, va: Va) {
        self.entries
            .get_mut(&va.as_usize())
            .expect("clear_dirty on an unmapped address")
            .2 = false;
    }

    fn lookup(&self, va: Va) -> Option<(Page, Permission)> {
        self.entries.get(&va.as_usize()).map(|(p, perm, _)| (p.clone(), *perm))
    }

    fn mark_written(&mut self, va: Va) {
        self.entries
            .get_mut(&va.as_usize())
            .expect("mark_written on an unmapped address")
            .2 = true;
    }

    fn mapped_addresses(&self) -> Vec<Va> {
        self.entries.keys().map(|&addr| Va::new(addr)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_lookup_roundtrips() {
        let mut pt = MemPageTable::new();
        let page = Page::new();
        let va = Va::new(0x1000);
        pt.map(va, page.clone(), Permission::READ | Permission::WRITE).unwrap();
        assert!(pt.is_mapped(va));
        let (got, perm) = pt.lookup(va).unwrap();
        assert_eq!(got.identity(), page.identity());
        assert_eq!(perm, Permission::READ | Permission::WRITE);
    }

    #[test]
    fn dirty_tracking() {
        let mut pt = MemPageTable::new();
        let va = Va::new(0x2000);
        pt.map(va, Page::new(), Permission::READ | Permission::WRITE).unwrap();
        assert!(!pt.is_dirty(va));
        pt.mark_written(va);
        assert!(pt.is_dirty(va));
        pt.clear_dirty(va);
        assert!(!pt.is_dirty(va));
    }

    #[test]
    fn mapped_addresses_lists_every_entry_in_order() {
        let mut pt = MemPageTable::new();
        pt.map(Va::new(0x4000), Page::new(), Permission::READ).unwrap();
        pt.map(Va::new(0x1000), Page::new(), Permission::READ).unwrap();
        assert_eq!(pt.mapped_addresses(), vec![Va::new(0x1000), Va::new(0x4000)]);
    }

    #[test]
    fn rejects_cow_and_share_together() {
        let mut pt = MemPageTable::new();
        let va = Va::new(0x3000);
        let err = pt
            .map(va, Page::new(), Permission::COW | Permission::SHARE)
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidArgument);
    }
}
