//! The buffer cache: a lazy, fault-driven map of disk blocks into memory.
//!
//! Block `b` lives at a fixed virtual address `base + b * BLKSIZE`. No
//! sector is read until its page is touched; [`BufferCache::pgfault`] is
//! the entry point a real kernel's page-fault upcall would call, and
//! every other accessor (`get`, `read_block`) goes through it so a bare
//! lookup is enough to materialize a block on first use.
//!
//! The MMU dirty bit doubles as the write log: [`BufferCache::flush`]
//! writes a block back only if it is dirty (or `force` is set), then
//! clears the bit.

use crate::disk;
use fs_proto::BLKSIZE;
use kstub::{BlockDisk, KernelError, Page, PageTable, Permission, Va};

/// A disk-block-granular wrapper over a sector-addressed [`BlockDisk`],
/// mapped lazily into a fixed virtual region.
pub struct BufferCache<PT, BD> {
    page_table: PT,
    disk: BD,
    base: Va,
    nblocks: u32,
}

impl<PT: PageTable, BD: BlockDisk> BufferCache<PT, BD> {
    /// Reserve `base..base + nblocks*BLKSIZE` as the lazily-mapped disk
    /// region backed by `disk`.
    pub fn new(page_table: PT, disk: BD, base: Va, nblocks: u32) -> Self {
        BufferCache { page_table, disk, base, nblocks }
    }

    pub fn nblocks(&self) -> u32 {
        self.nblocks
    }

    /// Fixed virtual address of block `b`.
    ///
    /// Block 0 is reserved and never valid to address; an out-of-range
    /// block number is a programmer error, matching `diskaddr`'s panic.
    pub fn addr_of(&self, b: u32) -> Va {
        assert!(b != 0 && b < self.nblocks, "bad block number {b} in diskaddr");
        self.base.add_pages(b as usize)
    }

    fn block_of(&self, va: Va) -> u32 {
        ((va.as_usize() - self.base.as_usize()) / BLKSIZE) as u32
    }

    pub fn is_mapped(&self, b: u32) -> bool {
        self.page_table.is_mapped(self.addr_of(b))
    }

    pub fn is_dirty(&self, b: u32) -> bool {
        self.page_table.is_dirty(self.addr_of(b))
    }

    /// Page-fault handler for any address inside the disk-map region:
    /// allocate a fresh page and read the block's sectors into it.
    pub fn pgfault(&mut self, va: Va) -> Result<(), KernelError> {
        let block_va = va.page_floor();
        let b = self.block_of(block_va);
        assert!(b < self.nblocks, "reading non-existent block {b}");
        self.read_block(b)
    }

    /// Ensure block `b` is mapped, reading it from disk if this is the
    /// first touch.
    pub fn read_block(&mut self, b: u32) -> Result<(), KernelError> {
        let va = self.addr_of(b);
        if self.page_table.is_mapped(va) {
            return Ok(());
        }
        let page = Page::new();
        page.with_bytes_mut(|buf| disk::read_block(&self.disk, b, buf))?;
        self.page_table
            .map(va, page, Permission::READ | Permission::WRITE | Permission::USER)
            .expect("couldn't allocate a new page for file system");
        Ok(())
    }

    /// Get the page backing block `b`, materializing it first if needed.
    pub fn get(&mut self, b: u32) -> Result<Page, KernelError> {
        self.read_block(b)?;
        let va = self.addr_of(b);
        Ok(self.page_table.lookup(va).expect("just-mapped block missing").0)
    }

    /// Record that block `b` was written through (used by the in-memory
    /// page-table double; a real binding relies on the MMU's dirty bit).
    pub fn mark_dirty(&mut self, b: u32) {
        self.page_table.mark_written(self.addr_of(b));
    }

    /// Write a block back to disk if it is dirty, or unconditionally if
    /// `force` is set. A no-op if the block was never mapped.
    pub fn flush(&mut self, b: u32, force: bool) -> Result<(), KernelError> {
        let va = self.addr_of(b);
        if !self.page_table.is_mapped(va) {
            return Ok(());
        }
        if !force && !self.page_table.is_dirty(va) {
            return Ok(());
        }
        let page = self.page_table.lookup(va).unwrap().0;
        page.with_bytes(|buf| disk::write_block(&mut self.disk, b, buf))?;
        self.page_table.clear_dirty(va);
        Ok(())
    }

    /// Re-map block `b`'s page into this cache's own view with write
    /// access revoked, marked copy-on-write. Used when handing a block
    /// out under a private mapping: the server's own view must downgrade
    /// too, or a write through the cache would bypass the client's COW
    /// fault.
    pub fn remap_cow_read_only(&mut self, b: u32) -> Result<(), KernelError> {
        let va = self.addr_of(b);
        let page = self.page_table.lookup(va).expect("remap of not-yet-mapped block").0;
        self.page_table.map(va, page, Permission::READ | Permission::USER | Permission::COW)
    }

    pub fn page_table_mut(&mut self) -> &mut PT {
        &mut self.page_table
    }

    pub fn page_table(&self) -> &PT {
        &self.page_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstub::disk::SECTOR_SIZE;
    use kstub::{MemDisk, MemPageTable};

    fn fixture() -> BufferCache<MemPageTable, MemDisk> {
        let disk = MemDisk::new(64 * (BLKSIZE / SECTOR_SIZE) as u64);
        BufferCache::new(MemPageTable::new(), disk, Va::new(0x1000_0000), 64)
    }

    #[test]
    fn first_touch_materializes_zeroed_block() {
        let mut bc = fixture();
        assert!(!bc.is_mapped(3));
        let page = bc.get(3).unwrap();
        assert!(bc.is_mapped(3));
        page.with_bytes(|b| assert_eq!(b[0], 0));
    }

    #[test]
    fn write_then_flush_persists_to_disk() {
        let mut bc = fixture();
        let page = bc.get(5).unwrap();
        page.with_bytes_mut(|b| b[0] = 0xAB);
        bc.mark_dirty(5);
        assert!(bc.is_dirty(5));
        bc.flush(5, false).unwrap();
        assert!(!bc.is_dirty(5));

        // Fresh cache over the same disk should see the persisted byte.
        let disk = bc.disk;
        let mut bc2 = BufferCache::new(MemPageTable::new(), disk, Va::new(0x1000_0000), 64);
        let page2 = bc2.get(5).unwrap();
        page2.with_bytes(|b| assert_eq!(b[0], 0xAB));
    }

    #[test]
    fn flush_without_dirty_is_noop_unless_forced() {
        let mut bc = fixture();
        bc.get(2).unwrap();
        bc.flush(2, false).unwrap();
        bc.flush(2, true).unwrap();
    }

    #[test]
    #[should_panic(expected = "bad block number")]
    fn block_zero_is_reserved() {
        let bc = fixture();
        bc.addr_of(0);
    }
}
