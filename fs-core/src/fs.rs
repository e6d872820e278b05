//! The top-level file system: ties the buffer cache, bitmap, file layout,
//! and path resolver into the operations `fs-server` drives.

use crate::bitmap;
use crate::buffer_cache::BufferCache;
use crate::error::Error;
use crate::file_layout;
use crate::path::{self, Slot, WalkOutcome};
use fs_proto::{FileRecord, FileType, Superblock, BLKSIZE, MAXFILE};
use kstub::{BlockDisk, PageTable, Va};

/// The mounted file system: disk geometry, buffer cache, and the super
/// block (which embeds the root directory).
pub struct FileSystem<PT, BD> {
    cache: BufferCache<PT, BD>,
    sb: Superblock,
}

impl<PT: PageTable, BD: BlockDisk> FileSystem<PT, BD> {
    /// Format a fresh disk of `nblocks` blocks, mapped starting at `base`.
    pub fn format(page_table: PT, disk: BD, base: Va, nblocks: u32) -> Result<Self, Error> {
        let mut cache = BufferCache::new(page_table, disk, base, nblocks);
        bitmap::format(&mut cache, nblocks)?;
        let sb = Superblock::new(nblocks);
        log::info!("formatted file system: {nblocks} blocks");
        Ok(FileSystem { cache, sb })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// Resolve an existing path to its file record and on-disk slot.
    pub fn resolve(&mut self, path: &str) -> Result<(FileRecord, Slot), Error> {
        match path::walk_path(&mut self.cache, &self.sb, path)? {
            WalkOutcome::Found { file, slot } => Ok((file, slot)),
            WalkOutcome::MissingLastComponent { .. } => Err(Error::NotFound),
        }
    }

    /// Create a new file (or directory) at `path`.
    pub fn create(&mut self, path: &str, ty: FileType) -> Result<(FileRecord, Slot), Error> {
        let slot = path::create(&mut self.cache, &mut self.sb, path, ty)?;
        let file = path::read_slot(&mut self.cache, &self.sb, slot)?;
        log::debug!("created {path:?}");
        Ok((file, slot))
    }

    /// Remove the file at `path`.
    pub fn remove(&mut self, path: &str) -> Result<(), Error> {
        path::remove(&mut self.cache, &mut self.sb, path)?;
        log::debug!("removed {path:?}");
        Ok(())
    }

    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes actually read (clamped to the file's size). Holes
    /// read as zero without allocating anything.
    pub fn read(&mut self, file: &FileRecord, offset: u32, buf: &mut [u8]) -> Result<u32, Error> {
        let end = (offset as u64 + buf.len() as u64).min(file.size as u64) as u32;
        if offset >= end {
            return Ok(0);
        }
        let mut pos = offset;
        let mut written = 0usize;
        while pos < end {
            let bno = pos / BLKSIZE as u32;
            let within = (pos % BLKSIZE as u32) as usize;
            let n = ((BLKSIZE as u32 - pos % BLKSIZE as u32) as u32).min(end - pos) as usize;
            let b = file_layout::lookup_block(&mut self.cache, file, bno)?;
            if b == 0 {
                buf[written..written + n].fill(0);
            } else {
                let page = self.cache.get(b).map_err(|_| Error::Invalid)?;
                page.with_bytes(|src| buf[written..written + n].copy_from_slice(&src[within..within + n]));
            }
            pos += n as u32;
            written += n;
        }
        Ok(written as u32)
    }

    /// Write `buf` at `offset`, growing the file (and allocating blocks)
    /// as needed up to [`MAXFILE`]. Returns the number of bytes written.
    ///
    /// Walks block-by-block using the *current write position* rather
    /// than the original `offset` -- using `offset` for every iteration
    /// would repeatedly rewrite the first block on any write spanning
    /// more than one block.
    pub fn write(&mut self, file: &mut FileRecord, slot: Slot, offset: u32, buf: &[u8]) -> Result<u32, Error> {
        let end = offset as u64 + buf.len() as u64;
        if end > MAXFILE as u64 {
            return Err(Error::Invalid);
        }
        if end as u32 > file.size {
            file_layout::set_size(&mut self.cache, file, end as u32)?;
        }
        let mut pos = offset;
        let mut read = 0usize;
        while (pos as u64) < end {
            let bno = pos / BLKSIZE as u32;
            let within = (pos % BLKSIZE as u32) as usize;
            let n = (BLKSIZE as u32 - pos % BLKSIZE as u32).min(end as u32 - pos) as usize;
            let b = file_layout::get_block(&mut self.cache, file, bno)?;
            let page = self.cache.get(b).map_err(|_| Error::Invalid)?;
            page.with_bytes_mut(|dst| dst[within..within + n].copy_from_slice(&buf[read..read + n]));
            self.cache.mark_dirty(b);
            pos += n as u32;
            read += n;
        }
        path::write_slot(&mut self.cache, &mut self.sb, slot, file)?;
        Ok(read as u32)
    }

    /// Resize `file` in place, freeing trailing blocks when shrinking.
    pub fn set_size(&mut self, file: &mut FileRecord, slot: Slot, size: u32) -> Result<(), Error> {
        file_layout::set_size(&mut self.cache, file, size)?;
        path::write_slot(&mut self.cache, &mut self.sb, slot, file)
    }

    /// Flush `file`'s data in `[offset, offset+length)` (or the whole file
    /// when `length == 0`) plus its metadata block, forcing a write-back
    /// when `force` is set.
    pub fn flush(&mut self, file: &FileRecord, slot: Slot, offset: u32, length: u32, force: bool) -> Result<(), Error> {
        file_layout::flush(&mut self.cache, file, offset, length, force)?;
        if let Slot::InBlock { block, .. } = slot {
            self.cache.flush(block, force).map_err(|_| Error::Invalid)?;
        }
        Ok(())
    }

    /// Force every dirty block in the cache back to disk. The reference
    /// implementation of `sync`: a real server would instead track and
    /// flush only the blocks it touched, but this is a safe upper bound.
    pub fn sync(&mut self) -> Result<(), Error> {
        for b in 1..self.cache.nblocks() {
            self.cache.flush(b, false).map_err(|_| Error::Invalid)?;
        }
        Ok(())
    }

    pub fn cache_mut(&mut self) -> &mut BufferCache<PT, BD> {
        &mut self.cache
    }
}
