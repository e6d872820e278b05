//! File layout walker: direct + single-indirect block addressing.

use crate::bitmap;
use crate::buffer_cache::BufferCache;
use crate::error::Error;
use fs_proto::{FileRecord, BLKSIZE, NDIRECT, NINDIRECT};
use kstub::{BlockDisk, PageTable};

fn ceil_div(a: u32, b: u32) -> u32 {
    a.div_ceil(b)
}

/// Resolve the on-disk slot that holds the block pointer for `file`'s
/// `file_bno`-th block. When the slot lives in the indirect block and the
/// indirect block doesn't exist yet, `alloc` controls whether one is
/// allocated on the spot.
///
/// Returns `(indirect_block_no, index_within_block)` where
/// `indirect_block_no == 0` means the pointer is `file.direct[index]`
/// itself rather than a slot inside a separate indirect block.
fn block_walk<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &mut FileRecord,
    file_bno: u32,
    alloc: bool,
) -> Result<(u32, usize), Error> {
    if (file_bno as usize) < NDIRECT {
        return Ok((0, file_bno as usize));
    }
    if (file_bno as usize) >= NDIRECT + NINDIRECT {
        return Err(Error::Invalid);
    }
    if file.indirect == 0 {
        if !alloc {
            return Err(Error::NotFound);
        }
        let nblocks = cache.nblocks();
        let b = bitmap::alloc(cache, nblocks)?;
        let page = cache.get(b).map_err(|_| Error::Invalid)?;
        page.with_bytes_mut(|buf| buf.fill(0));
        cache.mark_dirty(b);
        file.indirect = b;
    }
    Ok((file.indirect, file_bno as usize - NDIRECT))
}

fn read_ptr<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    indirect: u32,
    idx: usize,
    file: &FileRecord,
) -> Result<u32, Error> {
    if indirect == 0 {
        Ok(file.direct[idx])
    } else {
        let page = cache.get(indirect).map_err(|_| Error::Invalid)?;
        Ok(page.with_bytes(|buf| u32::from_le_bytes(buf[idx * 4..idx * 4 + 4].try_into().unwrap())))
    }
}

fn write_ptr<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    indirect: u32,
    idx: usize,
    file: &mut FileRecord,
    value: u32,
) -> Result<(), Error> {
    if indirect == 0 {
        file.direct[idx] = value;
    } else {
        let page = cache.get(indirect).map_err(|_| Error::Invalid)?;
        page.with_bytes_mut(|buf| buf[idx * 4..idx * 4 + 4].copy_from_slice(&value.to_le_bytes()));
        cache.mark_dirty(indirect);
    }
    Ok(())
}

/// Look up the block number backing `file`'s `file_bno`-th block without
/// allocating anything. Returns `0` for a hole (no indirect block, or an
/// unallocated slot) -- the caller treats that range as all-zero bytes.
pub fn lookup_block<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &FileRecord,
    file_bno: u32,
) -> Result<u32, Error> {
    if (file_bno as usize) >= NDIRECT + NINDIRECT {
        return Err(Error::Invalid);
    }
    if (file_bno as usize) < NDIRECT {
        return Ok(file.direct[file_bno as usize]);
    }
    if file.indirect == 0 {
        return Ok(0);
    }
    read_ptr(cache, file.indirect, file_bno as usize - NDIRECT, file)
}

/// Get the block number backing `file`'s `file_bno`-th block, allocating a
/// fresh data block if the slot was a hole.
pub fn get_block<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &mut FileRecord,
    file_bno: u32,
) -> Result<u32, Error> {
    let (indirect, idx) = block_walk(cache, file, file_bno, true)?;
    let mut b = read_ptr(cache, indirect, idx, file)?;
    if b == 0 {
        let nblocks = cache.nblocks();
        b = bitmap::alloc(cache, nblocks)?;
        let page = cache.get(b).map_err(|_| Error::Invalid)?;
        page.with_bytes_mut(|buf| buf.fill(0));
        cache.mark_dirty(b);
        write_ptr(cache, indirect, idx, file, b)?;
    }
    Ok(b)
}

/// Free the block backing `file`'s `file_bno`-th block, if any, and clear
/// the slot. Does not allocate an indirect block that doesn't yet exist.
pub fn free_block<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &mut FileRecord,
    file_bno: u32,
) -> Result<(), Error> {
    let (indirect, idx) = match block_walk(cache, file, file_bno, false) {
        Ok(v) => v,
        Err(Error::NotFound) => return Ok(()),
        Err(e) => return Err(e),
    };
    let b = read_ptr(cache, indirect, idx, file)?;
    if b != 0 {
        bitmap::free(cache, b)?;
        write_ptr(cache, indirect, idx, file, 0)?;
    }
    Ok(())
}

/// Free every block past `new_size`, and the indirect block itself if it
/// is no longer needed. Does not update `file.size`.
pub fn truncate_blocks<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &mut FileRecord,
    new_size: u32,
) -> Result<(), Error> {
    let old_nblocks = ceil_div(file.size, BLKSIZE as u32);
    let new_nblocks = ceil_div(new_size, BLKSIZE as u32);
    for bno in new_nblocks..old_nblocks {
        free_block(cache, file, bno)?;
    }
    if new_nblocks as usize <= NDIRECT && file.indirect != 0 {
        bitmap::free(cache, file.indirect)?;
        file.indirect = 0;
    }
    Ok(())
}

/// Resize `file` to `new_size`, freeing trailing blocks if shrinking.
pub fn set_size<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &mut FileRecord,
    new_size: u32,
) -> Result<(), Error> {
    if new_size < file.size {
        truncate_blocks(cache, file, new_size)?;
    }
    file.size = new_size;
    Ok(())
}

/// Flush `file`'s data blocks in `[offset, offset+length)` (or the whole
/// file when `length == 0`) plus its indirect block, forcing a write-back
/// regardless of the dirty bit when `force` is set.
///
/// Does not flush the file record itself -- callers that changed metadata
/// must flush the directory block holding the record separately.
pub fn flush<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    file: &FileRecord,
    offset: u32,
    length: u32,
    force: bool,
) -> Result<(), Error> {
    if file.indirect != 0 {
        cache.flush(file.indirect, force).map_err(|_| Error::Invalid)?;
    }
    let (min, max) = if length == 0 {
        (0, ceil_div(file.size, BLKSIZE as u32))
    } else {
        (offset / BLKSIZE as u32, ceil_div(offset + length, BLKSIZE as u32))
    };
    for bno in min..max {
        let (indirect, idx) = match block_walk(cache, &mut file.clone(), bno, false) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let b = read_ptr(cache, indirect, idx, file)?;
        if b != 0 {
            cache.flush(b, force).map_err(|_| Error::Invalid)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_cache::BufferCache;
    use kstub::disk::SECTOR_SIZE;
    use kstub::{MemDisk, MemPageTable, Va};

    fn fixture(nblocks: u32) -> BufferCache<MemPageTable, MemDisk> {
        let disk = MemDisk::new(nblocks as u64 * (BLKSIZE as u64 / SECTOR_SIZE as u64));
        let mut bc = BufferCache::new(MemPageTable::new(), disk, Va::new(0x3000_0000), nblocks);
        bitmap::format(&mut bc, nblocks).unwrap();
        bc
    }

    #[test]
    fn direct_block_allocation() {
        let mut bc = fixture(256);
        let mut file = FileRecord::empty_slot();
        file.name = "f".into();
        let b0 = get_block(&mut bc, &mut file, 0).unwrap();
        assert_ne!(b0, 0);
        assert_eq!(file.direct[0], b0);
    }

    #[test]
    fn indirect_growth_allocates_indirect_block() {
        let mut bc = fixture(4096);
        let mut file = FileRecord::empty_slot();
        let bno = (NDIRECT + 2) as u32;
        let b = get_block(&mut bc, &mut file, bno).unwrap();
        assert_ne!(b, 0);
        assert_ne!(file.indirect, 0);
        let got = read_ptr(&mut bc, file.indirect, 2, &file).unwrap();
        assert_eq!(got, b);
    }

    #[test]
    fn truncate_to_zero_frees_indirect() {
        let mut bc = fixture(4096);
        let mut file = FileRecord::empty_slot();
        file.size = ((NDIRECT as u32 + 2) * BLKSIZE as u32) + 1;
        get_block(&mut bc, &mut file, (NDIRECT + 2) as u32).unwrap();
        assert_ne!(file.indirect, 0);
        set_size(&mut bc, &mut file, 0).unwrap();
        assert_eq!(file.indirect, 0);
        assert_eq!(file.direct, [0u32; NDIRECT]);
    }
}
