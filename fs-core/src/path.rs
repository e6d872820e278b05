//! Path resolution and directory operations.
//!
//! A directory's contents are a sequence of fixed-size [`FileRecord`]
//! slots, one per [`RECORDS_PER_BLOCK`]-th of each of its data blocks. An
//! empty name marks a hole (a free slot); lookup is first-fit by exact
//! name match.
//!
//! Every [`FileRecord`] physically lives somewhere: the super block's
//! embedded root, or a slot inside some ancestor directory's data block.
//! [`Slot`] names that location so updates to a directory's own metadata
//! (e.g. growing it by a block) land in the right place.

use crate::buffer_cache::BufferCache;
use crate::error::Error;
use crate::file_layout;
use fs_proto::{FileRecord, FileType, Superblock, BLKSIZE, FILE_STRUCT_SIZE, MAXNAMELEN};
use kstub::{BlockDisk, PageTable};

const RECORDS_PER_BLOCK: usize = BLKSIZE / FILE_STRUCT_SIZE;

/// Where a [`FileRecord`] physically lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The super block's embedded root directory.
    Root,
    /// Record `index` (0-based) within directory data block `block`.
    InBlock { block: u32, index: usize },
}

fn read_record<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, block: u32, index: usize) -> Result<FileRecord, Error> {
    let page = cache.get(block).map_err(|_| Error::Invalid)?;
    let bytes: [u8; FILE_STRUCT_SIZE] = page.with_bytes(|buf| buf[index * FILE_STRUCT_SIZE..(index + 1) * FILE_STRUCT_SIZE].try_into().unwrap());
    Ok(FileRecord::from_bytes(&bytes))
}

fn write_record<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, block: u32, index: usize, rec: &FileRecord) -> Result<(), Error> {
    let page = cache.get(block).map_err(|_| Error::Invalid)?;
    let bytes = rec.to_bytes();
    page.with_bytes_mut(|buf| buf[index * FILE_STRUCT_SIZE..(index + 1) * FILE_STRUCT_SIZE].copy_from_slice(&bytes));
    cache.mark_dirty(block);
    Ok(())
}

/// Fetch the [`FileRecord`] stored at `slot`.
pub fn read_slot<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, sb: &Superblock, slot: Slot) -> Result<FileRecord, Error> {
    match slot {
        Slot::Root => Ok(sb.root.clone()),
        Slot::InBlock { block, index } => read_record(cache, block, index),
    }
}

/// Persist `rec` to `slot`.
pub fn write_slot<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, sb: &mut Superblock, slot: Slot, rec: &FileRecord) -> Result<(), Error> {
    match slot {
        Slot::Root => {
            sb.root = rec.clone();
            Ok(())
        }
        Slot::InBlock { block, index } => write_record(cache, block, index, rec),
    }
}

/// Find `name` among `dir`'s existing slots.
pub fn dir_lookup_slot<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, dir: &FileRecord, name: &str) -> Result<Option<Slot>, Error> {
    let nblocks = dir.size / BLKSIZE as u32;
    for bno in 0..nblocks {
        let block = file_layout::get_block(cache, &mut dir.clone(), bno)?;
        for idx in 0..RECORDS_PER_BLOCK {
            let rec = read_record(cache, block, idx)?;
            if !rec.is_free() && rec.name == name {
                return Ok(Some(Slot::InBlock { block, index: idx }));
            }
        }
    }
    Ok(None)
}

/// Find a free slot in `dir`, extending it by one zeroed block if none of
/// its existing blocks have room.
fn dir_alloc_slot<PT: PageTable, BD: BlockDisk>(
    cache: &mut BufferCache<PT, BD>,
    sb: &mut Superblock,
    dir: &mut FileRecord,
    dir_slot: Slot,
) -> Result<Slot, Error> {
    let nblocks = dir.size / BLKSIZE as u32;
    for bno in 0..nblocks {
        let block = file_layout::get_block(cache, dir, bno)?;
        for idx in 0..RECORDS_PER_BLOCK {
            if read_record(cache, block, idx)?.is_free() {
                return Ok(Slot::InBlock { block, index: idx });
            }
        }
    }
    let block = file_layout::get_block(cache, dir, nblocks)?;
    dir.size += BLKSIZE as u32;
    write_slot(cache, sb, dir_slot, dir)?;
    Ok(Slot::InBlock { block, index: 0 })
}

/// Result of resolving a path: either the terminal file was found, or only
/// its parent was, meaning a caller wanting to create the file now has
/// everything it needs to do so.
pub enum WalkOutcome {
    Found { file: FileRecord, slot: Slot },
    MissingLastComponent { parent: FileRecord, parent_slot: Slot, name: String },
}

/// Resolve `path` against `sb`'s root, one `/`-separated component at a
/// time. Leading/repeated slashes are skipped; `"/"` resolves to the root.
pub fn walk_path<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, sb: &Superblock, path: &str) -> Result<WalkOutcome, Error> {
    let mut cur = sb.root.clone();
    let mut cur_slot = Slot::Root;
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(WalkOutcome::Found { file: cur, slot: cur_slot });
    }
    for (i, comp) in components.iter().enumerate() {
        if comp.len() >= MAXNAMELEN {
            return Err(Error::BadPath);
        }
        if !cur.is_dir() {
            return Err(Error::NotFound);
        }
        match dir_lookup_slot(cache, &cur, comp)? {
            Some(slot) => {
                let file = read_slot(cache, sb, slot)?;
                if i == components.len() - 1 {
                    return Ok(WalkOutcome::Found { file, slot });
                }
                cur = file;
                cur_slot = slot;
            }
            None => {
                if i == components.len() - 1 {
                    return Ok(WalkOutcome::MissingLastComponent {
                        parent: cur,
                        parent_slot: cur_slot,
                        name: comp.to_string(),
                    });
                }
                return Err(Error::NotFound);
            }
        }
    }
    unreachable!("non-empty component list always returns from the loop")
}

/// Create a new, empty file (or directory) at `path`, returning its slot.
pub fn create<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, sb: &mut Superblock, path: &str, ty: FileType) -> Result<Slot, Error> {
    match walk_path(cache, sb, path)? {
        WalkOutcome::Found { .. } => Err(Error::Exists),
        WalkOutcome::MissingLastComponent { mut parent, parent_slot, name } => {
            if name.len() >= MAXNAMELEN {
                return Err(Error::BadPath);
            }
            let slot = dir_alloc_slot(cache, sb, &mut parent, parent_slot)?;
            let mut rec = FileRecord::empty_slot();
            rec.name = name;
            rec.ty = ty;
            if ty == FileType::Directory {
                rec.size = 0;
            }
            write_slot(cache, sb, slot, &rec)?;
            if let Slot::InBlock { block, .. } = slot {
                cache.flush(block, false).map_err(|_| Error::Invalid)?;
            }
            Ok(slot)
        }
    }
}

/// Truncate the file at `path` to zero bytes and clear its directory slot.
pub fn remove<PT: PageTable, BD: BlockDisk>(cache: &mut BufferCache<PT, BD>, sb: &mut Superblock, path: &str) -> Result<(), Error> {
    match walk_path(cache, sb, path)? {
        WalkOutcome::Found { mut file, slot } => {
            file_layout::truncate_blocks(cache, &mut file, 0)?;
            file.size = 0;
            file.name.clear();
            write_slot(cache, sb, slot, &file)?;
            if let Slot::InBlock { block, .. } = slot {
                cache.flush(block, false).map_err(|_| Error::Invalid)?;
            }
            Ok(())
        }
        WalkOutcome::MissingLastComponent { .. } => Err(Error::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kstub::disk::SECTOR_SIZE;
    use kstub::{MemDisk, MemPageTable, Va};

    fn fixture(nblocks: u32) -> (BufferCache<MemPageTable, MemDisk>, Superblock) {
        let disk = MemDisk::new(nblocks as u64 * (BLKSIZE as u64 / SECTOR_SIZE as u64));
        let mut bc = BufferCache::new(MemPageTable::new(), disk, Va::new(0x4000_0000), nblocks);
        crate::bitmap::format(&mut bc, nblocks).unwrap();
        (bc, Superblock::new(nblocks))
    }

    #[test]
    fn create_then_lookup() {
        let (mut bc, mut sb) = fixture(256);
        create(&mut bc, &mut sb, "/a", FileType::Regular).unwrap();
        match walk_path(&mut bc, &sb, "/a").unwrap() {
            WalkOutcome::Found { file, .. } => assert_eq!(file.name, "a"),
            _ => panic!("expected to find /a"),
        }
    }

    #[test]
    fn create_twice_is_exists() {
        let (mut bc, mut sb) = fixture(256);
        create(&mut bc, &mut sb, "/a", FileType::Regular).unwrap();
        assert_eq!(create(&mut bc, &mut sb, "/a", FileType::Regular).unwrap_err(), Error::Exists);
    }

    #[test]
    fn remove_then_create_reuses_slot() {
        let (mut bc, mut sb) = fixture(256);
        create(&mut bc, &mut sb, "/a", FileType::Regular).unwrap();
        remove(&mut bc, &mut sb, "/a").unwrap();
        assert!(matches!(walk_path(&mut bc, &sb, "/a").unwrap(), WalkOutcome::MissingLastComponent { .. }));
        create(&mut bc, &mut sb, "/b", FileType::Regular).unwrap();
        match walk_path(&mut bc, &sb, "/b").unwrap() {
            WalkOutcome::Found { file, .. } => assert_eq!(file.name, "b"),
            _ => panic!("expected to find /b"),
        }
    }

    #[test]
    fn nested_directory_lookup() {
        let (mut bc, mut sb) = fixture(256);
        create(&mut bc, &mut sb, "/sub", FileType::Directory).unwrap();
        create(&mut bc, &mut sb, "/sub/leaf", FileType::Regular).unwrap();
        match walk_path(&mut bc, &sb, "/sub/leaf").unwrap() {
            WalkOutcome::Found { file, .. } => assert_eq!(file.name, "leaf"),
            _ => panic!("expected to find /sub/leaf"),
        }
    }

    #[test]
    fn directory_grows_by_whole_blocks() {
        let (mut bc, mut sb) = fixture(4096);
        for i in 0..(RECORDS_PER_BLOCK + 1) {
            create(&mut bc, &mut sb, &format!("/f{i}"), FileType::Regular).unwrap();
        }
        assert_eq!(sb.root.size, 2 * BLKSIZE as u32);
    }
}
