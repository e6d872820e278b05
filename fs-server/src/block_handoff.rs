//! Negotiates a `BlockRequest`'s permission grant against a just-resolved
//! open file, grounded directly on `serve_block_req`.

use crate::open_file::Entry;
use fs_core::{file_layout, FileSystem};
use fs_proto::{MmapFlags, Status, BLKSIZE};
use kstub::{BlockDisk, Page, PageTable};

/// Resolve a `BlockRequest` against `entry`, returning the page to hand
/// the client (out-of-band, over IPC) and the permission actually
/// granted.
///
/// Mode checks: a write-only open has no read access at all, so it can
/// never hand out a block; a read-only open may not hand one out with
/// `PROT_WRITE`. The write-bit test is `contains(PROT_WRITE)`, not an
/// equality test against `1` -- the latter would only ever match a
/// request whose *entire* value was `1`, silently treating any other
/// multi-bit permission as read-only.
pub fn serve_block_req<PT: PageTable, BD: BlockDisk>(
    fs: &mut FileSystem<PT, BD>,
    entry: &mut Entry,
    file_offset: u32,
    req_perm: MmapFlags,
) -> Result<(Page, MmapFlags), Status> {
    let wants_write = req_perm.contains(MmapFlags::PROT_WRITE);
    if !entry.mode.readable() || (wants_write && !entry.mode.writable()) {
        return Err(Status::ModeErr);
    }
    if !req_perm.is_valid() {
        return Err(Status::Invalid);
    }
    if file_offset >= entry.file.size {
        return Err(Status::Invalid);
    }

    let bno = file_offset / BLKSIZE as u32;
    let b = file_layout::get_block(fs.cache_mut(), &mut entry.file, bno).map_err(Status::from)?;
    let page = fs.cache_mut().get(b).map_err(|_| Status::NoDisk)?;

    // A private mapping must never let a write through this server's own
    // view bypass the client's copy-on-write fault, so the server's
    // mapping is downgraded the same way the client's will be.
    let mut granted = req_perm;
    if req_perm.contains(MmapFlags::MAP_PRIVATE) {
        fs.cache_mut().remap_cow_read_only(b).map_err(|_| Status::NoMem)?;
        if wants_write {
            granted.remove(MmapFlags::PROT_WRITE);
        } else {
            granted.remove(MmapFlags::MAP_PRIVATE);
        }
    }
    Ok((page, granted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_proto::{FileType, OpenMode, BLKSIZE};
    use kstub::disk::SECTOR_SIZE;
    use kstub::{MemDisk, MemPageTable, Va};

    fn fixture() -> FileSystem<MemPageTable, MemDisk> {
        let nblocks = 256u32;
        let disk = MemDisk::new(nblocks as u64 * (BLKSIZE as u64 / SECTOR_SIZE as u64));
        FileSystem::format(MemPageTable::new(), disk, Va::new(0x6000_0000), nblocks).unwrap()
    }

    fn entry_for(fs: &mut FileSystem<MemPageTable, MemDisk>, mode: OpenMode, size: u32) -> Entry {
        let (mut file, slot) = fs.create("/f", FileType::Regular).unwrap();
        fs.set_size(&mut file, slot, size).unwrap();
        Entry {
            desc: Page::new(),
            fileid: 0,
            file,
            loc: slot,
            mode,
            offset: 0,
        }
    }

    #[test]
    fn write_only_open_cannot_request_any_block() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_WRONLY, BLKSIZE as u32);
        let err = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_SHARED).unwrap_err();
        assert_eq!(err, Status::ModeErr);
    }

    #[test]
    fn read_only_open_cannot_request_write() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDONLY, BLKSIZE as u32);
        let err = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_SHARED | MmapFlags::PROT_WRITE).unwrap_err();
        assert_eq!(err, Status::ModeErr);
    }

    #[test]
    fn shared_and_private_together_is_invalid() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDWR, BLKSIZE as u32);
        let err = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_SHARED | MmapFlags::MAP_PRIVATE).unwrap_err();
        assert_eq!(err, Status::Invalid);
    }

    #[test]
    fn offset_past_end_is_invalid() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDWR, BLKSIZE as u32);
        let err = serve_block_req(&mut fs, &mut entry, BLKSIZE as u32, MmapFlags::MAP_SHARED).unwrap_err();
        assert_eq!(err, Status::Invalid);
    }

    #[test]
    fn shared_write_grant_keeps_write_bit() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDWR, BLKSIZE as u32);
        let (_page, granted) = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_SHARED | MmapFlags::PROT_WRITE).unwrap();
        assert!(granted.contains(MmapFlags::PROT_WRITE));
        assert!(granted.contains(MmapFlags::MAP_SHARED));
    }

    #[test]
    fn private_write_request_strips_write_and_downgrades_servers_own_mapping() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDWR, BLKSIZE as u32);
        let (_page, granted) = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_PRIVATE | MmapFlags::PROT_WRITE).unwrap();
        assert!(!granted.contains(MmapFlags::PROT_WRITE));
        assert!(granted.contains(MmapFlags::MAP_PRIVATE));

        let b = file_layout::lookup_block(fs.cache_mut(), &entry.file, 0).unwrap();
        let va = fs.cache_mut().addr_of(b);
        let (_, perm) = fs.cache_mut().page_table().lookup(va).unwrap();
        assert!(!perm.contains(kstub::Permission::WRITE));
        assert!(perm.contains(kstub::Permission::COW));
    }

    #[test]
    fn private_read_only_request_drops_private_bit_entirely() {
        let mut fs = fixture();
        let mut entry = entry_for(&mut fs, OpenMode::O_RDONLY, BLKSIZE as u32);
        let (_page, granted) = serve_block_req(&mut fs, &mut entry, 0, MmapFlags::MAP_PRIVATE).unwrap();
        assert!(!granted.contains(MmapFlags::MAP_PRIVATE));
        assert!(!granted.contains(MmapFlags::PROT_WRITE));
    }
}
