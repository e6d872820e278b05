//! Block-granularity façade over a sector-addressed block device.
//!
//! `BufferCache` is the only caller -- no other component talks to the
//! disk directly.

use fs_proto::BLKSIZE;
use kstub::disk::SECTOR_SIZE;
use kstub::{BlockDisk, KernelError};

const SECTORS_PER_BLOCK: usize = BLKSIZE / SECTOR_SIZE;

/// Read block `b`'s `BLKSIZE` bytes from `disk` into `buf`.
pub fn read_block<BD: BlockDisk>(disk: &BD, b: u32, buf: &mut [u8]) -> Result<(), KernelError> {
    debug_assert_eq!(buf.len(), BLKSIZE);
    for i in 0..SECTORS_PER_BLOCK {
        let mut sector = [0u8; SECTOR_SIZE];
        disk.read_sector(b as u64 * SECTORS_PER_BLOCK as u64 + i as u64, &mut sector)?;
        buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&sector);
    }
    Ok(())
}

/// Write `buf`'s `BLKSIZE` bytes to block `b` on `disk`.
pub fn write_block<BD: BlockDisk>(disk: &mut BD, b: u32, buf: &[u8]) -> Result<(), KernelError> {
    debug_assert_eq!(buf.len(), BLKSIZE);
    for i in 0..SECTORS_PER_BLOCK {
        let sector: [u8; SECTOR_SIZE] = buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].try_into().unwrap();
        disk.write_sector(b as u64 * SECTORS_PER_BLOCK as u64 + i as u64, &sector)?;
    }
    Ok(())
}
