//! The open-file table: `MAX_OPEN` slots, each guarded by the reference
//! count of a descriptor page shared with whoever holds the file open.
//!
//! A slot is free when its descriptor page's refcount is 0 or 1 (nobody,
//! or only this table, holds it); it is live once a second holder brings
//! the count to 2 or more. On every reuse the file-id is bumped by
//! `MAX_OPEN`, so a stale id from a since-closed file never aliases
//! whatever now occupies its slot.

use fs_core::Slot as FsSlot;
use fs_proto::{FileId, FileRecord, OpenMode, Status, MAX_OPEN};
use kstub::Page;

pub struct Entry {
    pub desc: Page,
    pub fileid: u32,
    pub file: FileRecord,
    pub loc: FsSlot,
    pub mode: OpenMode,
    pub offset: u32,
}

#[derive(Default)]
pub struct OpenFileTable {
    slots: Vec<Option<Entry>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_OPEN);
        slots.resize_with(MAX_OPEN, || None);
        OpenFileTable { slots }
    }

    fn is_reclaimable(entry: &Entry) -> bool {
        entry.desc.refcount() <= 1
    }

    /// Allocate a slot for a just-resolved file, returning its id and the
    /// descriptor page to hand the caller (who becomes the second holder
    /// once they clone it).
    pub fn alloc(&mut self, file: FileRecord, loc: FsSlot, mode: OpenMode) -> Result<(FileId, Page), Status> {
        for idx in 0..MAX_OPEN {
            let reclaimable = match &self.slots[idx] {
                None => true,
                Some(e) => Self::is_reclaimable(e),
            };
            if !reclaimable {
                continue;
            }
            let fileid = match &self.slots[idx] {
                None => idx as u32,
                Some(e) => e.fileid + MAX_OPEN as u32,
            };
            let desc = Page::new();
            self.slots[idx] = Some(Entry {
                desc: desc.clone(),
                fileid,
                file,
                loc,
                mode,
                offset: 0,
            });
            log::debug!("opened file id {fileid:#x} in slot {idx}");
            return Ok((FileId(fileid), desc));
        }
        Err(Status::MaxOpen)
    }

    fn entry(&self, file: FileId) -> Result<&Entry, Status> {
        let idx = (file.0 as usize) % MAX_OPEN;
        match &self.slots[idx] {
            Some(e) if e.fileid == file.0 && !Self::is_reclaimable(e) => Ok(e),
            _ => Err(Status::Invalid),
        }
    }

    fn entry_mut(&mut self, file: FileId) -> Result<&mut Entry, Status> {
        let idx = (file.0 as usize) % MAX_OPEN;
        match &mut self.slots[idx] {
            Some(e) if e.fileid == file.0 && e.desc.refcount() > 1 => Ok(e),
            _ => Err(Status::Invalid),
        }
    }

    pub fn get(&self, file: FileId) -> Result<&Entry, Status> {
        self.entry(file)
    }

    pub fn get_mut(&mut self, file: FileId) -> Result<&mut Entry, Status> {
        self.entry_mut(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_proto::FileType;

    fn rec() -> FileRecord {
        let mut r = FileRecord::empty_slot();
        r.name = "f".into();
        r.ty = FileType::Regular;
        r
    }

    #[test]
    fn stale_id_is_invalid_after_client_drops_descriptor() {
        let mut table = OpenFileTable::new();
        let (id1, desc1) = table.alloc(rec(), FsSlot::Root, OpenMode::O_RDONLY).unwrap();
        assert!(table.get(id1).is_ok());
        drop(desc1);
        // refcount back to 1 (table only): slot is reclaimable, not live.
        assert_eq!(table.get(id1).unwrap_err(), Status::Invalid);
        let (id2, _desc2) = table.alloc(rec(), FsSlot::Root, OpenMode::O_RDONLY).unwrap();
        assert_eq!(id2.0, id1.0 + MAX_OPEN as u32);
        assert_eq!(table.get(id1).unwrap_err(), Status::Invalid);
        assert!(table.get(id2).is_ok());
    }

    #[test]
    fn exhaustion_reports_max_open() {
        let mut table = OpenFileTable::new();
        let mut kept = Vec::new();
        for _ in 0..MAX_OPEN {
            let (_id, desc) = table.alloc(rec(), FsSlot::Root, OpenMode::O_RDONLY).unwrap();
            kept.push(desc);
        }
        assert_eq!(table.alloc(rec(), FsSlot::Root, OpenMode::O_RDONLY).unwrap_err(), Status::MaxOpen);
    }
}
