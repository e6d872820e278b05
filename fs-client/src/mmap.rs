//! The client-side mmap manager: region bookkeeping plus the page-fault
//! handlers that turn a fault inside a mapped region into a
//! `BlockRequest` round trip with the server.
//!
//! Grounded on `serve_block_req` (`fs-server`'s `block_handoff` module)
//! from the requesting side: the client never touches the disk directly,
//! only ever negotiates a page mapping over a channel.

use fs_proto::{FileId, MmapFlags, Request, Response, Status};
use kstub::{Channel, FaultKind, Message, Page, PageTable, Permission, Va, PAGE_SIZE};

/// Upper bound on live regions one address space tracks -- a page-sized
/// table of fixed-size records.
pub const MAX_REGIONS: usize = 200;

#[derive(Clone, Copy, Debug)]
struct Region {
    file: FileId,
    file_offset: u32,
    perm: MmapFlags,
    start: Va,
    end: Va,
}

impl Region {
    fn contains(&self, va: Va) -> bool {
        self.start <= va && va < self.end
    }
}

/// One process's view of its mmap'd file regions, and the page table they
/// are mapped into.
pub struct MmapManager<PT> {
    page_table: PT,
    regions: Vec<Option<Region>>,
    arena_start: Va,
}

impl<PT: PageTable> MmapManager<PT> {
    /// `arena_start` is the lowest address new, unhinted mappings are
    /// placed above (conventionally just past the program's text/data).
    pub fn new(page_table: PT, arena_start: Va) -> Self {
        let mut regions = Vec::with_capacity(MAX_REGIONS);
        regions.resize_with(MAX_REGIONS, || None);
        MmapManager { page_table, regions, arena_start }
    }

    pub fn page_table(&self) -> &PT {
        &self.page_table
    }

    pub fn page_table_mut(&mut self) -> &mut PT {
        &mut self.page_table
    }

    fn region_end(&self) -> Va {
        self.regions.iter().flatten().map(|r| r.end).max().unwrap_or(self.arena_start)
    }

    fn find_region(&self, va: Va) -> Option<Region> {
        self.regions.iter().flatten().find(|r| r.contains(va)).copied()
    }

    /// Reserve `len` bytes of address space backed by `file` starting at
    /// `file_offset`, at `addr` if given (must be page-aligned) or just
    /// past every existing region otherwise.
    ///
    /// The lowest free region record is used and filled immediately --
    /// there is exactly one candidate, so the search can't run past it
    /// the way a hand-rolled loop missing its `break` could.
    pub fn mmap(&mut self, addr: Option<Va>, len: usize, perm: MmapFlags, file: FileId, file_offset: u32) -> Result<Va, Status> {
        if file_offset as usize % PAGE_SIZE != 0 {
            return Err(Status::Invalid);
        }
        if !perm.is_valid() {
            return Err(Status::Invalid);
        }
        let npages = len.div_ceil(PAGE_SIZE).max(1);
        let start = match addr {
            Some(va) if va.is_aligned() => va,
            Some(_) => return Err(Status::Invalid),
            None => self.region_end(),
        };
        let end = start.add_pages(npages);

        let slot = self.regions.iter().position(|r| r.is_none()).ok_or(Status::MaxOpen)?;
        self.regions[slot] = Some(Region { file, file_offset, perm, start, end });
        log::debug!("mmap {start:?}..{end:?} file {file:?} offset {file_offset}");
        Ok(start)
    }

    fn unmap_pages(&mut self, start: Va, end: Va) {
        let mut va = start;
        while va < end {
            if self.page_table.is_mapped(va) {
                self.page_table.unmap(va);
            }
            va = va.add_pages(1);
        }
    }

    /// Unmap `[addr, addr+len)`, splitting, shrinking, or dropping every
    /// region it overlaps.
    pub fn munmap(&mut self, addr: Va, len: usize) -> Result<(), Status> {
        if !addr.is_aligned() {
            return Err(Status::Invalid);
        }
        let npages = len.div_ceil(PAGE_SIZE).max(1);
        let range_start = addr;
        let range_end = addr.add_pages(npages);

        for slot in 0..self.regions.len() {
            let region = match self.regions[slot] {
                Some(r) => r,
                None => continue,
            };
            if region.end <= range_start || region.start >= range_end {
                continue;
            }
            let overlap_start = region.start.max(range_start);
            let overlap_end = region.end.min(range_end);
            self.unmap_pages(overlap_start, overlap_end);

            let contained = range_start <= region.start && region.end <= range_end;
            let splits_middle = region.start < range_start && range_end < region.end;

            if contained {
                self.regions[slot] = None;
            } else if splits_middle {
                let free = self.regions.iter().position(|r| r.is_none()).ok_or(Status::NoMem)?;
                let right_offset = region.file_offset + (range_end - region.start) as u32;
                self.regions[slot] = Some(Region { end: range_start, ..region });
                self.regions[free] = Some(Region {
                    start: range_end,
                    file_offset: right_offset,
                    ..region
                });
            } else if range_start <= region.start {
                let trimmed_offset = region.file_offset + (range_end - region.start) as u32;
                self.regions[slot] = Some(Region {
                    start: range_end,
                    file_offset: trimmed_offset,
                    ..region
                });
            } else {
                self.regions[slot] = Some(Region { end: range_start, ..region });
            }
        }
        Ok(())
    }

    /// Ask the server for the page backing `file_offset` under `req_perm`,
    /// returning it together with the permission the server actually
    /// granted -- `serve_block_req` may downgrade `req_perm` (stripping
    /// `PROT_WRITE` or `MAP_PRIVATE` to enforce COW), and that negotiated
    /// permission, not the request, is what gets mapped locally.
    fn request_block<CH: Channel>(&self, out: &CH, inn: &CH, file: FileId, file_offset: u32, req_perm: MmapFlags) -> Result<(Page, Permission), Status> {
        let req = Request::BlockRequest { file, file_offset, perm: req_perm };
        out.send(Message { value: req.to_bytes(), page: None }).map_err(|_| Status::IpcNotRecv)?;
        let reply = inn.recv().map_err(|_| Status::IpcNotRecv)?;
        match Response::from_bytes(&reply.value) {
            Response::Block { .. } => reply.page.ok_or(Status::Invalid),
            Response::Err(s) => Err(s),
            _ => Err(Status::Invalid),
        }
    }

    fn shared_fault<CH: Channel>(&mut self, out: &CH, inn: &CH, page_va: Va, region: Region) -> Result<(), Status> {
        let file_offset = region.file_offset + (page_va - region.start) as u32;
        let (page, perm) = self.request_block(out, inn, region.file, file_offset, region.perm)?;
        self.page_table.map(page_va, page, perm).map_err(|_| Status::NoMem)
    }

    fn private_fault<CH: Channel>(&mut self, out: &CH, inn: &CH, page_va: Va, region: Region, writing: bool) -> Result<(), Status> {
        if !self.page_table.is_mapped(page_va) {
            let file_offset = region.file_offset + (page_va - region.start) as u32;
            let (page, perm) = self.request_block(out, inn, region.file, file_offset, MmapFlags::MAP_PRIVATE)?;
            self.page_table.map(page_va, page, perm).map_err(|_| Status::NoMem)?;
        }
        if writing {
            let (cow_page, _) = self.page_table.lookup(page_va).expect("just-mapped page missing");
            let fresh = cow_page.deep_copy();
            self.page_table
                .map(page_va, fresh, Permission::READ | Permission::WRITE | Permission::USER)
                .map_err(|_| Status::NoMem)?;
        }
        Ok(())
    }

    /// Resolve a page fault at `va` inside a mapped region by negotiating
    /// a block mapping with the server over `(out, inn)`.
    ///
    /// A write fault against a region that isn't writable is a genuine
    /// programmer error (the process touched memory it never asked to
    /// write) and panics; every other path either succeeds or returns a
    /// [`Status`] the caller can report back to the faulting process.
    pub fn handle_fault<CH: Channel>(&mut self, out: &CH, inn: &CH, va: Va, kind: FaultKind) -> Result<(), Status> {
        let region = self.find_region(va).ok_or(Status::Invalid)?;
        let writing = matches!(kind, FaultKind::Write { .. });
        if writing && !region.perm.contains(MmapFlags::PROT_WRITE) {
            panic!("write fault in a non-writable mmap region");
        }
        let page_va = va.page_floor();
        if region.perm.is_shared() {
            self.shared_fault(out, inn, page_va, region)
        } else {
            self.private_fault(out, inn, page_va, region, writing)
        }
    }
}
