//! The server's request dispatcher: wires the file system, the open-file
//! table, and block handoff into a single `handle` entry point.

use crate::block_handoff;
use crate::open_file::OpenFileTable;
use fs_core::FileSystem;
use fs_proto::{FileId, FileType, MmapFlags, OpenMode, Request, Response, Stat, Status, BLKSIZE};
use kstub::{BlockDisk, Channel, KernelError, Message, Page, PageTable, Permission};

pub struct Server<PT, BD> {
    fs: FileSystem<PT, BD>,
    open: OpenFileTable,
}

impl<PT: PageTable, BD: BlockDisk> Server<PT, BD> {
    pub fn new(fs: FileSystem<PT, BD>) -> Self {
        Server { fs, open: OpenFileTable::new() }
    }

    pub fn fs(&self) -> &FileSystem<PT, BD> {
        &self.fs
    }

    /// Handle one request, returning the reply and, for `Open` and
    /// `BlockRequest`, the page that travels alongside it over IPC.
    pub fn handle(&mut self, req: Request) -> (Response, Option<Page>) {
        match req {
            Request::Open { path, mode } => match self.try_open(&path, mode) {
                Ok((file, desc)) => (Response::Opened { file }, Some(desc)),
                Err(s) => (Response::Err(s), None),
            },
            Request::BlockRequest { file, file_offset, perm } => match self.try_block_request(file, file_offset, perm) {
                Ok((page, granted)) => (Response::Block { granted }, Some(page)),
                Err(s) => (Response::Err(s), None),
            },
            Request::Read { file, n } => match self.try_read(file, n) {
                Ok(buf) => (Response::Read { buf }, None),
                Err(s) => (Response::Err(s), None),
            },
            Request::Write { file, buf } => match self.try_write(file, &buf) {
                Ok(n) => (Response::Written { n }, None),
                Err(s) => (Response::Err(s), None),
            },
            Request::Stat { file } => match self.try_stat(file) {
                Ok(stat) => (Response::Stat(stat), None),
                Err(s) => (Response::Err(s), None),
            },
            Request::Flush { file } => match self.try_flush(file) {
                Ok(()) => (Response::Ack, None),
                Err(s) => (Response::Err(s), None),
            },
            Request::Remove { path } => match self.fs.remove(&path) {
                Ok(()) => (Response::Ack, None),
                Err(e) => (Response::Err(e.into()), None),
            },
            Request::Sync => match self.fs.sync() {
                Ok(()) => (Response::Ack, None),
                Err(e) => (Response::Err(e.into()), None),
            },
            Request::SetSize { file, size } => match self.try_set_size(file, size) {
                Ok(()) => (Response::Ack, None),
                Err(s) => (Response::Err(s), None),
            },
        }
    }

    /// Drive one iteration of the dispatch loop: receive a request on
    /// `inbound`, handle it, and send the reply (plus page, for `Open`
    /// and `BlockRequest`) on `outbound`.
    ///
    /// A missing request page is the transport fault the server must log
    /// and recover from rather than treat as fatal -- matching a client
    /// that never showed up to send its side of the IPC.
    pub fn serve_one<CH: Channel>(&mut self, inbound: &CH, outbound: &CH) -> Result<(), KernelError> {
        let msg = match inbound.recv() {
            Ok(m) => m,
            Err(KernelError::IpcNotRecv) => {
                log::warn!("serve_one: no request available");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let req = Request::from_bytes(&msg.value);
        log::debug!("dispatch {req:?}");
        let (resp, page) = self.handle(req);
        if !resp.status().is_ok() {
            log::warn!("request failed: {}", resp.status());
        }
        let perm = response_permission(&resp);
        outbound.send(Message { value: resp.to_bytes(), page: page.map(|p| (p, perm)) })
    }

    fn try_open(&mut self, path: &str, mode: OpenMode) -> Result<(FileId, Page), Status> {
        let creating = mode.contains(OpenMode::O_CREAT);
        let (file, slot) = match self.fs.resolve(path) {
            Ok(found) => {
                if mode.contains(OpenMode::O_EXCL) {
                    return Err(Status::FileExists);
                }
                found
            }
            Err(fs_core::Error::NotFound) if creating => {
                let ty = if mode.contains(OpenMode::O_MKDIR) { FileType::Directory } else { FileType::Regular };
                self.fs.create(path, ty)?
            }
            Err(e) => return Err(e.into()),
        };
        let mut file = file;
        if mode.contains(OpenMode::O_TRUNC) && file.ty == FileType::Regular {
            self.fs.set_size(&mut file, slot, 0)?;
        }
        self.open.alloc(file, slot, mode)
    }

    fn try_block_request(&mut self, file: FileId, file_offset: u32, perm: MmapFlags) -> Result<(Page, MmapFlags), Status> {
        let entry = self.open.get_mut(file)?;
        block_handoff::serve_block_req(&mut self.fs, entry, file_offset, perm)
    }

    fn try_read(&mut self, file: FileId, n: u32) -> Result<Vec<u8>, Status> {
        let entry = self.open.get_mut(file)?;
        if !entry.mode.readable() {
            return Err(Status::ModeErr);
        }
        let mut buf = vec![0u8; (n as usize).min(BLKSIZE)];
        let nread = self.fs.read(&entry.file, entry.offset, &mut buf)?;
        buf.truncate(nread as usize);
        entry.offset += nread;
        Ok(buf)
    }

    fn try_write(&mut self, file: FileId, buf: &[u8]) -> Result<u32, Status> {
        let entry = self.open.get_mut(file)?;
        if !entry.mode.writable() {
            return Err(Status::ModeErr);
        }
        let (offset, loc) = (entry.offset, entry.loc);
        let n = self.fs.write(&mut entry.file, loc, offset, buf)?;
        entry.offset += n;
        Ok(n)
    }

    fn try_stat(&mut self, file: FileId) -> Result<Stat, Status> {
        let entry = self.open.get(file)?;
        Ok(Stat {
            name: entry.file.name.clone(),
            size: entry.file.size,
            is_dir: entry.file.ty == FileType::Directory,
        })
    }

    fn try_flush(&mut self, file: FileId) -> Result<(), Status> {
        let entry = self.open.get(file)?;
        let (f, loc) = (entry.file.clone(), entry.loc);
        Ok(self.fs.flush(&f, loc, 0, 0, true)?)
    }

    fn try_set_size(&mut self, file: FileId, size: u32) -> Result<(), Status> {
        let entry = self.open.get_mut(file)?;
        let loc = entry.loc;
        Ok(self.fs.set_size(&mut entry.file, loc, size)?)
    }
}

/// The kernel permission to hand out alongside a response's page: the
/// open-file descriptor (shared liveness token) for `Opened`, or the
/// negotiated mapping for `Block`.
fn response_permission(resp: &Response) -> Permission {
    match resp {
        Response::Opened { .. } => Permission::READ | Permission::WRITE | Permission::USER | Permission::SHARE,
        Response::Block { granted } => {
            let mut p = Permission::READ | Permission::USER;
            if granted.contains(MmapFlags::PROT_WRITE) {
                p |= Permission::WRITE;
            }
            if granted.contains(MmapFlags::MAP_SHARED) {
                p |= Permission::SHARE;
            }
            if granted.contains(MmapFlags::MAP_PRIVATE) {
                p |= Permission::COW;
            }
            p
        }
        _ => Permission::empty(),
    }
}
