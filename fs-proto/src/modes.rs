//! Open modes and mmap flags, the client-facing request vocabulary.

bitflags::bitflags! {
    /// Flags accompanying an `Open` request.
    ///
    /// The low bits select the access mode; `O_RDONLY` is the all-zero
    /// value rather than a named bit, matching the historical Unix
    /// convention this protocol follows.
    pub struct OpenMode: u32 {
        const O_RDONLY = 0;
        const O_WRONLY = 1 << 0;
        const O_RDWR = 1 << 1;
        const O_CREAT = 1 << 2;
        const O_TRUNC = 1 << 3;
        const O_EXCL = 1 << 4;
        const O_MKDIR = 1 << 5;
    }
}

impl OpenMode {
    /// True if this mode permits reading.
    pub fn readable(&self) -> bool {
        !self.contains(OpenMode::O_WRONLY) || self.contains(OpenMode::O_RDWR)
    }

    /// True if this mode permits writing.
    pub fn writable(&self) -> bool {
        self.contains(OpenMode::O_WRONLY) || self.contains(OpenMode::O_RDWR)
    }
}

bitflags::bitflags! {
    /// `mmap` flags: sharing discipline and protection bits.
    pub struct MmapFlags: u32 {
        /// Writes through the mapping are visible to every mapper and are
        /// written back to the file.
        const MAP_SHARED = 1 << 0;
        /// Writes through the mapping are private, copy-on-write.
        const MAP_PRIVATE = 1 << 1;
        /// Mapping is writable.
        const PROT_WRITE = 1 << 2;
    }
}

impl MmapFlags {
    pub fn is_shared(&self) -> bool {
        self.contains(MmapFlags::MAP_SHARED)
    }

    /// Exactly one of `MAP_SHARED`/`MAP_PRIVATE` must be set.
    pub fn is_valid(&self) -> bool {
        self.contains(MmapFlags::MAP_SHARED) != self.contains(MmapFlags::MAP_PRIVATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdonly_is_readable_not_writable() {
        let m = OpenMode::O_RDONLY;
        assert!(m.readable());
        assert!(!m.writable());
    }

    #[test]
    fn rdwr_is_both() {
        let m = OpenMode::O_RDWR;
        assert!(m.readable());
        assert!(m.writable());
    }

    #[test]
    fn mmap_flags_require_exactly_one_sharing_mode() {
        assert!(!MmapFlags::empty().is_valid());
        assert!(MmapFlags::MAP_SHARED.is_valid());
        assert!(MmapFlags::MAP_PRIVATE.is_valid());
        assert!(!(MmapFlags::MAP_SHARED | MmapFlags::MAP_PRIVATE).is_valid());
    }
}
