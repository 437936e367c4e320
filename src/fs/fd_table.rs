use std::sync::Arc;

use crate::utils::{BitMap, ErrorNum};
use super::OpenDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileDescriptor(pub usize);

impl From<usize> for FileDescriptor {
    fn from(fd: usize) -> Self {
        Self(fd)
    }
}

/// Per-process map from small integers to shared open descriptions. Slots
/// do not own descriptions: every slot holds one share of the
/// description's reference count in the `OpenDescriptionTable`, which is
/// also the only place slots are filled or emptied.
pub struct FileDescriptorTable {
    slots   : Vec<Option<Arc<OpenDescription>>>,
    used    : BitMap,
}

impl FileDescriptorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            used: BitMap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Put `desc` in the lowest free slot.
    pub(super) fn install(&mut self, desc: Arc<OpenDescription>) -> Result<FileDescriptor, ErrorNum> {
        let fd = self.used.find().ok_or(ErrorNum::EMFILE)?;
        self.slots[fd] = Some(desc);
        Ok(FileDescriptor(fd))
    }

    pub(super) fn install_at(&mut self, fd: FileDescriptor, desc: Arc<OpenDescription>) -> Result<(), ErrorNum> {
        if fd.0 >= self.capacity() {
            return Err(ErrorNum::EBADF);
        }
        if self.used.test(fd.0) {
            return Err(ErrorNum::EINVAL);
        }
        self.used.mark(fd.0);
        self.slots[fd.0] = Some(desc);
        Ok(())
    }

    pub fn get(&self, fd: FileDescriptor) -> Result<Arc<OpenDescription>, ErrorNum> {
        self.slots.get(fd.0).cloned().flatten().ok_or(ErrorNum::EBADF)
    }

    /// Empty a slot; the caller gives the share back.
    pub(super) fn remove(&mut self, fd: FileDescriptor) -> Result<Arc<OpenDescription>, ErrorNum> {
        let desc = self.slots.get_mut(fd.0).and_then(|s| s.take()).ok_or(ErrorNum::EBADF)?;
        self.used.clear(fd.0);
        Ok(desc)
    }

    /// Empty every slot, handing back the descriptions that were open.
    pub(super) fn drain(&mut self) -> Vec<Arc<OpenDescription>> {
        self.used = BitMap::new(self.capacity());
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }

    /// Same layout as `other`; the caller takes the extra shares.
    pub(super) fn copy_layout(&mut self, other: &FileDescriptorTable) {
        self.slots = other.slots.clone();
        self.used = other.used.clone();
    }

    pub(super) fn descriptions(&self) -> impl Iterator<Item = &Arc<OpenDescription>> {
        self.slots.iter().flatten()
    }

    pub fn open_count(&self) -> usize {
        self.used.len() - self.used.num_clear()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::fs::{MemFileStore, BufferConsole, FileNodeRegistry, OpenDescriptionTable, OpenTarget};
    use crate::process::Processor;
    use super::*;

    #[test]
    fn slots_fill_lowest_first_and_duplicate_shares() {
        let cpu = Processor::new(None, None);
        let store = Arc::new(MemFileStore::new());
        store.insert("f", b"abc");
        let registry = Arc::new(FileNodeRegistry::new(store, Arc::new(BufferConsole::new(b""))));
        let table = Arc::new(OpenDescriptionTable::new(registry, 8));
        let t = table.clone();
        cpu.spawn("owner", None, move || {
            let mut fds = FileDescriptorTable::new(3);
            let f = OpenTarget::File("f");
            assert_eq!(t.open_into(&mut fds, f, Some(FileDescriptor(1))), Ok(FileDescriptor(1)));
            assert_eq!(t.open_into(&mut fds, f, Some(FileDescriptor(1))), Err(ErrorNum::EINVAL));
            assert_eq!(t.open_into(&mut fds, f, None), Ok(FileDescriptor(0)));
            assert_eq!(t.open_into(&mut fds, f, None), Ok(FileDescriptor(2)));
            assert_eq!(t.open_into(&mut fds, f, None), Err(ErrorNum::EMFILE));
            assert_eq!(fds.get(FileDescriptor(7)).err(), Some(ErrorNum::EBADF));
            assert_eq!(fds.open_count(), 3);

            let mut child = FileDescriptorTable::new(3);
            t.duplicate_into(&fds, &mut child);
            let a = fds.get(FileDescriptor(1)).unwrap();
            assert_eq!(a.ref_count(), 2);
            assert!(Arc::ptr_eq(&child.get(FileDescriptor(1)).unwrap(), &a));

            t.close_in(&mut fds, FileDescriptor(2)).unwrap();
            assert_eq!(fds.get(FileDescriptor(2)).err(), Some(ErrorNum::EBADF));
            assert_eq!(fds.open_count(), 2);
            // the freed slot is handed out again
            assert_eq!(t.open_into(&mut fds, f, None), Ok(FileDescriptor(2)));

            assert_eq!(t.close_all(&mut fds), 3);
            assert_eq!(fds.open_count(), 0);
            assert_eq!(t.close_all(&mut child), 3);
            assert_eq!(t.live_count(), 0);
            assert_eq!(t.registry().live_count(), 0);
        });
        cpu.run();
    }
}
