use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bitflags::*;

use crate::sync::SleepMutex;
use crate::utils::{ErrorNum, Mutex};
use super::FileNode;

bitflags! {
    pub struct OpenMode: u32 {
        const READ      = 1 << 0;
        const WRITE     = 1 << 1;
        /// bound to the console; the cursor never moves
        const CONSOLE   = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(pub usize);

impl Cursor {
    pub fn at_start() -> Self {
        Self(0)
    }
}

/// What one `open` produced: a node binding plus a cursor. Descriptor slots
/// inherited through fork point at the same description and share the cursor.
pub struct OpenDescription {
    id          : usize,
    mode        : OpenMode,
    node        : Weak<FileNode>,
    /// descriptor slots referring to this description, changed only under
    /// the table lock
    ref_count   : AtomicUsize,
    cursor      : SleepMutex<Cursor>,
}

impl OpenDescription {
    pub(super) fn new(id: usize, node: &Arc<FileNode>, mode: OpenMode) -> Self {
        Self {
            id,
            mode,
            node: Arc::downgrade(node),
            ref_count: AtomicUsize::new(1),
            cursor: SleepMutex::new(node.get_name(), Cursor::at_start()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(super) fn increase_ref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(super) fn decrease_ref(&self) -> usize {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "open description {} closed more often than shared", self.id);
        prev - 1
    }

    pub fn node(&self) -> Result<Arc<FileNode>, ErrorNum> {
        self.node.upgrade().ok_or(ErrorNum::EBADF)
    }

    pub fn offset(&self) -> usize {
        self.cursor.acquire().0
    }

    /// Read up to `length` bytes at the cursor and advance it by what was read.
    pub fn read(&self, length: usize) -> Result<Vec<u8>, ErrorNum> {
        if !self.mode.contains(OpenMode::READ) {
            return Err(ErrorNum::EBADF);
        }
        let node = self.node()?;
        let mut cursor = self.cursor.acquire();
        let mut buf = vec![0u8; length];
        let read = node.read_at(&mut buf, cursor.0)?;
        buf.truncate(read);
        if !self.mode.contains(OpenMode::CONSOLE) {
            cursor.0 += read;
        }
        Ok(buf)
    }

    /// Write `data` at the cursor and advance it by what was written.
    pub fn write(&self, data: &[u8]) -> Result<usize, ErrorNum> {
        if !self.mode.contains(OpenMode::WRITE) {
            return Err(ErrorNum::EBADF);
        }
        let node = self.node()?;
        let mut cursor = self.cursor.acquire();
        let written = node.write_at(data, cursor.0)?;
        if !self.mode.contains(OpenMode::CONSOLE) {
            cursor.0 += written;
        }
        Ok(written)
    }
}
