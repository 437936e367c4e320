use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::sync::SleepMutex;
use crate::utils::{ErrorNum, Mutex};
use super::{Console, StoreHandle};

pub enum NodeBacking {
    Console(Arc<dyn Console>),
    Store(Box<dyn StoreHandle>),
}

/// One system-wide open file. Every description bound to the same name
/// shares the same node, and every byte transfer goes through its lock.
pub struct FileNode {
    name        : String,
    /// descriptions bound to this node, changed only under the registry lock
    ref_count   : AtomicUsize,
    console     : bool,
    backing     : SleepMutex<NodeBacking>,
}

impl FileNode {
    pub fn new(name: &str, backing: NodeBacking) -> Self {
        Self {
            name: String::from(name),
            ref_count: AtomicUsize::new(0),
            console: matches!(backing, NodeBacking::Console(_)),
            backing: SleepMutex::new(name, backing),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(super) fn increase_ref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(super) fn decrease_ref(&self) -> usize {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "file node {} released more often than bound", self.name);
        prev - 1
    }

    pub fn is_console(&self) -> bool {
        self.console
    }

    /// Console input ignores `offset`.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, ErrorNum> {
        match &*self.backing.acquire() {
            NodeBacking::Console(console) => console.read(buf),
            NodeBacking::Store(handle) => handle.read_at(buf, offset),
        }
    }

    /// Console output ignores `offset` and ends every write with a newline.
    pub fn write_at(&self, data: &[u8], offset: usize) -> Result<usize, ErrorNum> {
        match &*self.backing.acquire() {
            NodeBacking::Console(console) => {
                let written = console.write(data)?;
                console.write(b"\n")?;
                Ok(written)
            },
            NodeBacking::Store(handle) => handle.write_at(data, offset),
        }
    }

    pub fn length(&self) -> usize {
        match &*self.backing.acquire() {
            NodeBacking::Console(_) => 0,
            NodeBacking::Store(handle) => handle.length(),
        }
    }
}
