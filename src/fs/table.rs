use std::sync::Arc;

use crate::process::get_processor;
use crate::sync::SleepMutex;
use crate::utils::{BitMap, ErrorNum, Mutex, MutexGuard};
use super::{FileDescriptor, FileDescriptorTable, FileNode, FileNodeRegistry, OpenDescription, OpenMode};

/// What a new description gets bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget<'a> {
    ConsoleInput,
    ConsoleOutput,
    File(&'a str),
}

struct TableInner {
    slots   : Vec<Option<Arc<OpenDescription>>>,
    used    : BitMap,
}

/// System-wide, fixed-capacity table of open descriptions.
///
/// Lock order is descriptor table, then this table, then registry. Every
/// operation takes all the locks it needs before it changes anything and
/// does its bookkeeping with interrupts off, so a process killed while
/// blocked in here has either given up nothing or done the whole job, and
/// every share it still holds sits in its descriptor table for the killer.
pub struct OpenDescriptionTable {
    registry: Arc<FileNodeRegistry>,
    inner   : SleepMutex<TableInner>,
}

impl OpenDescriptionTable {
    pub fn new(registry: Arc<FileNodeRegistry>, capacity: usize) -> Self {
        Self {
            registry,
            inner: SleepMutex::new("OpenDescriptionTable", TableInner {
                slots: vec![None; capacity],
                used: BitMap::new(capacity),
            }),
        }
    }

    fn lock(&self) -> (MutexGuard<'_, TableInner>, MutexGuard<'_, Vec<Arc<FileNode>>>) {
        let inner = self.inner.acquire();
        let nodes = self.registry.lock_nodes();
        (inner, nodes)
    }

    /// Bind a new description to `target` and let `install` place it before
    /// anything is counted. `install` must not block; if it fails nothing
    /// is left behind.
    fn allocate_with<R, F>(&self, target: OpenTarget, install: F) -> Result<R, ErrorNum>
    where F: FnOnce(&Arc<OpenDescription>) -> Result<R, ErrorNum>
    {
        let (mut inner, mut nodes) = self.lock();
        if inner.used.is_full() {
            return Err(ErrorNum::ENFILE);
        }
        let (node, fresh, mode) = match target {
            OpenTarget::ConsoleInput => (self.registry.console().clone(), false, OpenMode::READ | OpenMode::CONSOLE),
            OpenTarget::ConsoleOutput => (self.registry.console().clone(), false, OpenMode::WRITE | OpenMode::CONSOLE),
            OpenTarget::File(name) => {
                let (node, fresh) = self.registry.find_or_open(&nodes, name)?;
                (node, fresh, OpenMode::READ | OpenMode::WRITE)
            },
        };
        let processor = get_processor();
        let _intr = processor.intr_off();
        let id = inner.used.find().ok_or(ErrorNum::ENFILE)?;
        let desc = Arc::new(OpenDescription::new(id, &node, mode));
        let installed = match install(&desc) {
            Ok(installed) => installed,
            Err(e) => {
                inner.used.clear(id);
                return Err(e);
            }
        };
        FileNodeRegistry::commit_bind(&mut nodes, &node, fresh);
        inner.slots[id] = Some(desc);
        verbose!("Open description {} bound to {}", id, node.get_name());
        Ok(installed)
    }

    pub fn allocate(&self, target: OpenTarget) -> Result<Arc<OpenDescription>, ErrorNum> {
        self.allocate_with(target, |desc| Ok(desc.clone()))
    }

    /// Open `target` into `files`, at `fd` or else in the lowest free slot.
    pub fn open_into(&self, files: &mut FileDescriptorTable, target: OpenTarget, fd: Option<FileDescriptor>) -> Result<FileDescriptor, ErrorNum> {
        self.allocate_with(target, |desc| match fd {
            Some(fd) => files.install_at(fd, desc.clone()).map(|_| fd),
            None => files.install(desc.clone()),
        })
    }

    /// Give `into` the layout of `from`, sharing every description once more.
    pub fn duplicate_into(&self, from: &FileDescriptorTable, into: &mut FileDescriptorTable) {
        let _inner = self.inner.acquire();
        let processor = get_processor();
        let _intr = processor.intr_off();
        for desc in from.descriptions() {
            desc.increase_ref();
        }
        into.copy_layout(from);
    }

    fn release(&self, inner: &mut TableInner, nodes: &mut Vec<Arc<FileNode>>, desc: &Arc<OpenDescription>) {
        if desc.decrease_ref() > 0 {
            return;
        }
        match inner.slots.get(desc.id()) {
            Some(Some(slot)) if Arc::ptr_eq(slot, desc) => {},
            _ => panic!("open description {} not in table", desc.id()),
        }
        inner.slots[desc.id()] = None;
        inner.used.clear(desc.id());
        match desc.node() {
            Ok(node) => FileNodeRegistry::commit_release(nodes, &node),
            Err(_) => error!("Open description {} lost its node", desc.id()),
        }
        verbose!("Open description {} freed", desc.id());
    }

    /// One descriptor slot lets go of `desc`; the last one frees the slot and
    /// the node binding.
    pub fn deallocate(&self, desc: &Arc<OpenDescription>) {
        let (mut inner, mut nodes) = self.lock();
        let processor = get_processor();
        let _intr = processor.intr_off();
        self.release(&mut inner, &mut nodes, desc);
    }

    /// Empty slot `fd` of `files` and give its share back.
    pub fn close_in(&self, files: &mut FileDescriptorTable, fd: FileDescriptor) -> Result<(), ErrorNum> {
        let (mut inner, mut nodes) = self.lock();
        let processor = get_processor();
        let _intr = processor.intr_off();
        let desc = files.remove(fd)?;
        self.release(&mut inner, &mut nodes, &desc);
        Ok(())
    }

    /// Empty every slot of `files`, returning how many were open.
    pub fn close_all(&self, files: &mut FileDescriptorTable) -> usize {
        let (mut inner, mut nodes) = self.lock();
        let processor = get_processor();
        let _intr = processor.intr_off();
        let open = files.drain();
        for desc in open.iter() {
            self.release(&mut inner, &mut nodes, desc);
        }
        open.len()
    }

    pub fn get(&self, id: usize) -> Option<Arc<OpenDescription>> {
        self.inner.acquire().slots.get(id).cloned().flatten()
    }

    pub fn live_count(&self) -> usize {
        let inner = self.inner.acquire();
        inner.used.len() - inner.used.num_clear()
    }

    pub fn registry(&self) -> &Arc<FileNodeRegistry> {
        &self.registry
    }
}
