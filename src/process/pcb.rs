use std::sync::Arc;

use crate::config::KILLED_STATUS;
use crate::fs::{FileDescriptorTable, OpenDescriptionTable};
use crate::mem::AddressSpace;
use crate::sync::{SleepMutex, Condition};
use crate::utils::{SpinMutex, MutexGuard, Mutex};
use super::{ProcessID, ContextId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Running,
    Exited(isize),
    Killed,
}

impl ExitStatus {
    /// The status a joining parent sees, `None` while still running.
    pub fn code(&self) -> Option<isize> {
        match self {
            ExitStatus::Running => None,
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Killed => Some(KILLED_STATUS),
        }
    }
}

pub struct ProcessControlBlock {
    pub pid : ProcessID,
    inner   : SpinMutex<PCBInner>,
    files   : SleepMutex<FileDescriptorTable>,
    /// broadcast under the process manager lock when the process exits
    exited  : Condition,
}

pub struct PCBInner {
    pub name        : String,
    /// relation to the parent by pid; cleared when the parent goes away
    pub parent      : Option<ProcessID>,
    pub children    : Vec<Arc<ProcessControlBlock>>,
    pub status      : ExitStatus,
    pub space       : Option<Box<dyn AddressSpace>>,
    pub context     : Option<ContextId>,
}

impl ProcessControlBlock {
    pub fn new(pid: ProcessID, fd_capacity: usize) -> Self {
        Self {
            pid,
            inner: SpinMutex::new("PCB", PCBInner {
                name: format!("process {}", pid.0),
                parent: None,
                children: Vec::new(),
                status: ExitStatus::Running,
                space: None,
                context: None,
            }),
            files: SleepMutex::new("PCB files", FileDescriptorTable::new(fd_capacity)),
            exited: Condition::new("process exited"),
        }
    }

    pub fn get_inner(&self) -> MutexGuard<PCBInner> {
        self.inner.acquire()
    }

    /// Descriptor table; may sleep.
    pub fn get_files(&self) -> MutexGuard<FileDescriptorTable> {
        self.files.acquire()
    }

    pub fn status(&self) -> ExitStatus {
        self.get_inner().status
    }

    pub fn has_exited(&self) -> bool {
        self.status() != ExitStatus::Running
    }

    pub fn parent(&self) -> Option<ProcessID> {
        self.get_inner().parent
    }

    pub fn context(&self) -> Option<ContextId> {
        self.get_inner().context
    }

    pub fn exited(&self) -> &Condition {
        &self.exited
    }

    /// Swap in a new address space, returning the old one.
    pub fn replace_space(&self, space: Option<Box<dyn AddressSpace>>) -> Option<Box<dyn AddressSpace>> {
        core::mem::replace(&mut self.get_inner().space, space)
    }

    /// Close every descriptor still open, returning how many there were.
    pub fn release_files(&self, table: &OpenDescriptionTable) -> usize {
        table.close_all(&mut self.get_files())
    }

    /// Give back the address space and all descriptors.
    pub fn release_resources(&self, table: &OpenDescriptionTable) {
        let space = self.replace_space(None);
        let pages = space.as_ref().map(|s| s.page_count()).unwrap_or(0);
        drop(space);
        let closed = self.release_files(table);
        debug!("{:?} released {} pages and {} descriptors", self.pid, pages, closed);
    }
}
