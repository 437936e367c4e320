use std::sync::Arc;

use crate::sync::SleepMutex;
use crate::utils::{BitMap, ErrorNum, Mutex};
use super::{get_processor, ContextId, ExitStatus, ProcessControlBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessID(pub usize);

impl core::fmt::Display for ProcessID {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
		core::fmt::Debug::fmt(self, f)
	}
}

/// How `join` waits for the target to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// poll, yielding the processor between checks
    Yield,
    /// sleep on the target's exit condition
    Condition,
}

struct ProcessManagerInner {
    slots   : Vec<Option<Arc<ProcessControlBlock>>>,
    used    : BitMap,
}

impl ProcessManagerInner {
    fn allocate(&mut self, fd_capacity: usize) -> Result<Arc<ProcessControlBlock>, ErrorNum> {
        let pid = self.used.find().ok_or(ErrorNum::EAGAIN)?;
        let pcb = Arc::new(ProcessControlBlock::new(ProcessID(pid), fd_capacity));
        self.slots[pid] = Some(pcb.clone());
        debug!("{:?} allocated", pcb.pid);
        Ok(pcb)
    }

    fn add_child(&mut self, parent: &Arc<ProcessControlBlock>, child: &Arc<ProcessControlBlock>) {
        child.get_inner().parent = Some(parent.pid);
        parent.get_inner().children.push(child.clone());
    }

    /// Frees the slot if it still holds exactly this PCB.
    fn deallocate(&mut self, pcb: &Arc<ProcessControlBlock>) -> bool {
        match self.slots.get_mut(pcb.pid.0) {
            Some(slot) if slot.as_ref().map(|p| Arc::ptr_eq(p, pcb)).unwrap_or(false) => {
                *slot = None;
                self.used.clear(pcb.pid.0);
                debug!("{:?} destroyed", pcb.pid);
                true
            },
            _ => false,
        }
    }

    fn reap_exited_children_orphan_others(&mut self, pcb: &Arc<ProcessControlBlock>) {
        let children = core::mem::take(&mut pcb.get_inner().children);
        for child in children {
            if child.has_exited() {
                self.deallocate(&child);
            } else {
                child.get_inner().parent = None;
                verbose!("{:?} orphaned by {:?}", child.pid, pcb.pid);
            }
        }
    }
}

/// Fixed-capacity process table. Slot index is the pid.
pub struct ProcessManager {
    inner: SleepMutex<ProcessManagerInner>,
}

impl ProcessManager {
    pub fn new(capacity: usize) -> Self {
        verbose!("Initializing ProcessManager with {} slots", capacity);
        Self {
            inner: SleepMutex::new("ProcessManager", ProcessManagerInner {
                slots: vec![None; capacity],
                used: BitMap::new(capacity),
            }),
        }
    }

    pub fn allocate(&self, fd_capacity: usize) -> Result<Arc<ProcessControlBlock>, ErrorNum> {
        self.inner.acquire().allocate(fd_capacity)
    }

    /// Allocate a child of `parent`. The new PCB is never in the table
    /// without its parent link, so a kill that finds it leaves a zombie
    /// for `parent` to join.
    pub fn allocate_child(&self, parent: &Arc<ProcessControlBlock>, fd_capacity: usize) -> Result<Arc<ProcessControlBlock>, ErrorNum> {
        let mut inner = self.inner.acquire();
        if parent.has_exited() {
            return Err(ErrorNum::ESRCH);
        }
        let child = inner.allocate(fd_capacity)?;
        inner.add_child(parent, &child);
        Ok(child)
    }

    /// Undo `allocate_child` for a child that never started.
    pub fn discard_child(&self, parent: &Arc<ProcessControlBlock>, child: &Arc<ProcessControlBlock>) {
        let mut inner = self.inner.acquire();
        parent.get_inner().children.retain(|c| !Arc::ptr_eq(c, child));
        inner.deallocate(child);
    }

    /// Give `pcb` the execution context `spawn` creates, unless it was
    /// killed before it got one. A kill either comes first and is seen
    /// here, or finds the context to unschedule.
    pub fn start<F>(&self, pcb: &Arc<ProcessControlBlock>, spawn: F) -> Result<ContextId, ErrorNum>
    where F: FnOnce() -> ContextId
    {
        let _inner = self.inner.acquire();
        if pcb.has_exited() {
            return Err(ErrorNum::ESRCH);
        }
        let ctx = spawn();
        pcb.get_inner().context = Some(ctx);
        Ok(ctx)
    }

    /// Remove `pcb` from the table. Returns false if it was already gone.
    pub fn deallocate(&self, pcb: &Arc<ProcessControlBlock>) -> bool {
        self.inner.acquire().deallocate(pcb)
    }

    pub fn get_process(&self, pid: ProcessID) -> Result<Arc<ProcessControlBlock>, ErrorNum> {
        self.inner.acquire().slots.get(pid.0).cloned().flatten().ok_or(ErrorNum::ESRCH)
    }

    pub fn reap_exited_children_orphan_others(&self, pcb: &Arc<ProcessControlBlock>) {
        self.inner.acquire().reap_exited_children_orphan_others(pcb)
    }

    /// Record `status`, settle the children and destroy `pcb` right away if
    /// nobody is left to join it. Joiners waiting on the exit condition are
    /// woken. Returns false if the process had already exited.
    pub fn exit_process(&self, pcb: &Arc<ProcessControlBlock>, status: ExitStatus) -> bool {
        let mut inner = self.inner.acquire();
        let parent = {
            let mut pcb_inner = pcb.get_inner();
            if pcb_inner.status != ExitStatus::Running {
                return false;
            }
            pcb_inner.status = status;
            pcb_inner.parent
        };
        inner.reap_exited_children_orphan_others(pcb);
        if parent.is_none() {
            inner.deallocate(pcb);
        } else {
            verbose!("{:?} is a zombie until {:?} joins it", pcb.pid, parent);
        }
        pcb.exited().broadcast(self.inner.raw());
        true
    }

    /// Wait for child `target` of `caller` to exit, reap it and return its
    /// status.
    pub fn join(&self, caller: &Arc<ProcessControlBlock>, target: ProcessID, policy: JoinPolicy) -> Result<isize, ErrorNum> {
        if caller.pid == target {
            return Err(ErrorNum::ESELF);
        }
        let child = self.get_process(target)?;
        if child.parent() != Some(caller.pid) {
            return Err(ErrorNum::EPERM);
        }
        if policy == JoinPolicy::Yield {
            let processor = get_processor();
            while !child.has_exited() {
                processor.yield_now();
            }
        }
        let mut inner = self.inner.acquire();
        while !child.has_exited() {
            child.exited().wait(self.inner.raw());
        }
        let status = child.status().code().ok_or(ErrorNum::EINVAL)?;
        caller.get_inner().children.retain(|c| !Arc::ptr_eq(c, &child));
        inner.deallocate(&child);
        Ok(status)
    }

    pub fn live_count(&self) -> usize {
        let inner = self.inner.acquire();
        inner.used.len() - inner.used.num_clear()
    }

    pub fn capacity(&self) -> usize {
        self.inner.acquire().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::process::Processor;
    use super::*;

    fn on_cpu<F: FnOnce() + Send + 'static>(f: F) {
        let cpu = Processor::new(None, None);
        cpu.spawn("test", None, f);
        cpu.run();
    }

    #[test]
    fn table_capacity_is_enforced() {
        on_cpu(|| {
            let pm = ProcessManager::new(2);
            let a = pm.allocate(4).unwrap();
            let b = pm.allocate(4).unwrap();
            assert_eq!(pm.allocate(4).err(), Some(ErrorNum::EAGAIN));
            assert_eq!((a.pid, b.pid), (ProcessID(0), ProcessID(1)));
            assert!(pm.deallocate(&a));
            assert!(!pm.deallocate(&a));
            assert_eq!(pm.allocate(4).unwrap().pid, ProcessID(0));
        });
    }

    #[test]
    fn lookup_out_of_range_is_not_found() {
        on_cpu(|| {
            let pm = ProcessManager::new(2);
            assert_eq!(pm.get_process(ProcessID(1)).err(), Some(ErrorNum::ESRCH));
            assert_eq!(pm.get_process(ProcessID(100)).err(), Some(ErrorNum::ESRCH));
        });
    }

    #[test]
    fn exit_reaps_zombies_and_orphans_the_rest() {
        on_cpu(|| {
            let pm = ProcessManager::new(4);
            let parent = pm.allocate(4).unwrap();
            let zombie = pm.allocate_child(&parent, 4).unwrap();
            let runner = pm.allocate_child(&parent, 4).unwrap();
            assert!(pm.exit_process(&zombie, ExitStatus::Exited(3)));
            assert!(pm.get_process(zombie.pid).is_ok());

            assert!(pm.exit_process(&parent, ExitStatus::Exited(0)));
            assert!(!pm.exit_process(&parent, ExitStatus::Exited(1)));
            assert_eq!(pm.get_process(parent.pid).err(), Some(ErrorNum::ESRCH));
            assert_eq!(pm.get_process(zombie.pid).err(), Some(ErrorNum::ESRCH));
            assert_eq!(runner.parent(), None);
            assert_eq!(pm.live_count(), 1);

            // parentless: gone at exit
            pm.exit_process(&runner, ExitStatus::Killed);
            assert_eq!(pm.live_count(), 0);
        });
    }

    #[test]
    fn join_checks_relation_and_reaps() {
        for policy in [JoinPolicy::Yield, JoinPolicy::Condition] {
            on_cpu(move || {
                let pm = ProcessManager::new(4);
                let parent = pm.allocate(4).unwrap();
                let child = pm.allocate_child(&parent, 4).unwrap();
                let stranger = pm.allocate(4).unwrap();
                assert_eq!(pm.join(&parent, parent.pid, policy), Err(ErrorNum::ESELF));
                assert_eq!(pm.join(&stranger, child.pid, policy), Err(ErrorNum::EPERM));
                assert_eq!(pm.join(&parent, ProcessID(3), policy), Err(ErrorNum::ESRCH));
                pm.exit_process(&child, ExitStatus::Exited(7));
                assert!(pm.get_process(child.pid).is_ok());
                assert_eq!(pm.join(&parent, child.pid, policy), Ok(7));
                assert_eq!(pm.get_process(child.pid).err(), Some(ErrorNum::ESRCH));
                assert!(parent.get_inner().children.is_empty());
            });
        }
    }

    #[test]
    fn killed_child_is_never_started() {
        on_cpu(|| {
            let pm = ProcessManager::new(4);
            let parent = pm.allocate(4).unwrap();
            let child = pm.allocate_child(&parent, 4).unwrap();
            assert!(pm.exit_process(&child, ExitStatus::Killed));
            // a zombie until the parent joins it
            assert!(pm.get_process(child.pid).is_ok());
            let mut spawned = false;
            assert_eq!(pm.start(&child, || { spawned = true; ContextId(0) }).err(), Some(ErrorNum::ESRCH));
            assert!(!spawned);
            assert_eq!(pm.join(&parent, child.pid, JoinPolicy::Yield), Ok(crate::config::KILLED_STATUS));

            pm.exit_process(&parent, ExitStatus::Exited(0));
            assert_eq!(pm.allocate_child(&parent, 4).err(), Some(ErrorNum::ESRCH));
            assert_eq!(pm.live_count(), 0);
        });
    }

    #[test]
    fn discarded_child_leaves_no_trace() {
        on_cpu(|| {
            let pm = ProcessManager::new(2);
            let parent = pm.allocate(4).unwrap();
            let child = pm.allocate_child(&parent, 4).unwrap();
            pm.discard_child(&parent, &child);
            assert!(parent.get_inner().children.is_empty());
            assert_eq!(pm.live_count(), 1);
        });
    }

    #[test]
    fn join_waits_for_a_running_child() {
        for policy in [JoinPolicy::Yield, JoinPolicy::Condition] {
            let cpu = Processor::new(None, None);
            let pm = Arc::new(ProcessManager::new(4));
            let result = Arc::new(crate::utils::SpinMutex::new("result", None));
            let (pm1, r1) = (pm.clone(), result.clone());
            cpu.spawn("parent", None, move || {
                let parent = pm1.allocate(4).unwrap();
                let child = pm1.allocate_child(&parent, 4).unwrap();
                let pm2 = pm1.clone();
                let c = child.clone();
                get_processor().spawn("child", None, move || {
                    get_processor().yield_now();
                    pm2.exit_process(&c, ExitStatus::Killed);
                });
                *r1.acquire() = Some(pm1.join(&parent, child.pid, policy));
            });
            let report = cpu.run();
            assert_eq!(*result.acquire(), Some(Ok(crate::config::KILLED_STATUS)));
            assert_eq!(report.blocked, 0);
        }
    }
}
