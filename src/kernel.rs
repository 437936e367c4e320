//! The kernel as one explicit object: every table and hosted device lives
//! here, and every process-level operation goes through it.

use core::convert::Infallible;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::*;
use crate::fs::{Console, FileDescriptor, FileNodeRegistry, FileStore, OpenDescriptionTable, OpenTarget};
use crate::mem::{AddressSpace, MainMemory, MemoryManager, PagedAddressSpace, VirtAddr, copy_in, copy_out, read_user_str};
use crate::process::{ExitStatus, HaltReport, JoinPolicy, ProcessControlBlock, ProcessID, ProcessManager, Processor, current_tag};
use crate::syscall::{TrapContext, UserContext};
use crate::utils::{ErrorNum, SpinMutex, Mutex};
use crate::version::VERSION;

/// Code of an executable, run on behalf of the process that exec'd it.
pub type Program = Arc<dyn Fn(&mut UserContext) -> isize + Send + Sync>;
/// Where a forked child starts.
pub type ForkEntry = Box<dyn FnOnce(&mut UserContext) -> isize + Send>;

#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub max_process     : usize,
    pub max_open_files  : usize,
    pub max_fd          : usize,
    pub phys_pages      : usize,
    pub stack_pages     : usize,
    pub join_policy     : JoinPolicy,
    /// preempt the running context every this many ticks
    pub time_slice      : Option<usize>,
    /// draw each slice from `1..=time_slice` with this seed
    pub random_seed     : Option<usize>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_process: MAX_PROCESS,
            max_open_files: MAX_OPEN_FILES,
            max_fd: MAX_FD,
            phys_pages: PHYS_PAGE_COUNT,
            stack_pages: USER_STACK_PAGES,
            join_policy: JoinPolicy::Yield,
            time_slice: None,
            random_seed: None,
        }
    }
}

impl KernelConfig {
    /// Turn on timer preemption with the default slice.
    pub fn preemptive(mut self, random_seed: Option<usize>) -> Self {
        self.time_slice = Some(DEFAULT_TIME_SLICE);
        self.random_seed = random_seed;
        self
    }
}

pub struct Kernel {
    config      : KernelConfig,
    processor   : Arc<Processor>,
    memory      : Arc<MemoryManager>,
    main_memory : Arc<MainMemory>,
    store       : Arc<dyn FileStore>,
    processes   : ProcessManager,
    open_files  : OpenDescriptionTable,
    programs    : SpinMutex<BTreeMap<String, Program>>,
    fork_entries: SpinMutex<BTreeMap<usize, ForkEntry>>,
    next_entry  : AtomicUsize,
}

impl Kernel {
    pub fn new(config: KernelConfig, store: Arc<dyn FileStore>, console: Arc<dyn Console>) -> Arc<Self> {
        assert!(config.max_fd > CONSOLE_OUTPUT, "descriptor table too small for the console");
        assert!(config.stack_pages > USER_SCRATCH_PAGES, "user stack smaller than the syscall scratch area");
        milestone!("parch_sim built {}", VERSION);
        info!("{:?}", config);
        let registry = Arc::new(FileNodeRegistry::new(store.clone(), console));
        Arc::new(Self {
            processor: Processor::new(config.time_slice, config.random_seed),
            memory: Arc::new(MemoryManager::new(config.phys_pages)),
            main_memory: Arc::new(MainMemory::new(config.phys_pages)),
            store,
            processes: ProcessManager::new(config.max_process),
            open_files: OpenDescriptionTable::new(registry, config.max_open_files),
            programs: SpinMutex::new("programs", BTreeMap::new()),
            fork_entries: SpinMutex::new("fork entries", BTreeMap::new()),
            next_entry: AtomicUsize::new(1),
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    pub fn open_files(&self) -> &OpenDescriptionTable {
        &self.open_files
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Store `image` as the executable `name` and register the code it
    /// stands for.
    pub fn install_program<F>(&self, name: &str, image: &[u8], program: F) -> Result<(), ErrorNum>
    where F: Fn(&mut UserContext) -> isize + Send + Sync + 'static
    {
        self.store.create(name, 0)?;
        self.store.open(name)?.write_at(image, 0)?;
        self.programs.acquire().insert(String::from(name), Arc::new(program));
        verbose!("Program {} installed, image {} bytes", name, image.len());
        Ok(())
    }

    /// Run executable `name` as the first process and block until the
    /// machine halts.
    pub fn boot(self: &Arc<Self>, name: &str) -> HaltReport {
        let kernel = self.clone();
        let name = String::from(name);
        self.processor.spawn("main", None, move || {
            if let Err(e) = kernel.start_process(&name) {
                error!("Cannot start {}: {}", name, e);
            }
        });
        self.processor.run()
    }

    fn start_process(self: &Arc<Self>, name: &str) -> Result<ProcessID, ErrorNum> {
        let (space, program) = self.load(name)?;
        let pcb = self.processes.allocate(self.config.max_fd)?;
        pcb.get_inner().name = String::from(name);
        pcb.replace_space(Some(space));
        let started = self.install_console(&pcb)
            .and_then(|_| self.launch(&pcb, TrapContext::new(0), Box::new(move |user: &mut UserContext| program(user))));
        if let Err(e) = started {
            pcb.release_resources(&self.open_files);
            self.processes.deallocate(&pcb);
            return Err(e);
        }
        info!("{:?} started running {}", pcb.pid, name);
        Ok(pcb.pid)
    }

    fn install_console(&self, pcb: &Arc<ProcessControlBlock>) -> Result<(), ErrorNum> {
        let mut files = pcb.get_files();
        for (fd, target) in [(CONSOLE_INPUT, OpenTarget::ConsoleInput), (CONSOLE_OUTPUT, OpenTarget::ConsoleOutput)] {
            self.open_files.open_into(&mut files, target, Some(FileDescriptor(fd)))?;
        }
        Ok(())
    }

    /// Open the executable and build an address space holding its image.
    fn load(&self, name: &str) -> Result<(Box<dyn AddressSpace>, Program), ErrorNum> {
        let handle = self.store.open(name)?;
        let program = self.programs.acquire().get(name).cloned().ok_or(ErrorNum::ENOENT)?;
        let mut image = vec![0u8; handle.length()];
        let len = handle.read_at(&mut image, 0)?;
        image.truncate(len);
        let space = PagedAddressSpace::with_image(self.memory.clone(), self.main_memory.clone(), &image, self.config.stack_pages)?;
        Ok((Box::new(space), program))
    }

    /// Give `pcb` an execution context that runs `entry` and then exits
    /// with its result. Fails if `pcb` was killed before it could start.
    fn launch(self: &Arc<Self>, pcb: &Arc<ProcessControlBlock>, trap: TrapContext, entry: ForkEntry) -> Result<(), ErrorNum> {
        let kernel = self.clone();
        let pid = pcb.pid;
        let name = pcb.get_inner().name.clone();
        self.processes.start(pcb, || self.processor.spawn(&name, Some(pid.0), move || {
            let mut user = UserContext::new(kernel, pid, trap);
            let status = entry(&mut user);
            user.exit(status)
        }))?;
        Ok(())
    }

    pub fn current_process(&self) -> Result<Arc<ProcessControlBlock>, ErrorNum> {
        let pid = current_tag().ok_or(ErrorNum::ESRCH)?;
        self.processes.get_process(ProcessID(pid))
    }

    pub(crate) fn register_fork_entry(&self, entry: ForkEntry) -> usize {
        let token = self.next_entry.fetch_add(1, Ordering::Relaxed);
        self.fork_entries.acquire().insert(token, entry);
        token
    }

    pub(crate) fn take_fork_entry(&self, token: usize) -> Option<ForkEntry> {
        self.fork_entries.acquire().remove(&token)
    }

    // ======================== user memory ========================

    pub fn copy_in(&self, pcb: &ProcessControlBlock, va: VirtAddr, len: usize) -> Result<Vec<u8>, ErrorNum> {
        let inner = pcb.get_inner();
        let space = inner.space.as_deref().ok_or(ErrorNum::EFAULT)?;
        copy_in(space, &self.main_memory, va, len)
    }

    pub fn copy_out(&self, pcb: &ProcessControlBlock, va: VirtAddr, data: &[u8]) -> Result<(), ErrorNum> {
        let inner = pcb.get_inner();
        let space = inner.space.as_deref().ok_or(ErrorNum::EFAULT)?;
        copy_out(space, &self.main_memory, va, data)
    }

    pub fn read_user_str(&self, pcb: &ProcessControlBlock, va: VirtAddr) -> Result<String, ErrorNum> {
        let inner = pcb.get_inner();
        let space = inner.space.as_deref().ok_or(ErrorNum::EFAULT)?;
        read_user_str(space, &self.main_memory, va)
    }

    /// Fail with `EFAULT` unless all of `va..va+len` is mapped.
    pub fn check_user_buffer(&self, pcb: &ProcessControlBlock, va: VirtAddr, len: usize) -> Result<(), ErrorNum> {
        let inner = pcb.get_inner();
        let space = inner.space.as_deref().ok_or(ErrorNum::EFAULT)?;
        if len > 0 {
            space.translate(va)?;
            space.translate(va + (len - 1))?;
        }
        Ok(())
    }

    /// Size in bytes of the address space of `pcb`.
    pub fn space_size(&self, pcb: &ProcessControlBlock) -> Result<usize, ErrorNum> {
        pcb.get_inner().space.as_ref().map(|s| s.size()).ok_or(ErrorNum::EFAULT)
    }

    // ======================== processes ========================

    /// Create a child of `parent` with a copy of its address space and
    /// descriptor table, running `entry`. Nothing is left behind on failure.
    ///
    /// A child killed before it got to run still counts as forked: it never
    /// runs, and `parent` joins it like any other killed child.
    pub fn fork(self: &Arc<Self>, parent: &Arc<ProcessControlBlock>, trap: TrapContext, entry: ForkEntry) -> Result<ProcessID, ErrorNum> {
        let child = self.processes.allocate_child(parent, self.config.max_fd)?;
        let duplicated = match parent.get_inner().space.as_ref() {
            Some(space) => space.duplicate(),
            None => Err(ErrorNum::EFAULT),
        };
        let space = match duplicated {
            Ok(space) => space,
            Err(e) => {
                warning!("{:?} cannot fork: {}", parent.pid, e);
                self.processes.discard_child(parent, &child);
                return Err(e);
            }
        };
        child.replace_space(Some(space));
        {
            let parent_files = parent.get_files();
            let mut child_files = child.get_files();
            self.open_files.duplicate_into(&parent_files, &mut child_files);
        }
        let name = format!("{}+", parent.get_inner().name);
        child.get_inner().name = name;
        let mut child_trap = trap;
        child_trap.set_result(0);
        child_trap.increment_pc();
        match self.launch(&child, child_trap, entry) {
            Ok(()) => info!("{:?} forked {:?}", parent.pid, child.pid),
            Err(_) => {
                // its killer may have cleaned up before the copies landed
                child.release_resources(&self.open_files);
                info!("{:?} forked {:?}, killed before it ran", parent.pid, child.pid);
            }
        }
        Ok(child.pid)
    }

    /// Replace the program of `pcb` with executable `name`. Only returns
    /// if the executable could not be loaded; the old image is kept then.
    pub fn exec(self: &Arc<Self>, pcb: &Arc<ProcessControlBlock>, name: &str) -> Result<Infallible, ErrorNum> {
        let (space, program) = self.load(name)?;
        let old = pcb.replace_space(Some(space));
        drop(old);
        pcb.get_inner().name = String::from(name);
        info!("{:?} exec {}", pcb.pid, name);
        let mut user = UserContext::new(self.clone(), pcb.pid, TrapContext::new(0));
        let status = program(&mut user);
        self.exit(pcb, ExitStatus::Exited(status))
    }

    /// Terminate the calling process.
    pub fn exit(&self, pcb: &Arc<ProcessControlBlock>, status: ExitStatus) -> ! {
        info!("{:?} exits: {:?}", pcb.pid, status);
        self.processes.exit_process(pcb, status);
        pcb.release_resources(&self.open_files);
        self.processor.exit_current()
    }

    pub fn join(&self, caller: &Arc<ProcessControlBlock>, target: ProcessID) -> Result<isize, ErrorNum> {
        self.processes.join(caller, target, self.config.join_policy)
    }

    /// Kill `target`. Killing yourself is an exit with the killed status;
    /// any other victim never runs again and its resources are released here.
    pub fn kill(&self, caller: &Arc<ProcessControlBlock>, target: ProcessID) -> Result<(), ErrorNum> {
        if caller.pid == target {
            self.exit(caller, ExitStatus::Killed);
        }
        let victim = self.processes.get_process(target)?;
        if !self.processes.exit_process(&victim, ExitStatus::Killed) {
            return Err(ErrorNum::ESRCH);
        }
        if let Some(ctx) = victim.context() {
            self.processor.unschedule(ctx);
        }
        victim.release_resources(&self.open_files);
        info!("{:?} killed {:?}", caller.pid, target);
        Ok(())
    }

    // ======================== files ========================

    pub fn create(&self, name: &str) -> Result<(), ErrorNum> {
        self.store.create(name, 0)
    }

    /// The descriptor table stays locked until the new slot is filled, so
    /// a killer that closes the table afterwards finds the description.
    pub fn open(&self, pcb: &ProcessControlBlock, name: &str) -> Result<FileDescriptor, ErrorNum> {
        let mut files = pcb.get_files();
        self.open_files.open_into(&mut files, OpenTarget::File(name), None)
    }

    pub fn close(&self, pcb: &ProcessControlBlock, fd: FileDescriptor) -> Result<(), ErrorNum> {
        let mut files = pcb.get_files();
        self.open_files.close_in(&mut files, fd)
    }

    pub fn read(&self, pcb: &ProcessControlBlock, fd: FileDescriptor, length: usize) -> Result<Vec<u8>, ErrorNum> {
        let desc = pcb.get_files().get(fd)?;
        desc.read(length)
    }

    pub fn write(&self, pcb: &ProcessControlBlock, fd: FileDescriptor, data: &[u8]) -> Result<usize, ErrorNum> {
        let desc = pcb.get_files().get(fd)?;
        desc.write(data)
    }
}
