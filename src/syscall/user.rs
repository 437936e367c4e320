//! What a user program sees: one stub per syscall. Each stub stages its
//! arguments in the scratch area at the top of the address space, loads the
//! registers and traps into the kernel.

use std::sync::Arc;
use core::convert::TryFrom;

use crate::config::{PAGE_SIZE, USER_SCRATCH_PAGES};
use crate::kernel::Kernel;
use crate::mem::VirtAddr;
use crate::process::ProcessID;
use crate::utils::ErrorNum;
use super::syscall_num::*;
use super::{exception_handler, ExceptionType, TrapContext, NUM_ARGS};

const SCRATCH_SIZE: usize = USER_SCRATCH_PAGES * PAGE_SIZE;

pub struct UserContext {
    kernel  : Arc<Kernel>,
    pid     : ProcessID,
    trap    : TrapContext,
}

impl UserContext {
    pub(crate) fn new(kernel: Arc<Kernel>, pid: ProcessID, trap: TrapContext) -> Self {
        Self { kernel, pid, trap }
    }

    pub fn pid(&self) -> ProcessID {
        self.pid
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Registers as left by the last trap.
    pub fn registers(&self) -> &TrapContext {
        &self.trap
    }

    fn trap(&mut self, syscall_id: usize, args: [usize; NUM_ARGS]) -> isize {
        self.trap.set_syscall(syscall_id, args);
        exception_handler(&self.kernel, ExceptionType::Syscall, &mut self.trap);
        self.trap.result()
    }

    /// Raise exception `code` as if the running instruction had faulted.
    /// Codes the machine does not know are refused.
    pub fn raise(&mut self, code: usize) -> isize {
        match ExceptionType::try_from(code) {
            Ok(which) => {
                exception_handler(&self.kernel, which, &mut self.trap);
                0
            },
            Err(e) => e.sentinel(),
        }
    }

    pub fn read_memory(&self, va: VirtAddr, len: usize) -> Result<Vec<u8>, ErrorNum> {
        let pcb = self.kernel.processes().get_process(self.pid)?;
        self.kernel.copy_in(&pcb, va, len)
    }

    pub fn write_memory(&self, va: VirtAddr, data: &[u8]) -> Result<(), ErrorNum> {
        let pcb = self.kernel.processes().get_process(self.pid)?;
        self.kernel.copy_out(&pcb, va, data)
    }

    pub fn memory_size(&self) -> Result<usize, ErrorNum> {
        let pcb = self.kernel.processes().get_process(self.pid)?;
        self.kernel.space_size(&pcb)
    }

    fn scratch(&self) -> Result<VirtAddr, ErrorNum> {
        let size = self.memory_size()?;
        size.checked_sub(SCRATCH_SIZE).map(VirtAddr).ok_or(ErrorNum::EFAULT)
    }

    fn stage(&self, data: &[u8]) -> Result<VirtAddr, ErrorNum> {
        let va = self.scratch()?;
        self.write_memory(va, data)?;
        Ok(va)
    }

    fn stage_str(&self, s: &str) -> Result<VirtAddr, ErrorNum> {
        if s.len() >= SCRATCH_SIZE || s.as_bytes().contains(&0) {
            return Err(ErrorNum::EINVAL);
        }
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.stage(&bytes)
    }

    fn trap_with_str(&mut self, syscall_id: usize, s: &str) -> isize {
        match self.stage_str(s) {
            Ok(va) => self.trap(syscall_id, [va.0, 0, 0, 0]),
            Err(e) => e.sentinel(),
        }
    }

    pub fn halt(&mut self) -> ! {
        self.trap(SYSCALL_HALT, [0; NUM_ARGS]);
        self.kernel.processor().exit_current()
    }

    pub fn exit(&mut self, status: isize) -> ! {
        self.trap(SYSCALL_EXIT, [status as usize, 0, 0, 0]);
        self.kernel.processor().exit_current()
    }

    /// Only returns when `name` could not be run.
    pub fn exec(&mut self, name: &str) -> isize {
        self.trap_with_str(SYSCALL_EXEC, name)
    }

    pub fn join(&mut self, pid: usize) -> isize {
        self.trap(SYSCALL_JOIN, [pid, 0, 0, 0])
    }

    pub fn create(&mut self, name: &str) -> isize {
        self.trap_with_str(SYSCALL_CREATE, name)
    }

    pub fn open(&mut self, name: &str) -> isize {
        self.trap_with_str(SYSCALL_OPEN, name)
    }

    pub fn close(&mut self, fd: usize) -> isize {
        self.trap(SYSCALL_CLOSE, [fd, 0, 0, 0])
    }

    /// Write all of `data`, a scratch area at a time. Returns the bytes
    /// written, or the failure sentinel if nothing was.
    pub fn write(&mut self, data: &[u8], fd: usize) -> isize {
        if data.is_empty() {
            return match self.stage(&[]) {
                Ok(va) => self.trap(SYSCALL_WRITE, [va.0, 0, fd, 0]),
                Err(e) => e.sentinel(),
            };
        }
        let mut total = 0;
        for chunk in data.chunks(SCRATCH_SIZE) {
            let ret = match self.stage(chunk) {
                Ok(va) => self.trap(SYSCALL_WRITE, [va.0, chunk.len(), fd, 0]),
                Err(e) => e.sentinel(),
            };
            if ret < 0 {
                return if total > 0 { total } else { ret };
            }
            total += ret;
            if (ret as usize) < chunk.len() {
                break;
            }
        }
        total
    }

    /// Fill `buf` as far as the file allows. Returns the bytes read, or the
    /// failure sentinel if nothing was.
    pub fn read(&mut self, buf: &mut [u8], fd: usize) -> isize {
        let mut total = 0;
        for chunk in buf.chunks_mut(SCRATCH_SIZE) {
            let va = match self.scratch() {
                Ok(va) => va,
                Err(e) => return e.sentinel(),
            };
            let ret = self.trap(SYSCALL_READ, [va.0, chunk.len(), fd, 0]);
            if ret < 0 {
                return if total > 0 { total } else { ret };
            }
            let got = ret as usize;
            match self.read_memory(va, got) {
                Ok(data) => chunk[..got].copy_from_slice(&data),
                Err(e) => return e.sentinel(),
            }
            total += ret;
            if got < chunk.len() {
                break;
            }
        }
        total
    }

    /// Start a child running `entry` on a copy of this process. Returns the
    /// child pid here and 0 is what the child's registers hold.
    pub fn fork<F>(&mut self, entry: F) -> isize
    where F: FnOnce(&mut UserContext) -> isize + Send + 'static
    {
        let token = self.kernel.register_fork_entry(Box::new(entry));
        let ret = self.trap(SYSCALL_FORK, [token, 0, 0, 0]);
        // still registered if the kernel refused before looking at it
        self.kernel.take_fork_entry(token);
        ret
    }

    pub fn yield_now(&mut self) {
        self.trap(SYSCALL_YIELD, [0; NUM_ARGS]);
    }

    pub fn kill(&mut self, pid: usize) -> isize {
        self.trap(SYSCALL_KILL, [pid, 0, 0, 0])
    }
}
