use std::sync::Arc;

use crate::fs::FileDescriptor;
use crate::kernel::Kernel;
use crate::mem::VirtAddr;
use crate::process::{ExitStatus, ProcessID};
use crate::utils::ErrorNum;
use super::syscall_num::*;
use super::{ExceptionType, TrapContext};

macro_rules! CALL_SYSCALL {
    ( $kernel: expr, $syscall_name: ident ) => {
        {
            debug!("/========== SYSCALL {} CALLED ==========\\", stringify!($syscall_name));
            let ret = $syscall_name($kernel);
            debug!("\\= SYSCALL {} RESULT {:<10?} =/", stringify!($syscall_name), ret);
            ret
        }
    };
    ( $kernel: expr, $syscall_name: ident, $($y:expr),+ ) => {
        {
            debug!("SYSCALL {} CALLED", stringify!($syscall_name));
            $(
                verbose!("{:>25} = {:?}", stringify!{$y}, $y);
            )+
            let ret = $syscall_name($kernel, $($y),+);
            debug!("SYSCALL {} RESULT {:?}", stringify!($syscall_name), ret);
            ret
        }
    };
}

/// Entry point for every user-mode exception. Syscalls are dispatched and
/// their result stored in the return register; any other exception kills
/// the process that raised it.
pub fn exception_handler(kernel: &Arc<Kernel>, which: ExceptionType, tc: &mut TrapContext) {
    match which {
        ExceptionType::NoException => {},
        ExceptionType::Syscall => {
            let syscall_id = tc.syscall_id();
            let ret = syscall(kernel, syscall_id, tc.args(), tc);
            tc.set_result(match ret {
                Ok(value) => value as isize,
                Err(err) => {
                    debug!("syscall {} failed: {}", syscall_id, err);
                    err.sentinel()
                },
            });
            tc.increment_pc();
        },
        other => {
            error!("Unexpected user mode exception {:?} at pc {:#x}", other, tc.pc);
            match kernel.current_process() {
                Ok(pcb) => kernel.exit(&pcb, ExitStatus::Killed),
                Err(_) => kernel.processor().exit_current(),
            }
        },
    }
}

pub fn syscall(kernel: &Arc<Kernel>, syscall_id: usize, args: [usize; 4], tc: &TrapContext) -> Result<usize, ErrorNum> {
    match syscall_id {
        SYSCALL_HALT    => CALL_SYSCALL!(kernel, sys_halt   ),
        SYSCALL_EXIT    => CALL_SYSCALL!(kernel, sys_exit   , args[0] as isize),
        SYSCALL_EXEC    => CALL_SYSCALL!(kernel, sys_exec   , VirtAddr::from(args[0])),
        SYSCALL_JOIN    => CALL_SYSCALL!(kernel, sys_join   , ProcessID(args[0])),
        SYSCALL_CREATE  => CALL_SYSCALL!(kernel, sys_create , VirtAddr::from(args[0])),
        SYSCALL_OPEN    => CALL_SYSCALL!(kernel, sys_open   , VirtAddr::from(args[0])),
        SYSCALL_READ    => CALL_SYSCALL!(kernel, sys_read   , VirtAddr::from(args[0]), args[1], FileDescriptor::from(args[2])),
        SYSCALL_WRITE   => CALL_SYSCALL!(kernel, sys_write  , VirtAddr::from(args[0]), args[1], FileDescriptor::from(args[2])),
        SYSCALL_CLOSE   => CALL_SYSCALL!(kernel, sys_close  , FileDescriptor::from(args[0])),
        SYSCALL_FORK    => CALL_SYSCALL!(kernel, sys_fork   , args[0], *tc),
        SYSCALL_YIELD   => CALL_SYSCALL!(kernel, sys_yield  ),
        SYSCALL_KILL    => CALL_SYSCALL!(kernel, sys_kill   , ProcessID(args[0])),
        _ => CALL_SYSCALL!(kernel, sys_unknown, syscall_id)
    }
}

pub fn sys_halt(kernel: &Arc<Kernel>) -> Result<usize, ErrorNum> {
    milestone!("Shutdown requested by {:?}", kernel.current_process().map(|p| p.pid));
    kernel.processor().halt()
}

pub fn sys_exit(kernel: &Arc<Kernel>, exit_code: isize) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    kernel.exit(&proc, ExitStatus::Exited(exit_code))
}

pub fn sys_exec(kernel: &Arc<Kernel>, name: VirtAddr) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    let name = kernel.read_user_str(&proc, name)?;
    match kernel.exec(&proc, &name)? {}
}

pub fn sys_join(kernel: &Arc<Kernel>, pid: ProcessID) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    kernel.join(&proc, pid).map(|status| status as usize)
}

pub fn sys_create(kernel: &Arc<Kernel>, name: VirtAddr) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    let name = kernel.read_user_str(&proc, name)?;
    kernel.create(&name)?;
    Ok(0)
}

pub fn sys_open(kernel: &Arc<Kernel>, name: VirtAddr) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    let name = kernel.read_user_str(&proc, name)?;
    kernel.open(&proc, &name).map(|fd| fd.0)
}

pub fn sys_read(kernel: &Arc<Kernel>, buf: VirtAddr, length: usize, fd: FileDescriptor) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    kernel.check_user_buffer(&proc, buf, length)?;
    let data = kernel.read(&proc, fd, length)?;
    kernel.copy_out(&proc, buf, &data)?;
    Ok(data.len())
}

pub fn sys_write(kernel: &Arc<Kernel>, buf: VirtAddr, length: usize, fd: FileDescriptor) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    let data = kernel.copy_in(&proc, buf, length)?;
    kernel.write(&proc, fd, &data)
}

pub fn sys_close(kernel: &Arc<Kernel>, fd: FileDescriptor) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    kernel.close(&proc, fd)?;
    Ok(0)
}

/// `entry` names the code the child starts in, registered by the caller
/// before trapping.
pub fn sys_fork(kernel: &Arc<Kernel>, entry: usize, tc: TrapContext) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    let entry = kernel.take_fork_entry(entry).ok_or(ErrorNum::EINVAL)?;
    kernel.fork(&proc, tc, entry).map(|pid| pid.0)
}

pub fn sys_yield(kernel: &Arc<Kernel>) -> Result<usize, ErrorNum> {
    kernel.processor().yield_now();
    Ok(0)
}

pub fn sys_kill(kernel: &Arc<Kernel>, pid: ProcessID) -> Result<usize, ErrorNum> {
    let proc = kernel.current_process()?;
    kernel.kill(&proc, pid)?;
    Ok(0)
}

pub fn sys_unknown(_kernel: &Arc<Kernel>, syscall_id: usize) -> Result<usize, ErrorNum> {
    error!("Unknown syscall {}", syscall_id);
    Err(ErrorNum::ENOSYS)
}
