//! Syscall numbers, generated by build.rs from syscall_num.csv.
pub const SYSCALL_HALT      : usize =   0;
pub const SYSCALL_EXIT      : usize =   1;
pub const SYSCALL_EXEC      : usize =   2;
pub const SYSCALL_JOIN      : usize =   3;
pub const SYSCALL_CREATE    : usize =   4;
pub const SYSCALL_OPEN      : usize =   5;
pub const SYSCALL_READ      : usize =   6;
pub const SYSCALL_WRITE     : usize =   7;
pub const SYSCALL_CLOSE     : usize =   8;
pub const SYSCALL_FORK      : usize =   9;
pub const SYSCALL_YIELD     : usize =  10;
pub const SYSCALL_KILL      : usize =  11;
