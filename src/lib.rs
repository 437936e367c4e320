//! A simulated uniprocessor teaching kernel: cooperative execution contexts
//! with sleeping synchronization, a process tree with fork/exec/exit/join/kill,
//! and three-level file descriptors over a pluggable file store.

#[macro_use]
mod utils;

pub mod config;
pub mod version;
pub mod sync;
pub mod mem;
pub mod fs;
pub mod process;
pub mod syscall;
pub mod kernel;

pub use utils::{
    ErrorNum,
    SpinMutex,
    MutexGuard,
    Mutex,
    LogLevel,
    BitMap,
    XorShift,
    SENTINEL_NOT_FOUND,
    SENTINEL_SELF,
    SENTINEL_EXHAUSTED,
    SENTINEL_NOT_PERMITTED,
    SENTINEL_FAILURE,
};

pub use kernel::{
    Kernel,
    KernelConfig,
    Program,
    ForkEntry,
};
