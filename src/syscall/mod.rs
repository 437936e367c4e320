mod syscall_num;
mod trap_context;
mod syscall;
mod user;

pub use syscall_num::*;

pub use trap_context::{
    TrapContext,
    ExceptionType,
    NUM_GP_REGS,
    REG_SYSCALL,
    REG_ARG0,
    NUM_ARGS,
    INSTR_SIZE,
};

pub use syscall::{
    syscall,
    exception_handler,
};

pub use user::UserContext;
