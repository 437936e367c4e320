pub const NUM_GP_REGS   : usize = 32;
/// syscall number on entry, return value on exit
pub const REG_SYSCALL   : usize = 2;
pub const REG_ARG0      : usize = 4;
pub const NUM_ARGS      : usize = 4;
pub const INSTR_SIZE    : usize = 4;

enum_with_tryfrom_usize!(
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ExceptionType {
        NoException     = 0,
        Syscall         = 1,
        PageFault       = 2,
        ReadOnly        = 3,
        BusError        = 4,
        AddressError    = 5,
        Overflow        = 6,
        IllegalInstr    = 7,
    }
);

/// User register file saved on a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapContext {
    pub regs    : [usize; NUM_GP_REGS],
    pub pc      : usize,
    pub prev_pc : usize,
    pub next_pc : usize,
}

impl TrapContext {
    pub fn new(entry: usize) -> Self {
        Self {
            regs: [0; NUM_GP_REGS],
            pc: entry,
            prev_pc: entry,
            next_pc: entry + INSTR_SIZE,
        }
    }

    pub fn syscall_id(&self) -> usize {
        self.regs[REG_SYSCALL]
    }

    pub fn args(&self) -> [usize; NUM_ARGS] {
        let mut args = [0; NUM_ARGS];
        args.copy_from_slice(&self.regs[REG_ARG0..REG_ARG0 + NUM_ARGS]);
        args
    }

    pub fn set_syscall(&mut self, id: usize, args: [usize; NUM_ARGS]) {
        self.regs[REG_SYSCALL] = id;
        self.regs[REG_ARG0..REG_ARG0 + NUM_ARGS].copy_from_slice(&args);
    }

    pub fn set_result(&mut self, value: isize) {
        self.regs[REG_SYSCALL] = value as usize;
    }

    pub fn result(&self) -> isize {
        self.regs[REG_SYSCALL] as isize
    }

    /// Step past the trapping instruction so the syscall is not re-executed.
    pub fn increment_pc(&mut self) {
        self.prev_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc += INSTR_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use core::convert::TryFrom;
    use crate::utils::ErrorNum;
    use super::*;

    #[test]
    fn registers_and_pc() {
        let mut tc = TrapContext::new(0x100);
        tc.set_syscall(7, [1, 2, 3, 4]);
        assert_eq!(tc.syscall_id(), 7);
        assert_eq!(tc.args(), [1, 2, 3, 4]);
        tc.set_result(-3);
        assert_eq!(tc.result(), -3);
        tc.increment_pc();
        assert_eq!((tc.prev_pc, tc.pc, tc.next_pc), (0x100, 0x104, 0x108));
    }

    #[test]
    fn exception_codes() {
        assert_eq!(ExceptionType::try_from(1), Ok(ExceptionType::Syscall));
        assert_eq!(ExceptionType::try_from(5), Ok(ExceptionType::AddressError));
        assert_eq!(ExceptionType::try_from(42), Err(ErrorNum::ENOSYS));
    }
}
