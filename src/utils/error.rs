use core::fmt;

/// Kernel-wide error numbers.
///
/// Syscalls hand these back to user programs as one of a few negative
/// sentinels, see [`ErrorNum::sentinel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorNum {
    /// operation not permitted (e.g. joining a process that is not your child)
    EPERM,
    /// no such file
    ENOENT,
    /// no such process
    ESRCH,
    /// bad file descriptor
    EBADF,
    /// process table exhausted
    EAGAIN,
    /// not enough physical memory for an address space
    ENOMEM,
    /// user address cannot be translated
    EFAULT,
    /// system-wide open description table exhausted
    ENFILE,
    /// per-process descriptor table exhausted
    EMFILE,
    EINVAL,
    /// underlying store reported a failure
    EIO,
    ENOSYS,
    /// operation targets the caller itself
    ESELF,
}

pub const SENTINEL_NOT_FOUND    : isize = -1;
pub const SENTINEL_SELF         : isize = -2;
pub const SENTINEL_EXHAUSTED    : isize = -3;
pub const SENTINEL_NOT_PERMITTED: isize = -4;
pub const SENTINEL_FAILURE      : isize = -5;

impl ErrorNum {
    /// Return code seen by user programs.
    pub fn sentinel(&self) -> isize {
        match self {
            ErrorNum::ESRCH | ErrorNum::ENOENT | ErrorNum::EBADF => SENTINEL_NOT_FOUND,
            ErrorNum::ESELF => SENTINEL_SELF,
            ErrorNum::EAGAIN | ErrorNum::ENFILE | ErrorNum::EMFILE | ErrorNum::ENOMEM => SENTINEL_EXHAUSTED,
            ErrorNum::EPERM => SENTINEL_NOT_PERMITTED,
            _ => SENTINEL_FAILURE,
        }
    }

    pub fn is_exhaustion(&self) -> bool {
        self.sentinel() == SENTINEL_EXHAUSTED
    }
}

impl fmt::Display for ErrorNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let desc = match self {
            ErrorNum::EPERM     => "operation not permitted",
            ErrorNum::ENOENT    => "no such file",
            ErrorNum::ESRCH     => "no such process",
            ErrorNum::EBADF     => "bad file descriptor",
            ErrorNum::EAGAIN    => "process table full",
            ErrorNum::ENOMEM    => "out of physical pages",
            ErrorNum::EFAULT    => "bad user address",
            ErrorNum::ENFILE    => "open file table full",
            ErrorNum::EMFILE    => "descriptor table full",
            ErrorNum::EINVAL    => "invalid argument",
            ErrorNum::EIO       => "i/o error",
            ErrorNum::ENOSYS    => "no such syscall",
            ErrorNum::ESELF     => "operation targets the caller",
        };
        write!(f, "{:?}: {}", self, desc)
    }
}

impl std::error::Error for ErrorNum {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct_per_category() {
        let cats = [
            ErrorNum::ESRCH.sentinel(),
            ErrorNum::ESELF.sentinel(),
            ErrorNum::EAGAIN.sentinel(),
            ErrorNum::EPERM.sentinel(),
        ];
        for (i, a) in cats.iter().enumerate() {
            assert!(*a < 0);
            for b in &cats[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(ErrorNum::EBADF.sentinel(), ErrorNum::ENOENT.sentinel());
        assert!(ErrorNum::EMFILE.is_exhaustion());
        assert!(!ErrorNum::EIO.is_exhaustion());
    }
}
