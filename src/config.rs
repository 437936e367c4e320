use static_assertions::const_assert;

pub const PAGE_OFFSET		: usize = 7;
pub const PAGE_SIZE			: usize = 1 << PAGE_OFFSET;
pub const PHYS_PAGE_COUNT	: usize = 128;
pub const USER_STACK_PAGES	: usize = 8;
/// pages at the very top of a user space used to stage syscall arguments
pub const USER_SCRATCH_PAGES: usize = 2;
pub const MAX_USER_STR		: usize = 256;

pub const MAX_PROCESS		: usize = 16;
pub const MAX_OPEN_FILES	: usize = 32;
pub const MAX_FD			: usize = 16;

pub const CONSOLE_INPUT		: usize = 0;
pub const CONSOLE_OUTPUT	: usize = 1;
pub const CONSOLE_NAME		: &str = "<console>";

/// exit status recorded for a process that was killed
pub const KILLED_STATUS		: isize = 9999;
/// time slice (in ticks) when preemption is enabled without an explicit value
pub const DEFAULT_TIME_SLICE: usize = 100;

const_assert!(PAGE_SIZE.is_power_of_two());
const_assert!(MAX_USER_STR <= USER_SCRATCH_PAGES * PAGE_SIZE);
const_assert!(USER_SCRATCH_PAGES < USER_STACK_PAGES);
const_assert!(CONSOLE_INPUT != CONSOLE_OUTPUT);
const_assert!(CONSOLE_OUTPUT < MAX_FD);
const_assert!(KILLED_STATUS > 0);
