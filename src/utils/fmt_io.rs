use std::io::Write as _;
use core::fmt::{self, Write};
use lazy_static::*;

use crate::process::{current_context, current_tag};
use crate::utils::time::get_time_second;

use super::{SpinMutex, Mutex};

// ======================== color constants ========================
const FG_B_BLACK    :u8 = 90;
const FG_B_RED      :u8 = 91;
const FG_B_GREEN    :u8 = 92;
const FG_B_YELLOW   :u8 = 93;
const FG_B_WHITE    :u8 = 97;
const FG_DEFAULT    :u8 = 39;

const BG_RED        :u8 = 41;
const BG_DEFAULT    :u8 = 49;

lazy_static!{
    /// dummy data member
    static ref PRINT_LOCK: SpinMutex<bool> = SpinMutex::new("KPuts", false);
}

// ======================== functions ========================
pub fn k_puts(s: &str) {
    // eprint! keeps the output inside the test harness capture
    std::eprint!("{}", s);
    let _ = std::io::stderr().flush();
}

struct OutputFormatter;

impl Write for OutputFormatter {
	fn write_str(&mut self, s: &str) -> fmt::Result {
		k_puts(s);
		Ok(())
	}
}

pub fn print_no_lock(args: fmt::Arguments) {
    let _ = OutputFormatter.write_fmt(args);
}

#[derive(PartialEq, PartialOrd, Clone, Copy, Debug)]
pub enum LogLevel {
    Verbose = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Milestone = 5,
    Fatal = 6
}

impl LogLevel {
    pub fn to_num(&self) -> usize {
        *self as usize
    }

    pub fn enabled(&self) -> bool {
        match self {
            LogLevel::Verbose   => cfg!(feature = "log_verbose"),
            LogLevel::Debug     => cfg!(feature = "log_debug"),
            LogLevel::Info      => cfg!(feature = "log_info"),
            LogLevel::Warning   => cfg!(feature = "log_warning"),
            LogLevel::Error     => cfg!(feature = "log_error"),
            LogLevel::Milestone => cfg!(feature = "log_milestone"),
            LogLevel::Fatal     => cfg!(feature = "log_fatal"),
        }
    }
}

static LOG_FG_COLOURS: &[u8] = &[
    FG_B_BLACK,
    FG_DEFAULT,
    FG_B_WHITE,
    FG_B_YELLOW,
    FG_B_RED,
    FG_B_GREEN,
    FG_B_WHITE
];

static LOG_BG_COLOURS: &[u8] = &[
    BG_DEFAULT,
    BG_DEFAULT,
    BG_DEFAULT,
    BG_DEFAULT,
    BG_DEFAULT,
    BG_DEFAULT,
    BG_RED
];

static LOG_TITLE: &[&str] = &[
    "VERBOSE    ",
    "DEBUG      ",
    "INFO       ",
    "WARNING    ",
    "ERROR      ",
    "MILESTONE  ",
    "FATAL      ",
];

pub fn do_log(log_level: LogLevel, args: fmt::Arguments) {
    let _guard = PRINT_LOCK.acquire();
    let ctx = current_context().map(|c| c.0 as isize).unwrap_or(-1);
    let pid = current_tag().map(|p| p as isize).unwrap_or(-1);
    print_no_lock!(
        "\x1b[{};{}m[ {:>8.5} ] {} c {:>2} p {:>2} : ",
        LOG_FG_COLOURS[log_level.to_num()],
        LOG_BG_COLOURS[log_level.to_num()],
        get_time_second(),
        LOG_TITLE[log_level.to_num()],
        ctx,
        pid
    );
    print_no_lock(args);
    print_no_lock!("\x1b[{};{}m\n", FG_DEFAULT, BG_DEFAULT)
}

pub fn log(log_level: LogLevel, args: fmt::Arguments) {
    if log_level.enabled() {
        do_log(log_level, args);
    }
}

#[cfg(test)]
mod tests {
    use super::LogLevel;

    #[test]
    fn log_levels_chain() {
        // every enabled level implies all the more severe ones
        let levels = [
            LogLevel::Verbose, LogLevel::Debug, LogLevel::Info, LogLevel::Warning,
            LogLevel::Error, LogLevel::Milestone, LogLevel::Fatal,
        ];
        for (i, lvl) in levels.iter().enumerate() {
            if lvl.enabled() {
                assert!(levels[i..].iter().all(|l| l.enabled()), "{:?}", lvl);
            }
        }
    }
}
