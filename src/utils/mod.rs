#[macro_use]
pub mod marcos;

mod fmt_io;
mod lock;
mod error;
mod bitmap;
mod random;
pub mod time;

pub use lock::{
    SpinMutex,
    MutexGuard,
    Mutex,
};

pub use fmt_io::{
    print_no_lock,
    log,
    LogLevel,
};

pub use error::{
    ErrorNum,
    SENTINEL_NOT_FOUND,
    SENTINEL_SELF,
    SENTINEL_EXHAUSTED,
    SENTINEL_NOT_PERMITTED,
    SENTINEL_FAILURE,
};

pub use bitmap::BitMap;
pub use random::XorShift;
