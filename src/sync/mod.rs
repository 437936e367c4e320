mod semaphore;
mod sleep_lock;
mod condvar;

pub use semaphore::Semaphore;
pub use sleep_lock::{SleepLock, SleepMutex};
pub use condvar::Condition;
