//! Blocking, non-reentrant mutual exclusion.

use core::cell::UnsafeCell;
use std::collections::VecDeque;

use crate::process::{get_processor, current_context, ContextId};
use crate::utils::{SpinMutex, Mutex, MutexGuard};
use super::semaphore::wake_one;

/// A lock whose waiters sleep instead of spinning. The owner is the
/// execution context that acquired it; only the owner may release it.
pub struct SleepLock {
    name    : String,
    inner   : SpinMutex<LockInner>,
}

struct LockInner {
    owner   : Option<ContextId>,
    waiters : VecDeque<ContextId>,
}

impl SleepLock {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            inner: SpinMutex::new(name, LockInner {
                owner: None,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Re-acquiring a lock the caller already holds never returns.
    pub fn acquire(&self) {
        let processor = get_processor();
        let me = current_context().expect("lock acquire outside a context");
        let _intr = processor.intr_off();
        loop {
            let mut inner = self.inner.acquire();
            if inner.owner.is_none() {
                inner.owner = Some(me);
                return;
            }
            inner.waiters.push_back(me);
            drop(inner);
            processor.sleep();
        }
    }

    pub fn release(&self) {
        let processor = get_processor();
        let me = current_context();
        let _intr = processor.intr_off();
        let mut inner = self.inner.acquire();
        if processor.on_cpu() {
            assert!(inner.owner.is_some() && inner.owner == me,
                "lock {} released by {:?}, held by {:?}", self.name, me, inner.owner);
        } else if inner.owner.is_none() || inner.owner != me {
            // torn-down context unwinding past a lock it gave up earlier
            return;
        }
        inner.owner = None;
        wake_one(&processor, &mut inner.waiters);
    }

    pub fn is_held_by_current(&self) -> bool {
        let me = current_context();
        let inner = self.inner.acquire();
        me.is_some() && inner.owner == me
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }
}

/// Data guarded by a `SleepLock`, handed out through the crate's `Mutex`
/// interface so it reads like `SpinMutex` at the call site.
pub struct SleepMutex<T> {
    lock    : SleepLock,
    data    : UnsafeCell<T>,
}

impl<T> SleepMutex<T> {
    pub fn new(name: &str, data: T) -> Self {
        Self {
            lock: SleepLock::new(name),
            data: UnsafeCell::new(data),
        }
    }

    /// The underlying lock, for waiting on a `Condition` while a guard is held.
    pub fn raw(&self) -> &SleepLock {
        &self.lock
    }

    pub fn is_held_by_current(&self) -> bool {
        self.lock.is_held_by_current()
    }
}

impl<T> Mutex<T> for SleepMutex<T> {
    fn acquire(&self) -> MutexGuard<'_, T> {
        self.lock.acquire();
        MutexGuard::new(self)
    }

    fn release(&self) {
        self.lock.release()
    }

    fn get_data(&self) -> &mut T {
        unsafe {&mut *self.data.get()}
    }

    fn get_name(&self) -> String {
        self.lock.get_name()
    }
}

unsafe impl<T> Send for SleepMutex<T> where T: Send {}
unsafe impl<T> Sync for SleepMutex<T> where T: Send {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::process::{Processor, get_processor};
    use crate::utils::{SpinMutex, Mutex};
    use super::*;

    #[test]
    fn only_one_holder_under_preemption() {
        let cpu = Processor::new(Some(3), Some(0x5eed));
        let lock = Arc::new(SleepMutex::new("counter", 0usize));
        let inside = Arc::new(SpinMutex::new("inside", 0usize));
        for _ in 0..4 {
            let (lock, inside) = (lock.clone(), inside.clone());
            cpu.spawn("worker", None, move || {
                for _ in 0..20 {
                    let mut guard = lock.acquire();
                    *inside.acquire() += 1;
                    assert_eq!(*inside.acquire(), 1);
                    let seen = *guard;
                    // give the timer a chance to fire while holding the lock
                    drop(get_processor().intr_off());
                    get_processor().yield_now();
                    *guard = seen + 1;
                    *inside.acquire() -= 1;
                }
            });
        }
        let report = cpu.run();
        assert_eq!(report.blocked, 0);
        let check = Processor::new(None, None);
        let l = lock.clone();
        check.spawn("check", None, move || assert_eq!(*l.acquire(), 80));
        check.run();
    }

    #[test]
    fn waiters_acquire_in_request_order() {
        let cpu = Processor::new(None, None);
        let lock = Arc::new(SleepLock::new("l"));
        let trace = Arc::new(SpinMutex::new("trace", Vec::new()));
        for i in 0..3 {
            let (lock, trace) = (lock.clone(), trace.clone());
            cpu.spawn("contender", None, move || {
                lock.acquire();
                assert!(lock.is_held_by_current());
                trace.acquire().push(i);
                get_processor().yield_now();
                lock.release();
                assert!(!lock.is_held_by_current());
            });
        }
        cpu.run();
        assert_eq!(*trace.acquire(), vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "released by")]
    fn release_by_non_owner_is_fatal() {
        let cpu = Processor::new(None, None);
        let lock = Arc::new(SleepLock::new("l"));
        let l1 = lock.clone();
        cpu.spawn("owner", None, move || {
            l1.acquire();
            get_processor().yield_now();
        });
        let l2 = lock.clone();
        cpu.spawn("thief", None, move || l2.release());
        cpu.run();
    }

    #[test]
    fn reacquire_deadlocks_the_owner() {
        let cpu = Processor::new(None, None);
        cpu.spawn("selfish", None, || {
            let lock = SleepLock::new("l");
            lock.acquire();
            lock.acquire();
            unreachable!();
        });
        assert_eq!(cpu.run().blocked, 1);
    }
}
