use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{Ordering, AtomicBool};

/// Common interface of every lock that owns its data.
///
/// `acquire` hands out a guard; the guard calls `release` when dropped.
pub trait Mutex<T> {
    fn acquire(&self) -> MutexGuard<'_, T>;
    fn release(&self);
    #[allow(clippy::mut_from_ref)]
    fn get_data(&self) -> &mut T;
    fn get_name(&self) -> String;
}

pub struct MutexGuard<'a, T> {
    mutex: &'a dyn Mutex<T>
}

impl<'a, T> MutexGuard<'a, T> {
    pub fn new(mutex: &'a dyn Mutex<T>) -> Self {
        Self { mutex }
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.mutex.get_data()
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.mutex.get_data()
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release()
    }
}

/// Busy-waiting lock for short state that is never held across a context switch.
///
/// On the simulated uniprocessor only one context runs at a time, so these are
/// never contended by kernel code; they exist to make the state shareable
/// between the host threads backing the contexts. Holding one while calling
/// anything that may sleep or yield deadlocks the machine.
#[derive(Debug)]
pub struct SpinMutex<T> {
    is_acquired : AtomicBool,
    name        : String,
    data        : UnsafeCell<T>,
}

impl<T> SpinMutex<T> {
    pub fn new(name: &str, data: T) -> Self {
        Self {
            is_acquired: AtomicBool::new(false),
            name: String::from(name),
            data: UnsafeCell::new(data)
        }
    }
}

impl<T> Mutex<T> for SpinMutex<T> {
    fn acquire(&self) -> MutexGuard<'_, T> {
        while self.is_acquired.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            core::hint::spin_loop();
        }
        MutexGuard{mutex: self}
    }

    fn release(&self) {
        self.is_acquired.store(false, Ordering::Release)
    }

    fn get_data(&self) -> &mut T {
        unsafe {&mut *self.data.get()}
    }

    fn get_name(&self) -> String{
        self.name.clone()
    }
}

unsafe impl<T> Send for SpinMutex<T> where T: Send {}
unsafe impl<T> Sync for SpinMutex<T> where T: Send {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    #[test]
    fn spin_mutex_serializes_host_threads() {
        let counter = Arc::new(SpinMutex::new("counter", 0usize));
        let handles: Vec<_> = (0..4).map(|_| {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    *counter.acquire() += 1;
                }
            })
        }).collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*counter.acquire(), 4000);
        assert_eq!(counter.get_name(), "counter");
    }
}
