//! Mesa-style condition variable.
//!
//! A wakeup is only a hint: the woken context re-contends for the lock and
//! must re-check its predicate.

use std::collections::VecDeque;

use crate::process::{get_processor, current_context, ContextId};
use crate::utils::{SpinMutex, Mutex};
use super::semaphore::wake_one;
use super::SleepLock;

pub struct Condition {
    name    : String,
    waiters : SpinMutex<VecDeque<ContextId>>,
}

impl Condition {
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            waiters: SpinMutex::new(name, VecDeque::new()),
        }
    }

    /// Release `lock`, sleep until signalled, then take `lock` again.
    pub fn wait(&self, lock: &SleepLock) {
        assert!(lock.is_held_by_current(),
            "condition {} waited on without holding {}", self.name, lock.get_name());
        let processor = get_processor();
        let me = current_context().expect("condition wait outside a context");
        {
            let _intr = processor.intr_off();
            self.waiters.acquire().push_back(me);
            lock.release();
            processor.sleep();
        }
        lock.acquire();
    }

    pub fn signal(&self, lock: &SleepLock) {
        assert!(lock.is_held_by_current(),
            "condition {} signalled without holding {}", self.name, lock.get_name());
        let processor = get_processor();
        let _intr = processor.intr_off();
        wake_one(&processor, &mut self.waiters.acquire());
    }

    pub fn broadcast(&self, lock: &SleepLock) {
        assert!(lock.is_held_by_current(),
            "condition {} broadcast without holding {}", self.name, lock.get_name());
        let processor = get_processor();
        let _intr = processor.intr_off();
        let mut waiters = self.waiters.acquire();
        while wake_one(&processor, &mut waiters).is_some() {}
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.acquire().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::process::{Processor, get_processor};
    use crate::sync::SleepMutex;
    use crate::utils::{SpinMutex, Mutex};
    use super::*;

    #[test]
    fn broadcast_wakes_all_holding_the_lock() {
        let cpu = Processor::new(None, None);
        let state = Arc::new(SleepMutex::new("flag", false));
        let cond = Arc::new(Condition::new("flag set"));
        let trace = Arc::new(SpinMutex::new("trace", Vec::new()));
        for i in 0..3 {
            let (state, cond, trace) = (state.clone(), cond.clone(), trace.clone());
            cpu.spawn("waiter", None, move || {
                let guard = state.acquire();
                while !*guard {
                    cond.wait(state.raw());
                    assert!(state.is_held_by_current());
                }
                trace.acquire().push(i);
            });
        }
        let (s, c) = (state.clone(), cond.clone());
        cpu.spawn("setter", None, move || {
            let mut guard = s.acquire();
            assert_eq!(c.waiter_count(), 3);
            *guard = true;
            c.broadcast(s.raw());
        });
        let report = cpu.run();
        assert_eq!(*trace.acquire(), vec![0, 1, 2]);
        assert_eq!(report.blocked, 0);
    }

    #[test]
    fn signal_wakes_exactly_one() {
        let cpu = Processor::new(None, None);
        let state = Arc::new(SleepMutex::new("tokens", 0usize));
        let cond = Arc::new(Condition::new("token ready"));
        let served = Arc::new(SpinMutex::new("served", 0usize));
        for _ in 0..2 {
            let (state, cond, served) = (state.clone(), cond.clone(), served.clone());
            cpu.spawn("consumer", None, move || {
                let mut guard = state.acquire();
                while *guard == 0 {
                    cond.wait(state.raw());
                }
                *guard -= 1;
                *served.acquire() += 1;
            });
        }
        let (s, c) = (state.clone(), cond.clone());
        cpu.spawn("producer", None, move || {
            let mut guard = s.acquire();
            *guard += 1;
            c.signal(s.raw());
        });
        let report = cpu.run();
        assert_eq!(*served.acquire(), 1);
        assert_eq!(report.blocked, 1);
    }

    #[test]
    fn signal_before_wait_is_lost() {
        let cpu = Processor::new(None, None);
        cpu.spawn("early", None, || {
            let lock = SleepLock::new("l");
            let cond = Condition::new("c");
            lock.acquire();
            cond.signal(&lock);
            cond.wait(&lock);
            unreachable!();
        });
        assert_eq!(cpu.run().blocked, 1);
    }

    #[test]
    #[should_panic(expected = "without holding")]
    fn wait_without_lock_is_fatal() {
        let cpu = Processor::new(None, None);
        cpu.spawn("careless", None, || {
            let lock = SleepLock::new("l");
            Condition::new("c").wait(&lock);
        });
        cpu.run();
    }

    #[test]
    fn waiter_yields_cpu_between_signal_and_reacquire() {
        let cpu = Processor::new(None, None);
        let lock = Arc::new(SleepLock::new("l"));
        let cond = Arc::new(Condition::new("c"));
        let trace = Arc::new(SpinMutex::new("trace", Vec::new()));
        let (l1, c1, t1) = (lock.clone(), cond.clone(), trace.clone());
        cpu.spawn("waiter", None, move || {
            l1.acquire();
            c1.wait(&l1);
            t1.acquire().push("waiter back");
            l1.release();
        });
        let (l2, c2, t2) = (lock.clone(), cond.clone(), trace.clone());
        cpu.spawn("signaller", None, move || {
            l2.acquire();
            c2.signal(&l2);
            t2.acquire().push("signaller still holds");
            get_processor().yield_now();
            t2.acquire().push("signaller releases");
            l2.release();
        });
        cpu.run();
        assert_eq!(*trace.acquire(), vec!["signaller still holds", "signaller releases", "waiter back"]);
    }
}
