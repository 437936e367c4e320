//! Counting semaphore with a FIFO wait queue.

use std::collections::VecDeque;

use crate::process::{get_processor, current_context, ContextId, Processor};
use crate::utils::{SpinMutex, Mutex};

pub struct Semaphore {
    name    : String,
    inner   : SpinMutex<SemaphoreInner>,
}

struct SemaphoreInner {
    value   : usize,
    waiters : VecDeque<ContextId>,
}

/// Wake the first waiter that can still run. Killed contexts left in a wait
/// queue are skipped.
pub(super) fn wake_one(processor: &Processor, waiters: &mut VecDeque<ContextId>) -> Option<ContextId> {
    while let Some(ctx) = waiters.pop_front() {
        if processor.ready_to_run(ctx) {
            return Some(ctx);
        }
    }
    None
}

impl Semaphore {
    pub fn new(name: &str, value: usize) -> Self {
        Self {
            name: String::from(name),
            inner: SpinMutex::new(name, SemaphoreInner {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// P(): wait until the value is positive, then decrement it.
    pub fn wait(&self) {
        let processor = get_processor();
        let me = current_context().expect("semaphore wait outside a context");
        let old = processor.disable();
        loop {
            let mut inner = self.inner.acquire();
            if inner.value > 0 {
                inner.value -= 1;
                break;
            }
            inner.waiters.push_back(me);
            drop(inner);
            verbose!("{:?} sleeps on semaphore {}", me, self.name);
            processor.sleep();
        }
        processor.restore(old);
    }

    /// V(): wake one waiter, if any, then increment the value.
    ///
    /// The increment is unconditional; the woken waiter still has to win the
    /// value back in `wait`.
    pub fn signal(&self) {
        let processor = get_processor();
        let old = processor.disable();
        {
            let mut inner = self.inner.acquire();
            wake_one(&processor, &mut inner.waiters);
            inner.value += 1;
        }
        processor.restore(old);
    }

    pub fn value(&self) -> usize {
        self.inner.acquire().value
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }
}
