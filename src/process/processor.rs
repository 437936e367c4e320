//! The simulated uniprocessor.
//!
//! Every execution context is backed by a host thread, but only the context
//! the processor has handed the CPU to is allowed to run. Switching is a
//! hand-off through a host mutex + condvar, so kernel state is only ever
//! touched by one context at a time, exactly like a single hart with
//! interrupts as the only source of preemption.
//!
//! Terminating a context (exit, kill, halt) unwinds its host stack with a
//! private payload that `context_main` recognises.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex as HostMutex, MutexGuard as HostGuard};
use std::thread::JoinHandle;

use crate::utils::XorShift;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    Ready,
    Running,
    Blocked,
    Finished,
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// Statistics handed back once the machine stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HaltReport {
    pub ticks       : usize,
    pub switches    : usize,
    pub finished    : usize,
    pub killed      : usize,
    /// contexts still asleep when nothing was left to run
    pub blocked     : usize,
}

/// unwind payload: the running context terminates itself
struct ContextExit;
/// unwind payload: the context was torn down while off the CPU
struct ContextKilled;

struct ContextEntry {
    name            : String,
    status          : ContextStatus,
    int_off_count   : usize,
    /// woken while still on the CPU; the next `sleep` returns at once
    wake_pending    : bool,
}

struct ProcessorInner {
    running         : Option<ContextId>,
    ready           : VecDeque<ContextId>,
    contexts        : BTreeMap<ContextId, ContextEntry>,
    next_id         : usize,
    int_off_count   : usize,
    ticks           : usize,
    switches        : usize,
    next_timer      : Option<usize>,
    rng             : XorShift,
    /// killed contexts whose host stacks are still unwinding
    tearing_down    : usize,
    started         : bool,
    halted          : bool,
    fault           : Option<Box<dyn Any + Send>>,
    handles         : Vec<JoinHandle<()>>,
}

impl ProcessorInner {
    fn has_ready(&self) -> bool {
        self.ready.iter().any(|c| self.contexts.get(c).map(|e| e.status) == Some(ContextStatus::Ready))
    }

    fn status_mut(&mut self, id: ContextId) -> Option<&mut ContextStatus> {
        self.contexts.get_mut(&id).map(|e| &mut e.status)
    }
}

pub struct Processor {
    inner       : HostMutex<ProcessorInner>,
    turn        : Condvar,
    time_slice  : Option<usize>,
    random_slice: bool,
}

#[derive(Clone)]
struct Current {
    processor   : Arc<Processor>,
    id          : ContextId,
    tag         : Option<usize>,
}

thread_local! {
    static CURRENT: RefCell<Option<Current>> = RefCell::new(None);
}

/// The processor the calling context runs on.
///
/// Panics when called from a host thread that is not a simulated context.
pub fn get_processor() -> Arc<Processor> {
    CURRENT.with(|c| c.borrow().as_ref().map(|c| c.processor.clone()))
        .expect("not running on a simulated execution context")
}

pub fn current_context() -> Option<ContextId> {
    CURRENT.with(|c| c.borrow().as_ref().map(|c| c.id))
}

/// Caller-defined tag of the current context; the kernel stores the pid here.
pub fn current_tag() -> Option<usize> {
    CURRENT.with(|c| c.borrow().as_ref().and_then(|c| c.tag))
}

/// Interrupts stay disabled while this is alive.
pub struct IntrGuard<'a> {
    processor: &'a Processor
}

impl Drop for IntrGuard<'_> {
    fn drop(&mut self) {
        self.processor.pop_intr_off();
    }
}

impl Processor {
    /// `time_slice` arms a timer that preempts the running context every
    /// that many ticks; with `random_seed` each slice length is drawn from
    /// `1..=time_slice` instead.
    pub fn new(time_slice: Option<usize>, random_seed: Option<usize>) -> Arc<Self> {
        verbose!("Initializing Processor, time slice {:?}", time_slice);
        let mut rng = XorShift::new(random_seed.unwrap_or(0));
        let next_timer = time_slice.map(|s| if random_seed.is_some() { rng.next_in(s) } else { s.max(1) });
        Arc::new(Self {
            inner: HostMutex::new(ProcessorInner {
                running: None,
                ready: VecDeque::new(),
                contexts: BTreeMap::new(),
                next_id: 1,
                int_off_count: 0,
                ticks: 0,
                switches: 0,
                next_timer,
                rng,
                tearing_down: 0,
                started: false,
                halted: false,
                fault: None,
                handles: Vec::new(),
            }),
            turn: Condvar::new(),
            time_slice,
            random_slice: random_seed.is_some(),
        })
    }

    fn inner(&self) -> HostGuard<'_, ProcessorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: HostGuard<'a, ProcessorInner>) -> HostGuard<'a, ProcessorInner> {
        self.turn.wait(guard).unwrap_or_else(|e| e.into_inner())
    }

    fn current_id(&self) -> ContextId {
        current_context().expect("not running on a simulated execution context")
    }

    /// Create a context that becomes runnable immediately.
    pub fn spawn<F>(self: &Arc<Self>, name: &str, tag: Option<usize>, entry: F) -> ContextId
    where F: FnOnce() + Send + 'static
    {
        let mut inner = self.inner();
        let id = ContextId(inner.next_id);
        inner.next_id += 1;
        inner.contexts.insert(id, ContextEntry {
            name: String::from(name),
            status: ContextStatus::Ready,
            int_off_count: 0,
            wake_pending: false,
        });
        inner.ready.push_back(id);
        let processor = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", name, id.0))
            .spawn(move || processor.context_main(id, tag, entry))
            .expect("cannot spawn host thread for context");
        inner.handles.push(handle);
        debug!("Spawned context {:?} ({})", id, name);
        id
    }

    fn context_main<F: FnOnce()>(self: Arc<Self>, id: ContextId, tag: Option<usize>, entry: F) {
        CURRENT.with(|c| *c.borrow_mut() = Some(Current{processor: self.clone(), id, tag}));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.wait_turn(id);
            entry();
        }));
        match result {
            Ok(()) => self.finish(),
            Err(payload) if payload.is::<ContextExit>() => self.finish(),
            Err(payload) if payload.is::<ContextKilled>() => self.torn_down(id),
            Err(payload) => self.fault(payload),
        }
        CURRENT.with(|c| *c.borrow_mut() = None);
    }

    /// Block the host thread until `id` owns the CPU.
    fn wait_turn(&self, id: ContextId) {
        let mut inner = self.inner();
        loop {
            match inner.contexts.get(&id).map(|e| e.status) {
                Some(ContextStatus::Killed) | None => {
                    drop(inner);
                    panic::resume_unwind(Box::new(ContextKilled));
                },
                _ => {}
            }
            if inner.running == Some(id) {
                break;
            }
            inner = self.wait(inner);
        }
        let entry = inner.contexts.get_mut(&id).expect("running context vanished");
        entry.status = ContextStatus::Running;
        let saved = entry.int_off_count;
        inner.int_off_count = saved;
    }

    /// Hand the CPU to the next ready context. With nothing ready the CPU
    /// idles while torn-down contexts may still release locks (and so wake
    /// someone), and halts otherwise.
    fn dispatch(&self, inner: &mut ProcessorInner) {
        inner.running = None;
        while let Some(next) = inner.ready.pop_front() {
            if let Some(entry) = inner.contexts.get_mut(&next) {
                if entry.status == ContextStatus::Ready {
                    inner.running = Some(next);
                    inner.switches += 1;
                    break;
                }
            }
        }
        if inner.running.is_none() && inner.tearing_down == 0 {
            inner.halted = true;
        }
        self.turn.notify_all();
    }

    fn idle(inner: &ProcessorInner) -> bool {
        inner.started && !inner.halted && inner.running.is_none()
    }

    fn torn_down(&self, id: ContextId) {
        verbose!("Context {:?} torn down", id);
        let mut inner = self.inner();
        inner.tearing_down = inner.tearing_down.saturating_sub(1);
        if Self::idle(&inner) {
            self.dispatch(&mut inner);
        }
    }

    /// Caller has already set its own status; save its interrupt state, give
    /// the CPU away and wait to be scheduled again.
    fn switch_out(&self, mut inner: HostGuard<'_, ProcessorInner>, me: ContextId) {
        let count = inner.int_off_count;
        if let Some(entry) = inner.contexts.get_mut(&me) {
            entry.int_off_count = count;
        }
        self.dispatch(&mut inner);
        drop(inner);
        self.wait_turn(me);
    }

    /// Relinquish the CPU if another context is ready; otherwise return at once.
    pub fn yield_now(&self) {
        let me = self.current_id();
        let mut inner = self.inner();
        if !inner.has_ready() {
            return;
        }
        if let Some(status) = inner.status_mut(me) {
            *status = ContextStatus::Ready;
        }
        inner.ready.push_back(me);
        self.switch_out(inner, me);
    }

    /// Suspend the current context until someone calls `ready_to_run` on it.
    ///
    /// Interrupts must be off; they are off again when this returns.
    pub fn sleep(&self) {
        let me = self.current_id();
        let mut inner = self.inner();
        assert!(inner.int_off_count > 0, "sleep called with interrupts enabled");
        let entry = inner.contexts.get_mut(&me).expect("running context vanished");
        if entry.wake_pending {
            entry.wake_pending = false;
            return;
        }
        entry.status = ContextStatus::Blocked;
        self.switch_out(inner, me);
    }

    /// Put a sleeping context back on the ready queue. Calling this on a
    /// context that is already ready, finished or killed does nothing.
    ///
    /// A context that is woken before it got to `sleep` (only possible when a
    /// torn-down context releases a lock from off the CPU) keeps the wakeup
    /// for its next `sleep`. Returns false if the context can never run again.
    pub fn ready_to_run(&self, id: ContextId) -> bool {
        let mut inner = self.inner();
        let entry = match inner.contexts.get_mut(&id) {
            Some(entry) => entry,
            None => return false,
        };
        match entry.status {
            ContextStatus::Blocked => {
                entry.status = ContextStatus::Ready;
                inner.ready.push_back(id);
                if Self::idle(&inner) {
                    self.dispatch(&mut inner);
                }
                true
            },
            ContextStatus::Running => {
                entry.wake_pending = true;
                true
            },
            ContextStatus::Ready => true,
            ContextStatus::Finished | ContextStatus::Killed => false,
        }
    }

    /// Remove a context from scheduling for good. Its host thread unwinds
    /// without running any more of its code. Returns false if the context
    /// was already gone.
    pub fn unschedule(&self, id: ContextId) -> bool {
        let mut inner = self.inner();
        assert!(inner.running != Some(id), "running context cannot unschedule itself");
        match inner.status_mut(id) {
            Some(status) if matches!(*status, ContextStatus::Ready | ContextStatus::Blocked) => {
                *status = ContextStatus::Killed;
            },
            _ => return false,
        }
        inner.tearing_down += 1;
        inner.ready.retain(|c| *c != id);
        self.turn.notify_all();
        true
    }

    /// Terminate the running context from anywhere on its stack.
    pub fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(ContextExit))
    }

    /// Stop the machine: every other context is torn down, then the caller exits.
    pub fn halt(&self) -> ! {
        let me = self.current_id();
        {
            let mut inner = self.inner();
            let mut killed = 0;
            for (id, entry) in inner.contexts.iter_mut() {
                if *id != me && matches!(entry.status, ContextStatus::Ready | ContextStatus::Blocked) {
                    entry.status = ContextStatus::Killed;
                    killed += 1;
                }
            }
            inner.ready.clear();
            inner.tearing_down += killed;
            self.turn.notify_all();
        }
        milestone!("Machine halt requested by context {:?}", me);
        self.exit_current()
    }

    fn finish(&self) {
        let me = self.current_id();
        let mut inner = self.inner();
        if let Some(status) = inner.status_mut(me) {
            *status = ContextStatus::Finished;
        }
        if inner.running == Some(me) {
            self.dispatch(&mut inner);
        }
    }

    fn fault(&self, payload: Box<dyn Any + Send>) {
        let me = self.current_id();
        fatal!("Context {:?} panicked, halting machine", me);
        let mut inner = self.inner();
        if let Some(status) = inner.status_mut(me) {
            *status = ContextStatus::Finished;
        }
        if inner.fault.is_none() {
            inner.fault = Some(payload);
        }
        inner.running = None;
        inner.halted = true;
        self.turn.notify_all();
    }

    /// Start the machine and block the host thread until nothing can run any
    /// more. A panic raised inside a context is re-raised here.
    pub fn run(&self) -> HaltReport {
        let mut inner = self.inner();
        assert!(!inner.started, "processor already started");
        inner.started = true;
        milestone!("Machine starting with {} context(s)", inner.contexts.len());
        self.dispatch(&mut inner);
        while !inner.halted {
            inner = self.wait(inner);
        }
        let mut report = HaltReport {
            ticks: inner.ticks,
            switches: inner.switches,
            ..Default::default()
        };
        for entry in inner.contexts.values_mut() {
            match entry.status {
                ContextStatus::Finished => report.finished += 1,
                ContextStatus::Killed => report.killed += 1,
                ContextStatus::Blocked => {
                    warning!("Context {} still blocked at halt", entry.name);
                    report.blocked += 1;
                    entry.status = ContextStatus::Killed;
                },
                _ => entry.status = ContextStatus::Killed,
            }
        }
        inner.ready.clear();
        self.turn.notify_all();
        let handles = std::mem::take(&mut inner.handles);
        let fault = inner.fault.take();
        drop(inner);
        for handle in handles {
            let _ = handle.join();
        }
        if let Some(payload) = fault {
            panic::resume_unwind(payload);
        }
        milestone!("Machine halted: {:?}", report);
        report
    }

    /// True if the calling host thread is the context holding the CPU.
    pub fn on_cpu(&self) -> bool {
        let inner = self.inner();
        inner.running.is_some() && inner.running == current_context()
    }

    pub fn status_of(&self, id: ContextId) -> Option<ContextStatus> {
        self.inner().contexts.get(&id).map(|e| e.status)
    }

    // ======================== interrupts ========================

    pub fn level(&self) -> IntrLevel {
        if self.inner().int_off_count == 0 { IntrLevel::On } else { IntrLevel::Off }
    }

    pub fn push_intr_off(&self) {
        let mut inner = self.inner();
        if inner.running.is_none() || inner.running != current_context() {
            return;
        }
        inner.int_off_count += 1;
    }

    pub fn pop_intr_off(&self) {
        let now_on = {
            let mut inner = self.inner();
            // a torn-down context unwinding off the CPU must not touch the level
            if inner.running.is_none() || inner.running != current_context() {
                return;
            }
            assert!(inner.int_off_count >= 1, "unmatched pop_intr_off");
            inner.int_off_count -= 1;
            inner.int_off_count == 0
        };
        if now_on {
            self.one_tick();
        }
    }

    pub fn intr_off(&self) -> IntrGuard<'_> {
        self.push_intr_off();
        IntrGuard { processor: self }
    }

    /// Disable interrupts, returning the previous level for `restore`.
    pub fn disable(&self) -> IntrLevel {
        let prev = self.level();
        self.push_intr_off();
        prev
    }

    pub fn restore(&self, level: IntrLevel) {
        self.pop_intr_off();
        debug_assert!(level == IntrLevel::Off || self.level() == IntrLevel::On, "interrupt level mismatch");
    }

    /// Advance the clock by one tick; the timer may preempt the caller.
    fn one_tick(&self) {
        let preempt = {
            let mut inner = self.inner();
            inner.ticks += 1;
            match (inner.next_timer, self.time_slice) {
                (Some(at), Some(slice)) if inner.ticks >= at => {
                    let next = if self.random_slice { inner.rng.next_in(slice) } else { slice.max(1) };
                    inner.next_timer = Some(inner.ticks + next);
                    true
                },
                _ => false
            }
        };
        if preempt {
            verbose!("Timer interrupt, preempting");
            self.yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::utils::{SpinMutex, Mutex};
    use super::*;

    fn recorder() -> Arc<SpinMutex<Vec<&'static str>>> {
        Arc::new(SpinMutex::new("trace", Vec::new()))
    }

    #[test]
    fn contexts_run_in_fifo_order_and_yield_round_robin() {
        let cpu = Processor::new(None, None);
        let trace = recorder();
        for name in ["a", "b"] {
            let trace = trace.clone();
            cpu.spawn(name, None, move || {
                trace.acquire().push(name);
                get_processor().yield_now();
                trace.acquire().push(name);
            });
        }
        let report = cpu.run();
        assert_eq!(*trace.acquire(), vec!["a", "b", "a", "b"]);
        assert_eq!(report.finished, 2);
        assert_eq!(report.blocked, 0);
    }

    #[test]
    fn sleeping_context_resumes_after_ready_to_run() {
        let cpu = Processor::new(None, None);
        let trace = recorder();
        let t1 = trace.clone();
        let sleeper = cpu.spawn("sleeper", None, move || {
            let cpu = get_processor();
            let _intr = cpu.intr_off();
            t1.acquire().push("sleep");
            cpu.sleep();
            t1.acquire().push("woken");
        });
        let t2 = trace.clone();
        cpu.spawn("waker", None, move || {
            t2.acquire().push("wake");
            let cpu = get_processor();
            assert!(cpu.ready_to_run(sleeper));
            // idempotent
            assert!(cpu.ready_to_run(sleeper));
        });
        cpu.run();
        assert_eq!(*trace.acquire(), vec!["sleep", "wake", "woken"]);
    }

    #[test]
    fn machine_halts_when_everyone_sleeps() {
        let cpu = Processor::new(None, None);
        cpu.spawn("stuck", None, || {
            let cpu = get_processor();
            let _intr = cpu.intr_off();
            cpu.sleep();
            unreachable!();
        });
        let report = cpu.run();
        assert_eq!(report.blocked, 1);
    }

    #[test]
    fn unscheduled_context_never_runs_again() {
        let cpu = Processor::new(None, None);
        let trace = recorder();
        let t1 = trace.clone();
        let victim = cpu.spawn("victim", None, move || {
            t1.acquire().push("victim start");
            get_processor().yield_now();
            t1.acquire().push("victim resumed");
        });
        let t2 = trace.clone();
        cpu.spawn("killer", None, move || {
            let cpu = get_processor();
            assert!(cpu.unschedule(victim));
            assert!(!cpu.unschedule(victim));
            assert_eq!(cpu.status_of(victim), Some(ContextStatus::Killed));
            t2.acquire().push("killer done");
        });
        let report = cpu.run();
        assert_eq!(*trace.acquire(), vec!["victim start", "killer done"]);
        assert_eq!(report.killed, 1);
    }

    #[test]
    fn exit_current_skips_rest_of_context() {
        let cpu = Processor::new(None, None);
        let trace = recorder();
        let t = trace.clone();
        cpu.spawn("quitter", None, move || {
            t.acquire().push("before");
            get_processor().exit_current();
        });
        let report = cpu.run();
        assert_eq!(*trace.acquire(), vec!["before"]);
        assert_eq!(report.finished, 1);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn context_panic_is_reraised_on_host() {
        let cpu = Processor::new(None, None);
        cpu.spawn("bad", None, || panic!("boom"));
        cpu.run();
    }

    #[test]
    fn interrupt_nesting_is_saved_per_context() {
        let cpu = Processor::new(None, None);
        cpu.spawn("nested", None, || {
            let cpu = get_processor();
            let old = cpu.disable();
            assert_eq!(old, IntrLevel::On);
            let inner = cpu.disable();
            assert_eq!(inner, IntrLevel::Off);
            cpu.yield_now();
            assert_eq!(cpu.level(), IntrLevel::Off);
            cpu.restore(inner);
            assert_eq!(cpu.level(), IntrLevel::Off);
            cpu.restore(old);
            assert_eq!(cpu.level(), IntrLevel::On);
        });
        cpu.spawn("other", None, || {
            assert_eq!(get_processor().level(), IntrLevel::On);
        });
        cpu.run();
    }

    #[test]
    fn timer_preempts_busy_context() {
        let cpu = Processor::new(Some(2), None);
        let trace = recorder();
        let t1 = trace.clone();
        cpu.spawn("spinner", None, move || {
            let cpu = get_processor();
            for _ in 0..4 {
                drop(cpu.intr_off());
            }
            t1.acquire().push("spinner");
        });
        let t2 = trace.clone();
        cpu.spawn("other", None, move || {
            t2.acquire().push("other");
        });
        let report = cpu.run();
        assert_eq!(*trace.acquire(), vec!["other", "spinner"]);
        assert!(report.ticks >= 4);
    }
}
