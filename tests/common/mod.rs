#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use parch_sim::fs::{BufferConsole, FileStore, MemFileStore};
use parch_sim::process::HaltReport;
use parch_sim::syscall::UserContext;
use parch_sim::{Kernel, KernelConfig};

pub struct Machine {
    pub kernel  : Arc<Kernel>,
    pub store   : Arc<MemFileStore>,
    pub console : Arc<BufferConsole>,
}

impl Machine {
    pub fn new(config: KernelConfig) -> Self {
        Self::with_input(config, b"")
    }

    pub fn with_input(config: KernelConfig, input: &[u8]) -> Self {
        Self::build(config, input, |store| store)
    }

    /// The kernel sees `wrap(store)`; `store` stays reachable for checks.
    pub fn with_store<W>(config: KernelConfig, wrap: W) -> Self
    where W: FnOnce(Arc<dyn FileStore>) -> Arc<dyn FileStore>
    {
        Self::build(config, b"", wrap)
    }

    fn build<W>(config: KernelConfig, input: &[u8], wrap: W) -> Self
    where W: FnOnce(Arc<dyn FileStore>) -> Arc<dyn FileStore>
    {
        let store = Arc::new(MemFileStore::new());
        let console = Arc::new(BufferConsole::new(input));
        let dyn_store: Arc<dyn FileStore> = store.clone();
        let kernel = Kernel::new(config, wrap(dyn_store), console.clone());
        Self { kernel, store, console }
    }

    pub fn install<F>(&self, name: &str, program: F)
    where F: Fn(&mut UserContext) -> isize + Send + Sync + 'static
    {
        self.kernel.install_program(name, name.as_bytes(), program).unwrap();
    }

    /// Install `init` and run it to completion.
    pub fn run<F>(&self, init: F) -> HaltReport
    where F: Fn(&mut UserContext) -> isize + Send + Sync + 'static
    {
        self.install("init", init);
        self.kernel.boot("init")
    }
}

/// Values recorded by user programs, checked once the machine stopped.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<isize>>>);

impl Log {
    pub fn push(&self, value: isize) {
        self.0.lock().unwrap().push(value);
    }

    pub fn values(&self) -> Vec<isize> {
        self.0.lock().unwrap().clone()
    }
}
