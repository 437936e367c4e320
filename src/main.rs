//! Boots a small demo workload on the simulator: the init process greets
//! on the console, forks a worker that writes a file, joins it, reads the
//! file back and halts the machine.
//!
//! With a directory argument, files live on the host under that directory
//! instead of in memory.

use std::sync::Arc;

use parch_sim::config::{CONSOLE_OUTPUT, KILLED_STATUS};
use parch_sim::fs::{FileStore, HostFileStore, MemFileStore, StdConsole};
use parch_sim::syscall::UserContext;
use parch_sim::{Kernel, KernelConfig};

fn init(user: &mut UserContext) -> isize {
    user.write(b"init: hello from the simulated kernel", CONSOLE_OUTPUT);
    if user.create("greeting.txt") < 0 {
        return 1;
    }
    let child = user.fork(|child: &mut UserContext| {
        let fd = child.open("greeting.txt");
        if fd < 0 {
            return fd;
        }
        child.write(b"written by the worker", fd as usize);
        child.close(fd as usize);
        0
    });
    if child < 0 {
        user.write(b"init: fork failed", CONSOLE_OUTPUT);
        return 2;
    }
    let status = user.join(child as usize);
    let line = match status {
        KILLED_STATUS => String::from("init: worker was killed"),
        status => format!("init: worker {} exited with {}", child, status),
    };
    user.write(line.as_bytes(), CONSOLE_OUTPUT);

    let fd = user.open("greeting.txt");
    let mut buf = [0u8; 64];
    let len = user.read(&mut buf, fd as usize);
    if len > 0 {
        let text = String::from_utf8_lossy(&buf[..len as usize]).into_owned();
        user.write(format!("init: file says \"{}\"", text).as_bytes(), CONSOLE_OUTPUT);
    }
    user.close(fd as usize);
    user.halt()
}

fn main() {
    let store: Arc<dyn FileStore> = match std::env::args().nth(1) {
        Some(dir) => Arc::new(HostFileStore::new(dir)),
        None => Arc::new(MemFileStore::new()),
    };
    let kernel = Kernel::new(KernelConfig::default(), store, Arc::new(StdConsole));
    if let Err(e) = kernel.install_program("init", b"init image", init) {
        eprintln!("cannot install init: {}", e);
        std::process::exit(1);
    }
    let report = kernel.boot("init");
    println!("{:?}", report);
}
