use std::collections::VecDeque;
use std::io::{Read, Write};

use crate::utils::{ErrorNum, SpinMutex, Mutex};

/// Character device behind descriptors 0 and 1.
pub trait Console: Send + Sync {
    /// Read at most `buf.len()` bytes; `0` when no input is left.
    fn read(&self, buf: &mut [u8]) -> Result<usize, ErrorNum>;
    fn write(&self, data: &[u8]) -> Result<usize, ErrorNum>;
}

/// The host process's stdin and stdout.
pub struct StdConsole;

impl Console for StdConsole {
    fn read(&self, buf: &mut [u8]) -> Result<usize, ErrorNum> {
        std::io::stdin().lock().read(buf).map_err(|_| ErrorNum::EIO)
    }

    fn write(&self, data: &[u8]) -> Result<usize, ErrorNum> {
        let mut out = std::io::stdout().lock();
        out.write_all(data).and_then(|_| out.flush()).map_err(|_| ErrorNum::EIO)?;
        Ok(data.len())
    }
}

/// Scripted input and captured output.
pub struct BufferConsole {
    input   : SpinMutex<VecDeque<u8>>,
    output  : SpinMutex<Vec<u8>>,
}

impl BufferConsole {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: SpinMutex::new("console input", input.iter().copied().collect()),
            output: SpinMutex::new("console output", Vec::new()),
        }
    }

    pub fn output(&self) -> Vec<u8> {
        self.output.acquire().clone()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.acquire()).into_owned()
    }
}

impl Console for BufferConsole {
    fn read(&self, buf: &mut [u8]) -> Result<usize, ErrorNum> {
        let mut input = self.input.acquire();
        let len = buf.len().min(input.len());
        for (slot, b) in buf.iter_mut().zip(input.drain(..len)) {
            *slot = b;
        }
        Ok(len)
    }

    fn write(&self, data: &[u8]) -> Result<usize, ErrorNum> {
        self.output.acquire().extend_from_slice(data);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_drains_input() {
        let console = BufferConsole::new(b"abcde");
        let mut buf = [0u8; 3];
        assert_eq!(console.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(console.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"de");
        assert_eq!(console.read(&mut buf).unwrap(), 0);
        console.write(b"hi").unwrap();
        assert_eq!(console.output_string(), "hi");
    }
}
