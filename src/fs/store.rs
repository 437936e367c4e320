//! Byte stores behind named files.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::utils::{ErrorNum, SpinMutex, Mutex};

/// An open connection to one file's bytes.
pub trait StoreHandle: Send + Sync {
    /// Returns the number of bytes read, `0` at or past the end.
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, ErrorNum>;
    /// Writing past the end grows the file.
    fn write_at(&self, data: &[u8], offset: usize) -> Result<usize, ErrorNum>;
    fn length(&self) -> usize;
}

pub trait FileStore: Send + Sync {
    /// Create `name` with `initial_size` zero bytes, truncating an existing file.
    fn create(&self, name: &str, initial_size: usize) -> Result<(), ErrorNum>;
    fn open(&self, name: &str) -> Result<Box<dyn StoreHandle>, ErrorNum>;
}

type MemFile = Arc<SpinMutex<Vec<u8>>>;

/// Files kept in host memory.
pub struct MemFileStore {
    files: SpinMutex<BTreeMap<String, MemFile>>,
}

impl Default for MemFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFileStore {
    pub fn new() -> Self {
        Self {
            files: SpinMutex::new("MemFileStore", BTreeMap::new()),
        }
    }

    /// Create or replace `name` with the given contents.
    pub fn insert(&self, name: &str, contents: &[u8]) {
        let mut files = self.files.acquire();
        match files.get(name) {
            Some(file) => *file.acquire() = contents.to_vec(),
            None => {
                files.insert(String::from(name), Arc::new(SpinMutex::new(name, contents.to_vec())));
            }
        }
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.acquire().get(name).map(|f| f.acquire().clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.acquire().contains_key(name)
    }
}

impl FileStore for MemFileStore {
    fn create(&self, name: &str, initial_size: usize) -> Result<(), ErrorNum> {
        if name.is_empty() {
            return Err(ErrorNum::EINVAL);
        }
        self.insert(name, &vec![0u8; initial_size]);
        Ok(())
    }

    fn open(&self, name: &str) -> Result<Box<dyn StoreHandle>, ErrorNum> {
        let file = self.files.acquire().get(name).cloned().ok_or(ErrorNum::ENOENT)?;
        Ok(Box::new(MemHandle { file }))
    }
}

struct MemHandle {
    file: MemFile,
}

impl StoreHandle for MemHandle {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, ErrorNum> {
        let data = self.file.acquire();
        if offset >= data.len() {
            return Ok(0);
        }
        let len = buf.len().min(data.len() - offset);
        buf[..len].copy_from_slice(&data[offset..offset + len]);
        Ok(len)
    }

    fn write_at(&self, src: &[u8], offset: usize) -> Result<usize, ErrorNum> {
        let mut data = self.file.acquire();
        if data.len() < offset + src.len() {
            data.resize(offset + src.len(), 0);
        }
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(src.len())
    }

    fn length(&self) -> usize {
        self.file.acquire().len()
    }
}

/// Files in a directory of the host file system.
pub struct HostFileStore {
    root: PathBuf,
}

impl HostFileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, ErrorNum> {
        if name.is_empty() || name.contains("..") {
            return Err(ErrorNum::EINVAL);
        }
        Ok(self.root.join(name))
    }
}

fn io_error(e: std::io::Error) -> ErrorNum {
    match e.kind() {
        ErrorKind::NotFound => ErrorNum::ENOENT,
        ErrorKind::PermissionDenied => ErrorNum::EPERM,
        _ => ErrorNum::EIO,
    }
}

impl FileStore for HostFileStore {
    fn create(&self, name: &str, initial_size: usize) -> Result<(), ErrorNum> {
        let file = std::fs::File::create(self.path_of(name)?).map_err(io_error)?;
        file.set_len(initial_size as u64).map_err(io_error)
    }

    fn open(&self, name: &str) -> Result<Box<dyn StoreHandle>, ErrorNum> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path_of(name)?)
            .map_err(io_error)?;
        Ok(Box::new(HostHandle { file: SpinMutex::new(name, file) }))
    }
}

struct HostHandle {
    file: SpinMutex<std::fs::File>,
}

impl StoreHandle for HostHandle {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, ErrorNum> {
        let mut file = self.file.acquire();
        file.seek(SeekFrom::Start(offset as u64)).map_err(io_error)?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]).map_err(io_error)? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }

    fn write_at(&self, data: &[u8], offset: usize) -> Result<usize, ErrorNum> {
        let mut file = self.file.acquire();
        file.seek(SeekFrom::Start(offset as u64)).map_err(io_error)?;
        file.write_all(data).map_err(io_error)?;
        Ok(data.len())
    }

    fn length(&self) -> usize {
        self.file.acquire().metadata().map(|m| m.len() as usize).unwrap_or(0)
    }
}
