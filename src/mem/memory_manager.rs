//! Physical pages of the simulated machine.

use crate::config::PAGE_SIZE;
use crate::utils::{BitMap, ErrorNum, SpinMutex, Mutex};
use super::{PhysAddr, PhysPageNum};

/// Tracks which physical pages are handed out.
pub struct MemoryManager {
    pages: SpinMutex<BitMap>,
}

impl MemoryManager {
    pub fn new(page_count: usize) -> Self {
        verbose!("Initializing MemoryManager with {} pages", page_count);
        Self {
            pages: SpinMutex::new("MemoryManager", BitMap::new(page_count)),
        }
    }

    pub fn allocate_page(&self) -> Result<PhysPageNum, ErrorNum> {
        match self.pages.acquire().find() {
            Some(idx) => Ok(PhysPageNum(idx)),
            None => Err(ErrorNum::ENOMEM),
        }
    }

    /// Freeing a page that is not allocated is an error.
    pub fn deallocate_page(&self, ppn: PhysPageNum) -> Result<(), ErrorNum> {
        let mut pages = self.pages.acquire();
        if ppn.0 >= pages.len() || !pages.test(ppn.0) {
            return Err(ErrorNum::EINVAL);
        }
        pages.clear(ppn.0);
        Ok(())
    }

    pub fn free_page_count(&self) -> usize {
        self.pages.acquire().num_clear()
    }

    pub fn page_count(&self) -> usize {
        self.pages.acquire().len()
    }
}

/// Byte-addressed backing store for every physical page.
pub struct MainMemory {
    bytes: SpinMutex<Vec<u8>>,
}

impl MainMemory {
    pub fn new(page_count: usize) -> Self {
        Self {
            bytes: SpinMutex::new("MainMemory", vec![0u8; page_count * PAGE_SIZE]),
        }
    }

    pub fn read_byte(&self, pa: PhysAddr) -> Result<u8, ErrorNum> {
        self.bytes.acquire().get(pa.0).copied().ok_or(ErrorNum::EFAULT)
    }

    pub fn write_byte(&self, pa: PhysAddr, value: u8) -> Result<(), ErrorNum> {
        let mut bytes = self.bytes.acquire();
        let slot = bytes.get_mut(pa.0).ok_or(ErrorNum::EFAULT)?;
        *slot = value;
        Ok(())
    }

    pub fn zero_page(&self, ppn: PhysPageNum) {
        let start = ppn.to_pa().0;
        self.bytes.acquire()[start..start + PAGE_SIZE].fill(0);
    }

    pub fn copy_page(&self, src: PhysPageNum, dst: PhysPageNum) {
        let (src, dst) = (src.to_pa().0, dst.to_pa().0);
        self.bytes.acquire().copy_within(src..src + PAGE_SIZE, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_handed_out_once() {
        let mm = MemoryManager::new(3);
        let a = mm.allocate_page().unwrap();
        let b = mm.allocate_page().unwrap();
        let c = mm.allocate_page().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(mm.allocate_page(), Err(ErrorNum::ENOMEM));
        assert_eq!(mm.free_page_count(), 0);
        mm.deallocate_page(b).unwrap();
        assert_eq!(mm.deallocate_page(b), Err(ErrorNum::EINVAL));
        assert_eq!(mm.allocate_page(), Ok(b));
    }

    #[test]
    fn main_memory_pages() {
        let mem = MainMemory::new(2);
        mem.write_byte(PhysAddr(1), 42).unwrap();
        mem.copy_page(PhysPageNum(0), PhysPageNum(1));
        assert_eq!(mem.read_byte(PhysAddr(PAGE_SIZE + 1)), Ok(42));
        mem.zero_page(PhysPageNum(0));
        assert_eq!(mem.read_byte(PhysAddr(1)), Ok(0));
        assert_eq!(mem.read_byte(PhysAddr(2 * PAGE_SIZE)), Err(ErrorNum::EFAULT));
    }
}
