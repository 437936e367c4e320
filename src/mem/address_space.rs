//! User address spaces and copying between user and kernel memory.

use std::sync::Arc;

use crate::config::{PAGE_SIZE, MAX_USER_STR};
use crate::utils::ErrorNum;
use super::{MemoryManager, MainMemory, VirtAddr, PhysAddr, PhysPageNum};

/// What the process layer needs from a user address space.
pub trait AddressSpace: Send + Sync {
    /// A new space with the same size and contents.
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, ErrorNum>;
    fn is_valid(&self) -> bool;
    fn translate(&self, va: VirtAddr) -> Result<PhysAddr, ErrorNum>;
    fn page_count(&self) -> usize;

    fn size(&self) -> usize {
        self.page_count() * PAGE_SIZE
    }
}

/// Linear page table: virtual page `i` maps to `pages[i]`.
pub struct PagedAddressSpace {
    pages   : Vec<PhysPageNum>,
    memory  : Arc<MemoryManager>,
    main    : Arc<MainMemory>,
}

impl PagedAddressSpace {
    /// Allocate and zero `page_count` pages. If memory runs out the space
    /// gives back what it got and stays invalid.
    pub fn new(memory: Arc<MemoryManager>, main: Arc<MainMemory>, page_count: usize) -> Self {
        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            match memory.allocate_page() {
                Ok(ppn) => {
                    main.zero_page(ppn);
                    pages.push(ppn);
                },
                Err(_) => {
                    warning!("Out of physical pages, wanted {}, got {}", page_count, pages.len());
                    for ppn in pages.drain(..) {
                        let _ = memory.deallocate_page(ppn);
                    }
                    break;
                }
            }
        }
        Self { pages, memory, main }
    }

    /// Allocate a space large enough for `image` plus `extra_pages`, and
    /// copy `image` to virtual address 0.
    pub fn with_image(memory: Arc<MemoryManager>, main: Arc<MainMemory>, image: &[u8], extra_pages: usize) -> Result<Self, ErrorNum> {
        let space = Self::new(memory, main, super::pages_for(image.len()) + extra_pages);
        if !space.is_valid() {
            return Err(ErrorNum::ENOMEM);
        }
        copy_out(&space, &space.main, VirtAddr(0), image)?;
        Ok(space)
    }
}

impl AddressSpace for PagedAddressSpace {
    fn duplicate(&self) -> Result<Box<dyn AddressSpace>, ErrorNum> {
        let copy = Self::new(self.memory.clone(), self.main.clone(), self.pages.len());
        if !copy.is_valid() {
            return Err(ErrorNum::ENOMEM);
        }
        for (src, dst) in self.pages.iter().zip(copy.pages.iter()) {
            self.main.copy_page(*src, *dst);
        }
        Ok(Box::new(copy))
    }

    fn is_valid(&self) -> bool {
        !self.pages.is_empty()
    }

    fn translate(&self, va: VirtAddr) -> Result<PhysAddr, ErrorNum> {
        let ppn = self.pages.get(va.to_vpn().0).ok_or(ErrorNum::EFAULT)?;
        Ok(ppn.to_pa() + va.page_offset())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Drop for PagedAddressSpace {
    fn drop(&mut self) {
        for ppn in self.pages.drain(..) {
            if self.memory.deallocate_page(ppn).is_err() {
                error!("Page {:?} was already free", ppn);
            }
        }
    }
}

/// Copy `len` bytes from user memory at `va`.
pub fn copy_in(space: &dyn AddressSpace, main: &MainMemory, va: VirtAddr, len: usize) -> Result<Vec<u8>, ErrorNum> {
    let mut buf = Vec::with_capacity(len);
    for i in 0..len {
        buf.push(main.read_byte(space.translate(va + i)?)?);
    }
    Ok(buf)
}

/// Copy `data` into user memory at `va`.
pub fn copy_out(space: &dyn AddressSpace, main: &MainMemory, va: VirtAddr, data: &[u8]) -> Result<(), ErrorNum> {
    for (i, b) in data.iter().enumerate() {
        main.write_byte(space.translate(va + i)?, *b)?;
    }
    Ok(())
}

/// Read a NUL-terminated string of at most `MAX_USER_STR` bytes.
pub fn read_user_str(space: &dyn AddressSpace, main: &MainMemory, va: VirtAddr) -> Result<String, ErrorNum> {
    let mut bytes = Vec::new();
    loop {
        let b = main.read_byte(space.translate(va + bytes.len())?)?;
        if b == 0 {
            break;
        }
        bytes.push(b);
        if bytes.len() >= MAX_USER_STR {
            return Err(ErrorNum::EINVAL);
        }
    }
    String::from_utf8(bytes).map_err(|_| ErrorNum::EINVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(pages: usize) -> (Arc<MemoryManager>, Arc<MainMemory>) {
        (Arc::new(MemoryManager::new(pages)), Arc::new(MainMemory::new(pages)))
    }

    #[test]
    fn space_returns_pages_on_drop() {
        let (mm, main) = machine(8);
        {
            let space = PagedAddressSpace::new(mm.clone(), main.clone(), 3);
            assert!(space.is_valid());
            assert_eq!(space.page_count(), 3);
            assert_eq!(mm.free_page_count(), 5);
        }
        assert_eq!(mm.free_page_count(), 8);
    }

    #[test]
    fn exhausted_space_is_invalid_and_holds_nothing() {
        let (mm, main) = machine(4);
        let _keep = PagedAddressSpace::new(mm.clone(), main.clone(), 3);
        let space = PagedAddressSpace::new(mm.clone(), main.clone(), 2);
        assert!(!space.is_valid());
        assert_eq!(mm.free_page_count(), 1);
        assert_eq!(space.translate(VirtAddr(0)), Err(ErrorNum::EFAULT));
    }

    #[test]
    fn duplicate_copies_contents_into_fresh_pages() {
        let (mm, main) = machine(8);
        let space = PagedAddressSpace::with_image(mm.clone(), main.clone(), b"hello", 1).unwrap();
        let copy = space.duplicate().unwrap();
        assert_eq!(copy.page_count(), space.page_count());
        assert_ne!(copy.translate(VirtAddr(0)), space.translate(VirtAddr(0)));
        assert_eq!(copy_in(copy.as_ref(), &main, VirtAddr(0), 5).unwrap(), b"hello");
        copy_out(copy.as_ref(), &main, VirtAddr(0), b"j").unwrap();
        assert_eq!(copy_in(&space, &main, VirtAddr(0), 1).unwrap(), b"h");
    }

    #[test]
    fn duplicate_fails_without_memory() {
        let (mm, main) = machine(3);
        let space = PagedAddressSpace::new(mm.clone(), main.clone(), 2);
        assert_eq!(space.duplicate().err(), Some(ErrorNum::ENOMEM));
        assert_eq!(mm.free_page_count(), 1);
    }

    #[test]
    fn user_strings() {
        let (mm, main) = machine(8);
        let space = PagedAddressSpace::new(mm, main.clone(), 4);
        copy_out(&space, &main, VirtAddr(10), b"a.txt\0").unwrap();
        assert_eq!(read_user_str(&space, &main, VirtAddr(10)).unwrap(), "a.txt");
        copy_out(&space, &main, VirtAddr(0), &[b'x'; 300]).unwrap();
        assert_eq!(read_user_str(&space, &main, VirtAddr(0)), Err(ErrorNum::EINVAL));
        assert_eq!(read_user_str(&space, &main, VirtAddr(4 * PAGE_SIZE)), Err(ErrorNum::EFAULT));
    }
}
