use core::fmt::{self, Debug, Formatter};
use core::ops;

use crate::config::{PAGE_OFFSET, PAGE_SIZE};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct VirtAddr(pub usize);

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct PhysAddr(pub usize);

/// The representation of physical page number.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct PhysPageNum(pub usize);

/// The representation of virtual page number.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct VirtPageNum(pub usize);

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VA<{:#x}>", self.0))
    }
}
impl Debug for VirtPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VPN<{:#x}>", self.0))
    }
}
impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PA<{:#x}>", self.0))
    }
}
impl Debug for PhysPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PPN<{:#x}>", self.0))
    }
}

impl From<usize> for PhysAddr       { fn from(num: usize) -> Self { Self(num) } }
impl From<usize> for VirtAddr       { fn from(num: usize) -> Self { Self(num) } }
impl From<usize> for VirtPageNum    { fn from(num: usize) -> Self { Self(num) } }
impl From<usize> for PhysPageNum    { fn from(num: usize) -> Self { Self(num) } }

impl ops::Add<usize> for VirtAddr {
    type Output = VirtAddr;
    fn add(self, rhs: usize) -> VirtAddr {
        VirtAddr(self.0 + rhs)
    }
}

impl ops::AddAssign<usize> for VirtAddr {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs;
    }
}

impl ops::Sub<VirtAddr> for VirtAddr {
    type Output = usize;
    fn sub(self, rhs: VirtAddr) -> usize {
        self.0 - rhs.0
    }
}

impl ops::Add<usize> for PhysAddr {
    type Output = PhysAddr;
    fn add(self, rhs: usize) -> PhysAddr {
        PhysAddr(self.0 + rhs)
    }
}

impl VirtAddr {
    pub fn to_vpn(&self) -> VirtPageNum {
        VirtPageNum(self.0 >> PAGE_OFFSET)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
}

impl PhysAddr {
    pub fn to_ppn(&self) -> PhysPageNum {
        PhysPageNum(self.0 >> PAGE_OFFSET)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
}

impl VirtPageNum {
    pub fn to_va(&self) -> VirtAddr {
        VirtAddr(self.0 << PAGE_OFFSET)
    }
}

impl PhysPageNum {
    pub fn to_pa(&self) -> PhysAddr {
        PhysAddr(self.0 << PAGE_OFFSET)
    }
}

/// Number of pages needed to hold `bytes`.
pub fn pages_for(bytes: usize) -> usize {
    (bytes + PAGE_SIZE - 1) >> PAGE_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_page_split() {
        let va = VirtAddr(3 * PAGE_SIZE + 5);
        assert_eq!(va.to_vpn(), VirtPageNum(3));
        assert_eq!(va.page_offset(), 5);
        assert_eq!(PhysPageNum(2).to_pa() + 5, PhysAddr(2 * PAGE_SIZE + 5));
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(PAGE_SIZE), 1);
        assert_eq!(pages_for(PAGE_SIZE + 1), 2);
    }
}
