mod types;
mod memory_manager;
mod address_space;

pub use types::{
    VirtAddr,
    PhysAddr,
    VirtPageNum,
    PhysPageNum,
    pages_for,
};

pub use memory_manager::{
    MemoryManager,
    MainMemory,
};

pub use address_space::{
    AddressSpace,
    PagedAddressSpace,
    copy_in,
    copy_out,
    read_user_str,
};
