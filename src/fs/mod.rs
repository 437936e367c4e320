mod store;
mod console;
mod node;
mod registry;
mod description;
mod table;
mod fd_table;

pub use store::{
    StoreHandle,
    FileStore,
    MemFileStore,
    HostFileStore,
};

pub use console::{
    Console,
    StdConsole,
    BufferConsole,
};

pub use node::{
    FileNode,
    NodeBacking,
};

pub use registry::FileNodeRegistry;

pub use description::{
    OpenDescription,
    OpenMode,
    Cursor,
};

pub use table::{
    OpenDescriptionTable,
    OpenTarget,
};

pub use fd_table::{
    FileDescriptor,
    FileDescriptorTable,
};
