mod processor;
mod pcb;
mod manager;

pub use processor::{
    Processor,
    ContextId,
    ContextStatus,
    IntrLevel,
    IntrGuard,
    HaltReport,
    get_processor,
    current_context,
    current_tag,
};

pub use pcb::{
    ProcessControlBlock,
    PCBInner,
    ExitStatus,
};

pub use manager::{
    ProcessManager,
    ProcessID,
    JoinPolicy,
};
