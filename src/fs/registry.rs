use std::sync::Arc;

use crate::config::CONSOLE_NAME;
use crate::sync::SleepMutex;
use crate::utils::{ErrorNum, Mutex, MutexGuard};
use super::{FileNode, NodeBacking, FileStore, Console};

/// Deduplicating registry of live file nodes: at most one node per name.
pub struct FileNodeRegistry {
    store   : Arc<dyn FileStore>,
    console : Arc<FileNode>,
    nodes   : SleepMutex<Vec<Arc<FileNode>>>,
}

impl FileNodeRegistry {
    pub fn new(store: Arc<dyn FileStore>, console: Arc<dyn Console>) -> Self {
        Self {
            store,
            console: Arc::new(FileNode::new(CONSOLE_NAME, NodeBacking::Console(console))),
            nodes: SleepMutex::new("FileNodeRegistry", Vec::new()),
        }
    }

    pub(super) fn lock_nodes(&self) -> MutexGuard<'_, Vec<Arc<FileNode>>> {
        self.nodes.acquire()
    }

    /// The live node for `name`, or a new uncounted one over a freshly opened
    /// store handle (`true`). Opening may block, so nothing changes here.
    pub(super) fn find_or_open(&self, nodes: &[Arc<FileNode>], name: &str) -> Result<(Arc<FileNode>, bool), ErrorNum> {
        if let Some(node) = nodes.iter().find(|n| n.get_name() == name) {
            return Ok((node.clone(), false));
        }
        let handle = self.store.open(name)?;
        Ok((Arc::new(FileNode::new(name, NodeBacking::Store(handle))), true))
    }

    /// Count one more binding of `node`, registering it if it is fresh.
    pub(super) fn commit_bind(nodes: &mut Vec<Arc<FileNode>>, node: &Arc<FileNode>, fresh: bool) {
        let count = node.increase_ref();
        if fresh {
            nodes.push(node.clone());
            debug!("File node {} opened, {} live", node.get_name(), nodes.len());
        } else {
            verbose!("File node {} shared, ref count {}", node.get_name(), count);
        }
    }

    /// Drop one binding; the node leaves the registry with its last one.
    pub(super) fn commit_release(nodes: &mut Vec<Arc<FileNode>>, node: &Arc<FileNode>) {
        let remaining = node.decrease_ref();
        if remaining > 0 || node.is_console() {
            return;
        }
        let before = nodes.len();
        nodes.retain(|n| !Arc::ptr_eq(n, node));
        assert_eq!(before, nodes.len() + 1, "file node {} missing from registry", node.get_name());
        debug!("File node {} closed, {} live", node.get_name(), nodes.len());
    }

    /// The existing node for `name` with one more reference, or a freshly
    /// opened one.
    pub fn bind(&self, name: &str) -> Result<Arc<FileNode>, ErrorNum> {
        let mut nodes = self.lock_nodes();
        let (node, fresh) = self.find_or_open(&nodes, name)?;
        Self::commit_bind(&mut nodes, &node, fresh);
        Ok(node)
    }

    /// The console node, which is never removed.
    pub fn bind_console(&self) -> Arc<FileNode> {
        let mut nodes = self.lock_nodes();
        Self::commit_bind(&mut nodes, &self.console, false);
        self.console.clone()
    }

    /// Drop one reference; the node is removed once nobody refers to it, and
    /// its store handle closes when the last holder lets go.
    pub fn release(&self, node: &Arc<FileNode>) {
        let mut nodes = self.lock_nodes();
        Self::commit_release(&mut nodes, node);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FileNode>> {
        self.nodes.acquire().iter().find(|n| n.get_name() == name).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.acquire().len()
    }

    pub fn console(&self) -> &Arc<FileNode> {
        &self.console
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }
}
