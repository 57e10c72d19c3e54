use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::Registry;

/// Execution scope handed to the engine: a cancellation token, the type
/// registry used for context-aware decoding, and the runtime the engine
/// spawns its work on.
#[derive(Debug, Clone)]
pub struct Context {
    cancel: CancellationToken,
    registry: Arc<Registry>,
    runtime: Option<Handle>,
}

impl Context {
    /// Root scope. Never cancelled by this crate.
    #[must_use]
    pub fn background(registry: Registry) -> Self {
        Self {
            cancel: CancellationToken::new(),
            registry: Arc::new(registry),
            runtime: None,
        }
    }

    /// Derive a scope that is cancelled with its parent but can be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            registry: Arc::clone(&self.registry),
            runtime: self.runtime.clone(),
        }
    }

    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_cancel_leaves_parent() {
        let root = Context::background(Registry::standard());
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let root = Context::background(Registry::standard());
        let child = root.child();
        let grandchild = child.child();
        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_shares_registry() {
        let root = Context::background(Registry::standard().without_inbound("http"));
        let child = root.child();
        assert!(!child.registry().has_inbound("http"));
        assert!(child.runtime().is_none());
    }
}
