//! Post-update handler registry.
//!
//! Handlers are appended at startup and read on every request. The list is
//! copy-on-write: `register` swaps in a new `Arc<[..]>` under the write
//! lock, `snapshot` clones the current `Arc` so iteration never holds the
//! lock while handlers run.

use std::sync::{Arc, RwLock};

use reqmetrics_core::event::RequestEvent;
use reqmetrics_core::labels::LabelSet;
use reqmetrics_core::Result;

/// Callback run after the request metrics are updated for an event.
pub trait ControllerHandler: Send + Sync {
    fn call(&self, event: &RequestEvent, labels: &LabelSet) -> Result<()>;
}

impl<F> ControllerHandler for F
where
    F: Fn(&RequestEvent, &LabelSet) -> Result<()> + Send + Sync,
{
    fn call(&self, event: &RequestEvent, labels: &LabelSet) -> Result<()> {
        self(event, labels)
    }
}

/// Append-only, ordered handler list. No removal.
pub struct HandlerRegistry {
    handlers: RwLock<Arc<[Arc<dyn ControllerHandler>]>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn register(&self, handler: Arc<dyn ControllerHandler>) {
        let mut guard = self.handlers.write().unwrap_or_else(|p| p.into_inner());
        let mut next: Vec<Arc<dyn ControllerHandler>> = guard.iter().cloned().collect();
        next.push(handler);
        *guard = Arc::from(next);
    }

    /// Handlers in registration order, as of this call.
    pub fn snapshot(&self) -> Arc<[Arc<dyn ControllerHandler>]> {
        Arc::clone(&self.handlers.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
