//! Process-wide exit hooks.
//!
//! Hooks registered here are invoked by the journal writer after it has
//! drained its queue on shutdown, in registration order. The writer owns
//! the process signal handler; nothing else should register one.

use std::sync::{Arc, Mutex};

type Hook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

static HOOKS: Mutex<Vec<Hook>> = Mutex::new(Vec::new());

/// Register a hook to run at shutdown, after all queued log records have
/// been written.
pub fn register<F>(hook: F)
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    HOOKS
        .lock()
        .expect("exit hook registry is never poisoned")
        .push(Arc::new(hook));
}

/// Snapshot the registered hooks, in registration order.
pub(crate) fn hooks() -> Vec<Hook> {
    HOOKS
        .lock()
        .expect("exit hook registry is never poisoned")
        .clone()
}
