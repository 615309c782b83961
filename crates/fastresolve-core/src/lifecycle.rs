//! Process-wide exit hooks.
//!
//! Long-lived resources (file watches) register a teardown here; the host
//! process runs all hooks once before exiting. Each hook runs at most once.

use parking_lot::{const_mutex, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

type Hook = Box<dyn FnOnce() + Send>;

static HOOKS: Mutex<Vec<(u64, Hook)>> = const_mutex(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying a registered hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Register `hook` to run when [`run_exit_hooks`] is called.
pub fn install_exit_hook(hook: impl FnOnce() + Send + 'static) -> HookId {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    HOOKS.lock().push((id, Box::new(hook)));
    HookId(id)
}

/// Deregister a hook without running it. Returns whether it was registered.
pub fn remove_exit_hook(id: HookId) -> bool {
    let mut hooks = HOOKS.lock();
    let before = hooks.len();
    hooks.retain(|(hook_id, _)| *hook_id != id.0);
    hooks.len() != before
}

/// Run and clear every registered hook, most recent first.
///
/// Returns the number of hooks run.
pub fn run_exit_hooks() -> usize {
    // Hooks may deregister themselves, so never run them under the lock
    let hooks = std::mem::take(&mut *HOOKS.lock());
    let count = hooks.len();
    for (_, hook) in hooks.into_iter().rev() {
        hook();
    }
    debug!(count, "Ran exit hooks");
    count
}

/// Number of hooks currently registered.
#[must_use]
pub fn pending_exit_hooks() -> usize {
    HOOKS.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    // Hooks are process-global; keep every assertion in one test.
    #[test]
    fn test_install_remove_run() {
        let ran = Arc::new(AtomicUsize::new(0));

        let a = {
            let ran = Arc::clone(&ran);
            install_exit_hook(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
        };
        let b = {
            let ran = Arc::clone(&ran);
            install_exit_hook(move || {
                ran.fetch_add(10, Ordering::SeqCst);
            })
        };

        assert!(remove_exit_hook(a));
        assert!(!remove_exit_hook(a));

        assert!(run_exit_hooks() >= 1);
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert!(!remove_exit_hook(b));
    }
}
