use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;

/// A last-chance cleanup callback tied to an object's lifetime, run before
/// reclamation. Invoked at most once; drained from the registry as it runs.
pub struct PreFinalizer {
    name: &'static str,
    callback: Box<dyn FnOnce() + Send>,
}

impl PreFinalizer {
    pub fn new(name: &'static str, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            callback: Box::new(callback),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Registry of pre-finalizers, invoked in reverse registration order.
///
/// Registration during invocation is legal and lands in the next round's
/// list, which is what lets finalization logic re-arm itself (and resurrect
/// roots) across termination rounds.
pub struct PreFinalizerRegistry {
    ordered: Mutex<Vec<PreFinalizer>>,
    invoking: AtomicBool,
    bytes_allocated_in_last_invocation: AtomicUsize,
}

impl PreFinalizerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            ordered: Mutex::new(Vec::new()),
            invoking: AtomicBool::new(false),
            bytes_allocated_in_last_invocation: AtomicUsize::new(0),
        }
    }

    pub fn register(&self, pre_finalizer: PreFinalizer) {
        self.ordered.lock().unwrap().push(pre_finalizer);
    }

    pub fn count(&self) -> usize {
        self.ordered.lock().unwrap().len()
    }

    /// True while `invoke_all` is running a callback. The allocator consults
    /// this to enforce the allocation ban inside pre-finalizers.
    pub fn is_invoking(&self) -> bool {
        self.invoking.load(Ordering::SeqCst)
    }

    /// Drains the registry and runs every callback. The list lock is not
    /// held while callbacks run, so callbacks may register.
    pub(crate) fn invoke_all(&self) {
        let drained = std::mem::take(&mut *self.ordered.lock().unwrap());
        if drained.is_empty() {
            return;
        }

        debug!("invoking {} pre-finalizer(s)", drained.len());
        self.invoking.store(true, Ordering::SeqCst);
        for pre_finalizer in drained.into_iter().rev() {
            debug!("pre-finalizer: {}", pre_finalizer.name());
            (pre_finalizer.callback)();
        }
        self.invoking.store(false, Ordering::SeqCst);
    }

    /// Byte volume allocated while the last `invoke_all` ran. Feeds the
    /// embedder's allocation heuristics.
    pub fn bytes_allocated_in_last_invocation(&self) -> usize {
        self.bytes_allocated_in_last_invocation
            .load(Ordering::SeqCst)
    }

    pub(crate) fn set_bytes_allocated_in_last_invocation(&self, bytes: usize) {
        self.bytes_allocated_in_last_invocation
            .store(bytes, Ordering::SeqCst);
    }
}
