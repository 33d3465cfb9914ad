use std::sync::atomic::{AtomicUsize, Ordering};

/// Terminal out-of-memory funnel.
///
/// Every subsystem capable of allocating holds a shared handle to this
/// rather than reaching for a global. This class of collector does not
/// support continuing past an allocation failure mid-collection.
#[derive(Default)]
pub struct FatalOutOfMemoryHandler;

impl FatalOutOfMemoryHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn oom(&self, reason: &str) -> ! {
        panic!("out of memory: {reason}");
    }
}

/// A grant of committed page memory handed out by a backend. Returning it
/// via [`PageBackend::free_page`] gives the memory back to the substrate.
pub struct PageMemory {
    committed_bytes: usize,
}

impl PageMemory {
    pub(crate) fn new(committed_bytes: usize) -> Self {
        Self { committed_bytes }
    }

    pub fn committed_bytes(&self) -> usize {
        self.committed_bytes
    }
}

/// The page substrate the allocator draws from.
///
/// Injected at heap construction so an instrumented variant (leak detection,
/// quarantining, byte limits) can stand in without the coordinator noticing.
pub trait PageBackend: Send + Sync {
    /// Commits a page of at least `bytes`. `None` means the substrate is
    /// exhausted; the caller routes that through the out-of-memory handler.
    fn allocate_page(&self, bytes: usize) -> Option<PageMemory>;

    /// Returns a page's memory to the substrate.
    fn free_page(&self, memory: PageMemory);

    /// Bytes currently committed through this backend.
    fn committed_bytes(&self) -> usize;
}

/// Default backend: plain byte bookkeeping with an optional commit limit.
pub struct NativePageBackend {
    committed: AtomicUsize,
    limit: usize,
}

impl NativePageBackend {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// A backend that refuses to commit past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            committed: AtomicUsize::new(0),
            limit,
        }
    }
}

impl Default for NativePageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBackend for NativePageBackend {
    fn allocate_page(&self, bytes: usize) -> Option<PageMemory> {
        let mut committed = self.committed.load(Ordering::SeqCst);
        loop {
            let next = committed.checked_add(bytes)?;
            if next > self.limit {
                return None;
            }
            match self.committed.compare_exchange(
                committed,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(PageMemory::new(bytes)),
                Err(current) => committed = current,
            }
        }
    }

    fn free_page(&self, memory: PageMemory) {
        self.committed
            .fetch_sub(memory.committed_bytes(), Ordering::SeqCst);
    }

    fn committed_bytes(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_and_frees_pages() {
        let backend = NativePageBackend::new();

        let page = backend.allocate_page(4096).unwrap();
        assert_eq!(backend.committed_bytes(), 4096);

        backend.free_page(page);
        assert_eq!(backend.committed_bytes(), 0);
    }

    #[test]
    fn limit_exhausts_the_backend() {
        let backend = NativePageBackend::with_limit(8192);

        let first = backend.allocate_page(8192);
        assert!(first.is_some());
        assert!(backend.allocate_page(1).is_none());

        backend.free_page(first.unwrap());
        assert!(backend.allocate_page(1).is_some());
    }
}
