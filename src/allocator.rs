use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use super::backend::{FatalOutOfMemoryHandler, PageBackend};
use super::header::{ObjectHeader, ObjectRef};
use super::prefinalizer::PreFinalizerRegistry;
use super::space::{Page, RawHeap, PAGE_SIZE};
use super::stats::StatsCollector;

/// The object allocator: routes requests to size-class spaces, bumps the
/// owning space's linear allocation buffer, and draws fresh pages from the
/// injected backend.
///
/// Built over the pre-finalizer registry so it can reject allocation while
/// a forbidding pre-finalizer runs.
pub struct ObjectAllocator {
    raw_heap: Arc<Mutex<RawHeap>>,
    backend: Arc<dyn PageBackend>,
    stats: Arc<StatsCollector>,
    prefinalizers: Arc<PreFinalizerRegistry>,
    oom_handler: Arc<FatalOutOfMemoryHandler>,
    allow_allocations_in_prefinalizers: bool,
    terminated: AtomicBool,
    next_object_id: AtomicU64,
    total_allocated_bytes: AtomicUsize,
}

impl ObjectAllocator {
    pub(crate) fn new(
        raw_heap: Arc<Mutex<RawHeap>>,
        backend: Arc<dyn PageBackend>,
        stats: Arc<StatsCollector>,
        prefinalizers: Arc<PreFinalizerRegistry>,
        oom_handler: Arc<FatalOutOfMemoryHandler>,
        allow_allocations_in_prefinalizers: bool,
    ) -> Self {
        Self {
            raw_heap,
            backend,
            stats,
            prefinalizers,
            oom_handler,
            allow_allocations_in_prefinalizers,
            terminated: AtomicBool::new(false),
            next_object_id: AtomicU64::new(1),
            total_allocated_bytes: AtomicUsize::new(0),
        }
    }

    /// Allocates `size` payload bytes in the matching size-class space.
    ///
    /// The bytes ride the space's LAB and stay invisible to counter-based
    /// accounting until the LAB is flushed.
    pub fn allocate(&self, size: usize) -> ObjectRef {
        let object = self.begin_allocation(size);
        let mut heap = self.raw_heap.lock().unwrap();
        let index = RawHeap::space_index_for(size);
        let space = &mut heap.normal_spaces_mut()[index];

        if space.pages().last().map_or(true, |page| !page.has_room_for(size)) {
            let memory = self.commit_page(size);
            space.pages_mut().push(Page::new(memory));
        }
        space
            .pages_mut()
            .last_mut()
            .expect("a page with room was just ensured")
            .push_header(ObjectHeader::new(object, size));
        space.linear_allocation_buffer_mut().bump(size);

        trace!("allocated object {} ({size} bytes) in space {index}", object.id());
        object
    }

    /// Allocates page-direct into an embedder space; no LAB is involved, so
    /// the bytes are accounted immediately.
    pub fn allocate_in_custom_space(&self, space_index: usize, size: usize) -> ObjectRef {
        let object = self.begin_allocation(size);
        let mut heap = self.raw_heap.lock().unwrap();
        let space = &mut heap.custom_spaces_mut()[space_index];

        if space.pages().last().map_or(true, |page| !page.has_room_for(size)) {
            let memory = self.commit_page(size);
            space.pages_mut().push(Page::new(memory));
        }
        space
            .pages_mut()
            .last_mut()
            .expect("a page with room was just ensured")
            .push_header(ObjectHeader::new(object, size));
        space.add_allocated_bytes(size);
        drop(heap);

        self.stats.notify_object_bytes_accounted(size);
        trace!(
            "allocated object {} ({size} bytes) in custom space {space_index}",
            object.id()
        );
        object
    }

    /// Folds every open LAB back into its space's accounting and the
    /// heap-wide counters. Required before any global byte count is trusted.
    pub fn reset_linear_allocation_buffers(&self) {
        let mut flushed = 0;
        {
            let mut heap = self.raw_heap.lock().unwrap();
            for space in heap.normal_spaces_mut() {
                let bytes = space.linear_allocation_buffer_mut().take();
                space.add_allocated_bytes(bytes);
                flushed += bytes;
            }
        }
        if flushed > 0 {
            debug!("flushed {flushed} bytes of linear allocation buffers");
            self.stats.notify_object_bytes_accounted(flushed);
        }
    }

    /// Irreversibly disables allocation. Called once, at the end of heap
    /// termination.
    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Running total of payload bytes ever allocated; the heap diffs this
    /// around pre-finalizer invocation.
    pub(crate) fn allocated_bytes_total(&self) -> usize {
        self.total_allocated_bytes.load(Ordering::SeqCst)
    }

    fn begin_allocation(&self, size: usize) -> ObjectRef {
        assert!(size > 0, "zero-sized allocation");
        assert!(
            !self.is_terminated(),
            "allocation on a terminated heap"
        );
        if self.prefinalizers.is_invoking() && !self.allow_allocations_in_prefinalizers {
            panic!("allocation inside a pre-finalizer is forbidden");
        }
        self.total_allocated_bytes.fetch_add(size, Ordering::SeqCst);
        ObjectRef::new(self.next_object_id.fetch_add(1, Ordering::SeqCst))
    }

    fn commit_page(&self, size: usize) -> super::backend::PageMemory {
        let committed = PAGE_SIZE.max(size);
        let memory = match self.backend.allocate_page(committed) {
            Some(memory) => memory,
            None => self.oom_handler.oom("page allocation for object failed"),
        };
        self.stats.notify_page_allocated(memory.committed_bytes());
        memory
    }
}
