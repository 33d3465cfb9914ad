use std::cell::{RefCell, RefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use super::allocator::ObjectAllocator;
use super::backend::{FatalOutOfMemoryHandler, NativePageBackend, PageBackend};
use super::config::HeapConfig;
use super::header::{ObjectHeader, ObjectView};
use super::persistent::{CrossThreadPersistentRegions, PersistentRegion, RootStrength};
use super::prefinalizer::PreFinalizerRegistry;
use super::remembered_set::RememberedSet;
use super::space::{CustomSpace, NormalSpace, RawHeap};
use super::stats::{
    collect_detailed_statistics, CollectionType, DetailLevel, HeapStatistics, StatsCollector,
};
use super::sweeper::{CompactableSpaceHandling, Sweep, Sweeper, SweepingConfig, SweepingType};
use super::visitor::{traverse, HeapVisitor};

const MAX_TERMINATION_GCS: usize = 20;

/// The heap lifecycle coordinator.
///
/// Owns every subsystem of the heap for its entire lifetime: the page
/// backend, statistics collector, pre-finalizer registry, object allocator,
/// sweeper, the four persistent root regions, and (on generational heaps)
/// the remembered set. All phase sequencing runs on the single owning
/// thread; the only cross-thread state is the pair of cross-thread root
/// regions behind their shared lock, and whatever the sweeper runs on its
/// background worker.
pub struct Heap {
    config: HeapConfig,
    raw_heap: Arc<Mutex<RawHeap>>,
    page_backend: Arc<dyn PageBackend>,
    oom_handler: Arc<FatalOutOfMemoryHandler>,
    stats: Arc<StatsCollector>,
    prefinalizers: Arc<PreFinalizerRegistry>,
    allocator: Arc<ObjectAllocator>,
    sweeper: Arc<dyn Sweep>,
    strong_persistents: PersistentRegion,
    weak_persistents: PersistentRegion,
    cross_thread_persistents: Arc<CrossThreadPersistentRegions>,
    remembered_set: Option<RefCell<RememberedSet>>,
    in_atomic_pause: AtomicBool,
    no_gc_depth: AtomicUsize,
    disallow_gc_depth: AtomicUsize,
    terminated: AtomicBool,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Self {
        Self::with_page_backend(config, Arc::new(NativePageBackend::new()))
    }

    /// Builds the heap over an injected page substrate, e.g. an
    /// instrumented backend for leak hunting.
    pub fn with_page_backend(config: HeapConfig, page_backend: Arc<dyn PageBackend>) -> Self {
        Self::build(config, page_backend, None)
    }

    /// Builds the heap with a substituted sweeper.
    pub fn with_sweeper(
        config: HeapConfig,
        page_backend: Arc<dyn PageBackend>,
        sweeper: Arc<dyn Sweep>,
    ) -> Self {
        Self::build(config, page_backend, Some(sweeper))
    }

    fn build(
        config: HeapConfig,
        page_backend: Arc<dyn PageBackend>,
        sweeper: Option<Arc<dyn Sweep>>,
    ) -> Self {
        let oom_handler = Arc::new(FatalOutOfMemoryHandler::new());
        let raw_heap = Arc::new(Mutex::new(RawHeap::new(&config.custom_spaces)));
        let stats = Arc::new(StatsCollector::new());
        let prefinalizers = Arc::new(PreFinalizerRegistry::new());
        let allocator = Arc::new(ObjectAllocator::new(
            raw_heap.clone(),
            page_backend.clone(),
            stats.clone(),
            prefinalizers.clone(),
            oom_handler.clone(),
            config.allow_allocations_in_prefinalizers,
        ));
        let sweeper = sweeper.unwrap_or_else(|| {
            Arc::new(Sweeper::new(
                raw_heap.clone(),
                page_backend.clone(),
                stats.clone(),
                config.sweeping_support,
            ))
        });
        let remembered_set = config
            .generational
            .then(|| RefCell::new(RememberedSet::new()));

        Self {
            config,
            raw_heap,
            page_backend,
            oom_handler,
            stats,
            prefinalizers,
            allocator,
            sweeper,
            strong_persistents: PersistentRegion::new(RootStrength::Strong),
            weak_persistents: PersistentRegion::new(RootStrength::Weak),
            cross_thread_persistents: Arc::new(CrossThreadPersistentRegions::new()),
            remembered_set,
            in_atomic_pause: AtomicBool::new(false),
            no_gc_depth: AtomicUsize::new(0),
            disallow_gc_depth: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Shared handle to the object allocator.
    pub fn allocator(&self) -> Arc<ObjectAllocator> {
        self.allocator.clone()
    }

    pub fn page_backend(&self) -> &dyn PageBackend {
        self.page_backend.as_ref()
    }

    pub fn oom_handler(&self) -> &FatalOutOfMemoryHandler {
        &self.oom_handler
    }

    pub fn sweeper(&self) -> &dyn Sweep {
        self.sweeper.as_ref()
    }

    /// Shared handle to the pre-finalizer registry; callbacks registered
    /// here run before reclamation.
    pub fn prefinalizers(&self) -> Arc<PreFinalizerRegistry> {
        self.prefinalizers.clone()
    }

    pub fn strong_persistents(&self) -> &PersistentRegion {
        &self.strong_persistents
    }

    pub fn weak_persistents(&self) -> &PersistentRegion {
        &self.weak_persistents
    }

    /// Shared handle to the two cross-thread root regions. Clones may be
    /// held by any mutator thread.
    pub fn cross_thread_persistents(&self) -> Arc<CrossThreadPersistentRegions> {
        self.cross_thread_persistents.clone()
    }

    /// The remembered set; `None` unless the heap is generational.
    pub fn remembered_set(&self) -> Option<RefMut<'_, RememberedSet>> {
        self.remembered_set.as_ref().map(|cell| cell.borrow_mut())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn in_atomic_pause(&self) -> bool {
        self.in_atomic_pause.load(Ordering::SeqCst)
    }

    /// Whether an external collector may start a collection right now.
    pub fn collection_allowed(&self) -> bool {
        self.no_gc_depth.load(Ordering::SeqCst) == 0
            && self.disallow_gc_depth.load(Ordering::SeqCst) == 0
            && !self.in_atomic_pause()
            && !self.is_terminated()
    }

    /// Sums the payload size of every live object across every space.
    ///
    /// Read-only; safe whenever no collection is rewriting headers.
    pub fn object_payload_size(&self) -> usize {
        let heap = self.raw_heap.lock().unwrap();
        let mut counter = ObjectSizeCounter::default();
        traverse(&heap, &mut counter);
        counter.accumulated_size
    }

    /// Runs every registered pre-finalizer and returns the byte volume the
    /// callbacks allocated.
    ///
    /// A collection can never start while the callbacks run. By default
    /// allocation is forbidden too, since freed-but-unswept memory is
    /// unsafe to allocate into; `allow_allocations_in_prefinalizers`
    /// relaxes that.
    pub fn execute_prefinalizers(&self) -> usize {
        if self.config.allow_allocations_in_prefinalizers {
            let _no_gc = NoGcScope::new(self);
            self.invoke_prefinalizers()
        } else {
            let _no_gc = DisallowGcScope::new(self);
            self.invoke_prefinalizers()
        }
    }

    fn invoke_prefinalizers(&self) -> usize {
        let before = self.allocator.allocated_bytes_total();
        self.prefinalizers.invoke_all();
        let bytes = self.allocator.allocated_bytes_total() - before;
        self.prefinalizers
            .set_bytes_allocated_in_last_invocation(bytes);
        bytes
    }

    /// Takes a statistics snapshot.
    ///
    /// Brief snapshots read the already-maintained counters and touch
    /// nothing else. Detailed snapshots first finish any in-flight sweep,
    /// then flush every LAB back into space accounting, and only then walk
    /// the spaces; either step skipped would yield a torn count.
    pub fn collect_statistics(&self, detail_level: DetailLevel) -> HeapStatistics {
        if detail_level == DetailLevel::Brief {
            return HeapStatistics {
                detail_level: DetailLevel::Brief,
                allocated_size_bytes: self.stats.allocated_memory_size(),
                resident_size_bytes: self.stats.resident_memory_size(),
                used_size_bytes: self.stats.allocated_object_size(),
                space_stats: Vec::new(),
            };
        }

        self.sweeper.finish_if_running();
        self.allocator.reset_linear_allocation_buffers();
        let heap = self.raw_heap.lock().unwrap();
        collect_detailed_statistics(&heap, &self.stats)
    }

    /// Resets the inter-generational age table and the remembered set.
    /// Called after a major collection, before the mutator resumes.
    pub fn reset_remembered_set(&self) {
        let Some(remembered_set) = self.remembered_set.as_ref() else {
            panic!("remembered set requires a generational heap");
        };

        {
            let heap = self.raw_heap.lock().unwrap();
            let mut check = AllLabsAreEmpty::default();
            traverse(&heap, &mut check);
            assert!(
                check.value(),
                "remembered set reset with an open linear allocation buffer"
            );
        }
        remembered_set.borrow_mut().reset();
    }

    /// Tears the heap down: a bounded fixpoint of forced, stop-the-world
    /// collections that runs until clearing the persistent regions sticks.
    ///
    /// Pre-finalizers may resurrect roots (and re-register themselves), so
    /// after each round the four regions are re-checked; a non-empty region
    /// starts another round. A heap that has not converged after 20 rounds
    /// has a leak or an endlessly resurrecting finalizer, and aborts.
    ///
    /// On exit the allocator is permanently disabled and the disallow-GC
    /// depth permanently raised; no further transition is valid.
    pub fn terminate(&self) {
        assert!(!self.is_terminated(), "heap terminated twice");

        // A concurrent sweep from an earlier cycle must not race root
        // clearing.
        self.sweeper.finish_if_running();

        let mut round = 0;
        loop {
            assert!(
                !self.in_atomic_pause(),
                "termination during a collection"
            );
            assert_eq!(
                self.disallow_gc_depth.load(Ordering::SeqCst),
                0,
                "termination inside a disallow-GC scope"
            );
            assert!(
                round < MAX_TERMINATION_GCS,
                "termination did not converge after {MAX_TERMINATION_GCS} rounds"
            );
            round += 1;
            debug!("termination round {round}");

            self.strong_persistents.clear_all_used_nodes();
            self.weak_persistents.clear_all_used_nodes();
            self.cross_thread_persistents.clear_all_used_nodes();

            self.in_atomic_pause.store(true, Ordering::SeqCst);
            self.stats
                .notify_marking_started(CollectionType::Major, true);
            self.allocator.reset_linear_allocation_buffers();
            self.stats.notify_marking_completed(0);
            self.execute_prefinalizers();
            self.sweeper.start(SweepingConfig {
                sweeping_type: SweepingType::Atomic,
                compactable_space_handling: CompactableSpaceHandling::SweepNow,
            });
            self.in_atomic_pause.store(false, Ordering::SeqCst);
            self.sweeper.notify_done_if_needed();

            let roots_remaining = self.strong_persistents.nodes_in_use() > 0
                || self.weak_persistents.nodes_in_use() > 0
                || self.cross_thread_persistents.nodes_in_use() > 0;
            if !roots_remaining {
                break;
            }
        }

        self.allocator.terminate();
        self.disallow_gc_depth.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
        debug!("heap terminated after {round} round(s)");

        assert_eq!(0, self.strong_persistents.nodes_in_use());
        assert_eq!(0, self.weak_persistents.nodes_in_use());
        assert_eq!(0, self.cross_thread_persistents.strong_nodes_in_use());
        assert_eq!(0, self.cross_thread_persistents.weak_nodes_in_use());
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.sweeper.finish_if_running();
    }
}

/// Forbids starting a collection for its lifetime; allocation stays legal.
pub struct NoGcScope<'a> {
    heap: &'a Heap,
}

impl<'a> NoGcScope<'a> {
    pub fn new(heap: &'a Heap) -> Self {
        heap.no_gc_depth.fetch_add(1, Ordering::SeqCst);
        Self { heap }
    }
}

impl Drop for NoGcScope<'_> {
    fn drop(&mut self) {
        self.heap.no_gc_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Forbids collection outright; attempting to terminate the heap while one
/// of these is alive is fatal.
pub struct DisallowGcScope<'a> {
    heap: &'a Heap,
}

impl<'a> DisallowGcScope<'a> {
    pub fn new(heap: &'a Heap) -> Self {
        heap.no_gc_depth.fetch_add(1, Ordering::SeqCst);
        heap.disallow_gc_depth.fetch_add(1, Ordering::SeqCst);
        Self { heap }
    }
}

impl Drop for DisallowGcScope<'_> {
    fn drop(&mut self) {
        self.heap.no_gc_depth.fetch_sub(1, Ordering::SeqCst);
        self.heap.disallow_gc_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ObjectSizeCounter {
    accumulated_size: usize,
}

impl HeapVisitor for ObjectSizeCounter {
    fn visit_object_header(&mut self, header: &ObjectHeader) -> bool {
        if !header.is_free() {
            self.accumulated_size += ObjectView::new(header).size();
        }
        true
    }
}

#[derive(Default)]
struct AllLabsAreEmpty {
    some_lab_is_set: bool,
}

impl AllLabsAreEmpty {
    fn value(&self) -> bool {
        !self.some_lab_is_set
    }
}

impl HeapVisitor for AllLabsAreEmpty {
    fn visit_normal_space(&mut self, space: &NormalSpace) -> bool {
        self.some_lab_is_set |= space.linear_allocation_buffer().size() > 0;
        false
    }

    fn visit_custom_space(&mut self, _space: &CustomSpace) -> bool {
        false
    }
}
