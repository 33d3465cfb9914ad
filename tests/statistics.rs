use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cinder::{
    AllocationObserver, DetailLevel, Heap, HeapConfig, NativePageBackend, Sweep, SweepingConfig,
};

#[derive(Default)]
struct CountingSweep {
    starts: AtomicUsize,
    finishes: AtomicUsize,
    notifies: AtomicUsize,
}

impl Sweep for CountingSweep {
    fn start(&self, _config: SweepingConfig) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn finish_if_running(&self) {
        self.finishes.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_done_if_needed(&self) {
        self.notifies.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn brief_statistics_are_pure_reads() {
    let sweeper = Arc::new(CountingSweep::default());
    let heap = Heap::with_sweeper(
        HeapConfig::default(),
        Arc::new(NativePageBackend::new()),
        sweeper.clone(),
    );
    heap.allocator().allocate(100);

    let first = heap.collect_statistics(DetailLevel::Brief);
    let second = heap.collect_statistics(DetailLevel::Brief);

    assert_eq!(first, second);
    // The open LAB still hides the object bytes from the counters.
    assert_eq!(first.used_size_bytes, 0);
    // Neither snapshot touched the sweeper.
    assert_eq!(sweeper.starts.load(Ordering::SeqCst), 0);
    assert_eq!(sweeper.finishes.load(Ordering::SeqCst), 0);
    assert_eq!(sweeper.notifies.load(Ordering::SeqCst), 0);
}

#[test]
fn detailed_statistics_finish_the_sweep_and_flush_labs() {
    let sweeper = Arc::new(CountingSweep::default());
    let heap = Heap::with_sweeper(
        HeapConfig::default(),
        Arc::new(NativePageBackend::new()),
        sweeper.clone(),
    );
    heap.allocator().allocate(100);

    let detailed = heap.collect_statistics(DetailLevel::Detailed);

    assert_eq!(sweeper.finishes.load(Ordering::SeqCst), 1);
    assert_eq!(detailed.used_size_bytes, 100);
    assert!(!detailed.space_stats.is_empty());

    // A brief snapshot taken afterwards agrees with the flushed counters.
    let brief = heap.collect_statistics(DetailLevel::Brief);
    assert_eq!(brief.used_size_bytes, 100);
}

struct ByteObserver {
    increased: AtomicUsize,
}

struct ByteObserverHandle(Arc<ByteObserver>);

impl AllocationObserver for ByteObserverHandle {
    fn allocated_object_size_increased(&self, bytes: usize) {
        self.0.increased.fetch_add(bytes, Ordering::SeqCst);
    }
}

#[test]
fn observers_hear_about_lab_flushes() {
    let heap = Heap::new(HeapConfig::default());
    let observer = Arc::new(ByteObserver {
        increased: AtomicUsize::new(0),
    });
    heap.stats().register_observer(Box::new(ByteObserverHandle(observer.clone())));

    heap.allocator().allocate(64);
    heap.allocator().allocate(32);
    assert_eq!(observer.increased.load(Ordering::SeqCst), 0);

    heap.allocator().reset_linear_allocation_buffers();
    assert_eq!(observer.increased.load(Ordering::SeqCst), 96);
}

#[test]
fn resident_memory_tracks_committed_pages() {
    let heap = Heap::new(HeapConfig::default());

    assert_eq!(heap.collect_statistics(DetailLevel::Brief).resident_size_bytes, 0);

    heap.allocator().allocate(64);
    let brief = heap.collect_statistics(DetailLevel::Brief);
    assert!(brief.resident_size_bytes > 0);
    assert_eq!(brief.resident_size_bytes, heap.page_backend().committed_bytes());
}
