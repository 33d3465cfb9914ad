use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;

use super::space::{CustomSpace, NormalSpace, RawHeap};
use super::visitor::{traverse, HeapVisitor};

/// The generation a collection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    Minor,
    Major,
}

/// How much work a statistics snapshot is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    /// Already-maintained counters only; touches nothing else.
    Brief,
    /// Full per-space breakdown; requires sweep completion and LAB flush.
    Detailed,
}

/// Observer of allocation volume changes, notified when linear allocation
/// buffers fold into the accounted counters and when the sweeper reclaims.
pub trait AllocationObserver: Send + Sync {
    fn allocated_object_size_increased(&self, bytes: usize);

    fn allocated_object_size_decreased(&self, _bytes: usize) {}
}

/// Heap-wide counters and collection-phase notifications.
///
/// The counters are maintained as allocation and sweeping proceed, so a
/// brief snapshot is a pure read. The per-space breakdown for detailed
/// snapshots lives in [`collect_detailed_statistics`] and is only reached
/// through the heap, which enforces the required ordering first.
pub struct StatsCollector {
    allocated_memory: AtomicUsize,
    resident_memory: AtomicUsize,
    allocated_object_size: AtomicUsize,
    marked_bytes: AtomicUsize,
    forced_major_collections: AtomicUsize,
    sweeps_completed: AtomicUsize,
    observers: Mutex<Vec<Box<dyn AllocationObserver>>>,
}

impl StatsCollector {
    pub(crate) fn new() -> Self {
        Self {
            allocated_memory: AtomicUsize::new(0),
            resident_memory: AtomicUsize::new(0),
            allocated_object_size: AtomicUsize::new(0),
            marked_bytes: AtomicUsize::new(0),
            forced_major_collections: AtomicUsize::new(0),
            sweeps_completed: AtomicUsize::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn register_observer(&self, observer: Box<dyn AllocationObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    pub fn notify_marking_started(&self, collection_type: CollectionType, forced: bool) {
        debug!("marking started: {collection_type:?}, forced: {forced}");
        if collection_type == CollectionType::Major && forced {
            self.forced_major_collections.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn notify_marking_completed(&self, marked_bytes: usize) {
        debug!("marking completed: {marked_bytes} bytes");
        self.marked_bytes.store(marked_bytes, Ordering::SeqCst);
    }

    pub fn notify_sweeping_completed(&self) {
        self.sweeps_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn notify_page_allocated(&self, bytes: usize) {
        self.allocated_memory.fetch_add(bytes, Ordering::SeqCst);
        self.resident_memory.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn notify_page_freed(&self, bytes: usize) {
        self.allocated_memory.fetch_sub(bytes, Ordering::SeqCst);
        self.resident_memory.fetch_sub(bytes, Ordering::SeqCst);
    }

    pub fn notify_object_bytes_accounted(&self, bytes: usize) {
        self.allocated_object_size.fetch_add(bytes, Ordering::SeqCst);
        for observer in self.observers.lock().unwrap().iter() {
            observer.allocated_object_size_increased(bytes);
        }
    }

    pub fn notify_object_bytes_reclaimed(&self, bytes: usize) {
        let accounted = self
            .allocated_object_size
            .load(Ordering::SeqCst)
            .min(bytes);
        self.allocated_object_size
            .fetch_sub(accounted, Ordering::SeqCst);
        for observer in self.observers.lock().unwrap().iter() {
            observer.allocated_object_size_decreased(accounted);
        }
    }

    pub fn allocated_memory_size(&self) -> usize {
        self.allocated_memory.load(Ordering::SeqCst)
    }

    pub fn resident_memory_size(&self) -> usize {
        self.resident_memory.load(Ordering::SeqCst)
    }

    pub fn allocated_object_size(&self) -> usize {
        self.allocated_object_size.load(Ordering::SeqCst)
    }

    pub fn marked_bytes(&self) -> usize {
        self.marked_bytes.load(Ordering::SeqCst)
    }

    pub fn forced_major_collections(&self) -> usize {
        self.forced_major_collections.load(Ordering::SeqCst)
    }

    pub fn sweeps_completed(&self) -> usize {
        self.sweeps_completed.load(Ordering::SeqCst)
    }
}

/// A statistics snapshot. Brief snapshots carry the heap-wide counters
/// only; detailed snapshots add the per-space breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStatistics {
    pub detail_level: DetailLevel,
    pub allocated_size_bytes: usize,
    pub resident_size_bytes: usize,
    pub used_size_bytes: usize,
    pub space_stats: Vec<SpaceStatistics>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceStatistics {
    pub name: String,
    pub committed_size_bytes: usize,
    pub used_size_bytes: usize,
    pub page_count: usize,
}

#[derive(Default)]
struct SpaceStatsVisitor {
    space_stats: Vec<SpaceStatistics>,
}

impl HeapVisitor for SpaceStatsVisitor {
    fn visit_normal_space(&mut self, space: &NormalSpace) -> bool {
        self.space_stats.push(SpaceStatistics {
            name: space.name(),
            committed_size_bytes: space.committed_bytes(),
            used_size_bytes: space.allocated_bytes(),
            page_count: space.pages().len(),
        });
        false
    }

    fn visit_custom_space(&mut self, space: &CustomSpace) -> bool {
        self.space_stats.push(SpaceStatistics {
            name: space.name(),
            committed_size_bytes: space.committed_bytes(),
            used_size_bytes: space.allocated_bytes(),
            page_count: space.pages().len(),
        });
        false
    }
}

/// Full-detail aggregation over a quiescent heap. The caller must have
/// finished any in-flight sweep and flushed every LAB first; per-space used
/// bytes are read from space accounting, which is only whole once no open
/// LAB is hiding bytes from it.
pub(crate) fn collect_detailed_statistics(
    raw_heap: &RawHeap,
    stats: &StatsCollector,
) -> HeapStatistics {
    let mut visitor = SpaceStatsVisitor::default();
    traverse(raw_heap, &mut visitor);

    HeapStatistics {
        detail_level: DetailLevel::Detailed,
        allocated_size_bytes: stats.allocated_memory_size(),
        resident_size_bytes: stats.resident_memory_size(),
        used_size_bytes: stats.allocated_object_size(),
        space_stats: visitor.space_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn page_and_object_counters() {
        let stats = StatsCollector::new();

        stats.notify_page_allocated(16384);
        stats.notify_object_bytes_accounted(600);
        assert_eq!(stats.allocated_memory_size(), 16384);
        assert_eq!(stats.resident_memory_size(), 16384);
        assert_eq!(stats.allocated_object_size(), 600);

        stats.notify_object_bytes_reclaimed(200);
        stats.notify_page_freed(16384);
        assert_eq!(stats.allocated_object_size(), 400);
        assert_eq!(stats.allocated_memory_size(), 0);
    }

    #[test]
    fn reclaim_never_underflows() {
        let stats = StatsCollector::new();

        stats.notify_object_bytes_accounted(100);
        stats.notify_object_bytes_reclaimed(500);
        assert_eq!(stats.allocated_object_size(), 0);
    }

    #[test]
    fn forced_major_collections_are_counted() {
        let stats = StatsCollector::new();

        stats.notify_marking_started(CollectionType::Major, true);
        stats.notify_marking_started(CollectionType::Major, false);
        stats.notify_marking_started(CollectionType::Minor, true);
        stats.notify_marking_completed(0);

        assert_eq!(stats.forced_major_collections(), 1);
        assert_eq!(stats.marked_bytes(), 0);
    }

    struct CountingObserver {
        increased: AtomicUsize,
        decreased: AtomicUsize,
    }

    impl AllocationObserver for Arc<CountingObserver> {
        fn allocated_object_size_increased(&self, bytes: usize) {
            self.increased.fetch_add(bytes, Ordering::SeqCst);
        }

        fn allocated_object_size_decreased(&self, bytes: usize) {
            self.decreased.fetch_add(bytes, Ordering::SeqCst);
        }
    }

    #[test]
    fn observers_see_object_volume_changes() {
        let stats = StatsCollector::new();
        let observer = Arc::new(CountingObserver {
            increased: AtomicUsize::new(0),
            decreased: AtomicUsize::new(0),
        });

        stats.register_observer(Box::new(observer.clone()));
        stats.notify_object_bytes_accounted(300);
        stats.notify_object_bytes_reclaimed(100);

        assert_eq!(observer.increased.load(Ordering::SeqCst), 300);
        assert_eq!(observer.decreased.load(Ordering::SeqCst), 100);
    }
}
