//! The lifecycle core of an embeddable tracing garbage collected heap.
//!
//! A [`Heap`] owns every GC subsystem for its entire lifetime: the page
//! backend the allocator draws from, the object allocator and its per-space
//! linear allocation buffers, the sweeper, the statistics collector, the
//! pre-finalizer registry, and the four persistent root regions
//! (strong/weak crossed with same-thread/cross-thread). The marking
//! algorithm itself lives in the embedder; this crate sequences the phases
//! around it and tears the whole aggregate down safely.
//!
//! ```rust
//! use cinder::{Heap, HeapConfig};
//!
//! let heap = Heap::new(HeapConfig::default());
//! let object = heap.allocator().allocate(64);
//! let _handle = heap.strong_persistents().register(object);
//!
//! assert_eq!(heap.object_payload_size(), 64);
//!
//! // Termination clears every root region, runs pre-finalizers, and
//! // sweeps, looping until root resurrection stops.
//! heap.terminate();
//! assert_eq!(heap.strong_persistents().nodes_in_use(), 0);
//! ```
//!
//! There is no recoverable error path in this core: invariant violations
//! (terminating during a collection, endless root resurrection, allocating
//! inside a forbidding pre-finalizer) abort, and page exhaustion funnels
//! through the terminal [`FatalOutOfMemoryHandler`].

mod allocator;
mod backend;
mod config;
mod header;
mod heap;
mod persistent;
mod prefinalizer;
mod remembered_set;
mod space;
mod stats;
mod sweeper;
mod visitor;

pub use allocator::ObjectAllocator;
pub use backend::{FatalOutOfMemoryHandler, NativePageBackend, PageBackend, PageMemory};
pub use config::{
    CustomSpaceConfig, HeapConfig, MarkingSupport, StackSupport, SweepingSupport,
};
pub use header::{ObjectHeader, ObjectRef, ObjectView};
pub use heap::{DisallowGcScope, Heap, NoGcScope};
pub use persistent::{
    CrossThreadPersistentRegions, PersistentHandle, PersistentRegion, RootStrength,
};
pub use prefinalizer::{PreFinalizer, PreFinalizerRegistry};
pub use remembered_set::{Age, AgeTable, RememberedSet};
pub use space::{CustomSpace, LinearAllocationBuffer, NormalSpace, Page, RawHeap};
pub use stats::{
    AllocationObserver, CollectionType, DetailLevel, HeapStatistics, SpaceStatistics,
    StatsCollector,
};
pub use sweeper::{CompactableSpaceHandling, Sweep, Sweeper, SweepingConfig, SweepingType};
pub use visitor::{traverse, HeapVisitor};

#[cfg(test)]
mod test;
