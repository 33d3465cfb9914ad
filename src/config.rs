/// Whether the embedder can provide conservative stack scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSupport {
    SupportsConservativeStackScan,
    NoConservativeStackScan,
}

/// The most concurrent marking style the embedder permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkingSupport {
    Atomic,
    Incremental,
    IncrementalAndConcurrent,
}

/// The most concurrent sweeping style the embedder permits. When only
/// `Atomic` is supported, requests for a background sweep degrade to an
/// inline stop-the-world sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepingSupport {
    Atomic,
    IncrementalAndConcurrent,
}

/// An embedder-defined space added to the heap at construction.
#[derive(Debug, Clone, Copy)]
pub struct CustomSpaceConfig {
    /// Compactable spaces are normally reclaimed by the compactor; a sweep
    /// started with `CompactableSpaceHandling::DeferToCompaction` skips them.
    pub supports_compaction: bool,
}

/// Construction-time configuration of the heap.
///
/// Optional subsystems are selected here with plain values rather than cargo
/// features; a disabled subsystem is simply never constructed.
#[derive(Debug, Clone)]
pub struct HeapConfig {
    pub stack_support: StackSupport,
    pub marking_support: MarkingSupport,
    pub sweeping_support: SweepingSupport,

    /// Enables the young generation: the heap carries a remembered set and
    /// an age table, reset after every major collection.
    pub generational: bool,

    /// Lets pre-finalizers allocate. Off by default since freed-but-unswept
    /// memory is unsafe to allocate into while the callbacks run.
    pub allow_allocations_in_prefinalizers: bool,

    /// Embedder-defined spaces appended after the size-class spaces.
    pub custom_spaces: Vec<CustomSpaceConfig>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            stack_support: StackSupport::SupportsConservativeStackScan,
            marking_support: MarkingSupport::IncrementalAndConcurrent,
            sweeping_support: SweepingSupport::IncrementalAndConcurrent,
            generational: false,
            allow_allocations_in_prefinalizers: false,
            custom_spaces: Vec::new(),
        }
    }
}
