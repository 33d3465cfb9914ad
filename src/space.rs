use super::backend::PageMemory;
use super::config::CustomSpaceConfig;
use super::header::ObjectHeader;

pub(crate) const PAGE_SIZE: usize = 16 * 1024;

pub(crate) const NORMAL_SPACE_COUNT: usize = 4;

// Upper payload bounds of the size-class spaces. Requests above the last
// bound still land in the last space, on a page committed large enough to
// hold them.
const SIZE_CLASS_LIMITS: [usize; NORMAL_SPACE_COUNT] = [32, 128, 512, usize::MAX];

/// A page of committed memory holding object headers.
pub struct Page {
    memory: PageMemory,
    used_bytes: usize,
    headers: Vec<ObjectHeader>,
}

impl Page {
    pub(crate) fn new(memory: PageMemory) -> Self {
        Self {
            memory,
            used_bytes: 0,
            headers: Vec::new(),
        }
    }

    pub fn committed_bytes(&self) -> usize {
        self.memory.committed_bytes()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn object_headers(&self) -> &[ObjectHeader] {
        &self.headers
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub(crate) fn has_room_for(&self, size: usize) -> bool {
        self.used_bytes + size <= self.committed_bytes()
    }

    pub(crate) fn push_header(&mut self, header: ObjectHeader) {
        debug_assert!(self.has_room_for(header.size()));
        self.used_bytes += header.size();
        self.headers.push(header);
    }

    pub(crate) fn headers_mut(&mut self) -> &mut [ObjectHeader] {
        &mut self.headers
    }

    /// Drops every free header, returning the byte volume pruned.
    pub(crate) fn prune_free_headers(&mut self) -> usize {
        let mut pruned = 0;
        self.headers.retain(|header| {
            if header.is_free() {
                pruned += header.size();
                false
            } else {
                true
            }
        });
        self.used_bytes -= pruned;
        pruned
    }

    pub(crate) fn into_memory(self) -> PageMemory {
        self.memory
    }
}

/// The bump cursor of a space. Bytes allocated through it stay invisible to
/// counter-based accounting until the buffer is folded back into its space.
#[derive(Default)]
pub struct LinearAllocationBuffer {
    bytes: usize,
}

impl LinearAllocationBuffer {
    pub fn size(&self) -> usize {
        self.bytes
    }

    pub(crate) fn bump(&mut self, bytes: usize) {
        self.bytes += bytes;
    }

    /// Closes the buffer, yielding the bytes it was hiding.
    pub(crate) fn take(&mut self) -> usize {
        std::mem::take(&mut self.bytes)
    }
}

/// A size-class space with per-space linear allocation buffer.
pub struct NormalSpace {
    index: usize,
    pages: Vec<Page>,
    lab: LinearAllocationBuffer,
    allocated_bytes: usize,
}

impl NormalSpace {
    fn new(index: usize) -> Self {
        Self {
            index,
            pages: Vec::new(),
            lab: LinearAllocationBuffer::default(),
            allocated_bytes: 0,
        }
    }

    pub fn name(&self) -> String {
        format!("normal-{}", self.index)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub(crate) fn pages_mut(&mut self) -> &mut Vec<Page> {
        &mut self.pages
    }

    pub fn linear_allocation_buffer(&self) -> &LinearAllocationBuffer {
        &self.lab
    }

    pub(crate) fn linear_allocation_buffer_mut(&mut self) -> &mut LinearAllocationBuffer {
        &mut self.lab
    }

    /// Object bytes folded out of the LAB into this space's accounting.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub(crate) fn add_allocated_bytes(&mut self, bytes: usize) {
        self.allocated_bytes += bytes;
    }

    pub(crate) fn sub_allocated_bytes(&mut self, bytes: usize) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(bytes);
    }

    pub fn committed_bytes(&self) -> usize {
        self.pages.iter().map(Page::committed_bytes).sum()
    }
}

/// An embedder-defined space. Allocation goes page-direct, without a LAB.
pub struct CustomSpace {
    index: usize,
    supports_compaction: bool,
    pages: Vec<Page>,
    allocated_bytes: usize,
}

impl CustomSpace {
    fn new(index: usize, config: &CustomSpaceConfig) -> Self {
        Self {
            index,
            supports_compaction: config.supports_compaction,
            pages: Vec::new(),
            allocated_bytes: 0,
        }
    }

    pub fn name(&self) -> String {
        format!("custom-{}", self.index)
    }

    pub fn supports_compaction(&self) -> bool {
        self.supports_compaction
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub(crate) fn pages_mut(&mut self) -> &mut Vec<Page> {
        &mut self.pages
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    pub(crate) fn add_allocated_bytes(&mut self, bytes: usize) {
        self.allocated_bytes += bytes;
    }

    pub(crate) fn sub_allocated_bytes(&mut self, bytes: usize) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(bytes);
    }

    pub fn committed_bytes(&self) -> usize {
        self.pages.iter().map(Page::committed_bytes).sum()
    }
}

/// The space list: the size-class spaces followed by the embedder's custom
/// spaces. Owned by the heap, shared with the allocator and sweeper.
pub struct RawHeap {
    normal_spaces: Vec<NormalSpace>,
    custom_spaces: Vec<CustomSpace>,
}

impl RawHeap {
    pub(crate) fn new(custom_spaces: &[CustomSpaceConfig]) -> Self {
        Self {
            normal_spaces: (0..NORMAL_SPACE_COUNT).map(NormalSpace::new).collect(),
            custom_spaces: custom_spaces
                .iter()
                .enumerate()
                .map(|(index, config)| CustomSpace::new(index, config))
                .collect(),
        }
    }

    pub fn normal_spaces(&self) -> &[NormalSpace] {
        &self.normal_spaces
    }

    pub(crate) fn normal_spaces_mut(&mut self) -> &mut [NormalSpace] {
        &mut self.normal_spaces
    }

    pub fn custom_spaces(&self) -> &[CustomSpace] {
        &self.custom_spaces
    }

    pub(crate) fn custom_spaces_mut(&mut self) -> &mut [CustomSpace] {
        &mut self.custom_spaces
    }

    /// Index of the size-class space a payload of `size` bytes belongs to.
    pub(crate) fn space_index_for(size: usize) -> usize {
        SIZE_CLASS_LIMITS
            .iter()
            .position(|&limit| size <= limit)
            .unwrap_or(NORMAL_SPACE_COUNT - 1)
    }

    pub fn committed_bytes(&self) -> usize {
        self.normal_spaces
            .iter()
            .map(NormalSpace::committed_bytes)
            .sum::<usize>()
            + self
                .custom_spaces
                .iter()
                .map(CustomSpace::committed_bytes)
                .sum::<usize>()
    }
}
