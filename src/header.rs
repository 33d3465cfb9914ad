use std::num::NonZeroU64;

/// The identity of a managed object, handed out by the allocator.
///
/// Persistent root slots and the remembered set reference objects through
/// this id rather than through raw addresses, so clearing a root never
/// touches object memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(NonZeroU64);

impl ObjectRef {
    pub(crate) fn new(id: u64) -> Self {
        Self(NonZeroU64::new(id).expect("object ids start at 1"))
    }

    pub fn id(&self) -> u64 {
        self.0.get()
    }
}

/// Per-object header recorded on the owning page.
///
/// The sweeper turns an unmarked header into a free header and later prunes
/// free headers out of the page entirely. Anything walking pages must skip
/// headers that are free.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    object: ObjectRef,
    size: usize,
    marked: bool,
    free: bool,
}

impl ObjectHeader {
    pub(crate) fn new(object: ObjectRef, size: usize) -> Self {
        Self {
            object,
            size,
            marked: false,
            free: false,
        }
    }

    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    pub(crate) fn set_marked(&mut self) {
        debug_assert!(!self.free);
        self.marked = true;
    }

    pub(crate) fn unmark(&mut self) {
        self.marked = false;
    }

    pub(crate) fn mark_free(&mut self) {
        self.marked = false;
        self.free = true;
    }
}

/// Size introspection over a header.
pub struct ObjectView<'a> {
    header: &'a ObjectHeader,
}

impl<'a> ObjectView<'a> {
    pub fn new(header: &'a ObjectHeader) -> Self {
        Self { header }
    }

    /// Payload size of the object behind the header.
    pub fn size(&self) -> usize {
        self.header.size()
    }
}
