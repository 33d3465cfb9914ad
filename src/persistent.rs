use std::cell::RefCell;
use std::sync::Mutex;

use super::header::ObjectRef;

/// Whether a root keeps its target alive unconditionally, or is nulled when
/// the target dies during a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStrength {
    Strong,
    Weak,
}

/// Handle to a registered root slot. The caller keeps it for the slot's
/// lifetime; a bulk clear invalidates every outstanding handle of its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentHandle {
    index: usize,
}

#[derive(Clone, Copy)]
enum Slot {
    Free { next_free: Option<usize> },
    Used { object: ObjectRef },
}

/// Free-list slot arena backing each region flavor.
#[derive(Default)]
struct SlotArena {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    in_use: usize,
}

impl SlotArena {
    fn register(&mut self, object: ObjectRef) -> PersistentHandle {
        self.in_use += 1;
        match self.free_head {
            Some(index) => {
                let Slot::Free { next_free } = self.slots[index] else {
                    unreachable!("free list points at a used slot");
                };
                self.free_head = next_free;
                self.slots[index] = Slot::Used { object };
                PersistentHandle { index }
            }
            None => {
                self.slots.push(Slot::Used { object });
                PersistentHandle {
                    index: self.slots.len() - 1,
                }
            }
        }
    }

    fn release(&mut self, handle: PersistentHandle) {
        match self.slots[handle.index] {
            Slot::Used { .. } => {
                self.slots[handle.index] = Slot::Free {
                    next_free: self.free_head,
                };
                self.free_head = Some(handle.index);
                self.in_use -= 1;
            }
            Slot::Free { .. } => panic!("released a root slot twice"),
        }
    }

    fn get(&self, handle: PersistentHandle) -> Option<ObjectRef> {
        match self.slots.get(handle.index) {
            Some(&Slot::Used { object }) => Some(object),
            _ => None,
        }
    }

    fn nodes_in_use(&self) -> usize {
        self.in_use
    }

    // Bulk clear for termination: every slot is dropped without per-slot
    // finalization, since at shutdown that is either already done or moot.
    fn clear_all(&mut self) {
        self.slots.clear();
        self.free_head = None;
        self.in_use = 0;
    }
}

/// A same-thread persistent root region. Only the heap's owning thread ever
/// touches it, so it carries no lock.
pub struct PersistentRegion {
    strength: RootStrength,
    arena: RefCell<SlotArena>,
}

impl PersistentRegion {
    pub(crate) fn new(strength: RootStrength) -> Self {
        Self {
            strength,
            arena: RefCell::new(SlotArena::default()),
        }
    }

    pub fn strength(&self) -> RootStrength {
        self.strength
    }

    /// Registers a slot keeping `object` reachable. The returned handle is
    /// held by the caller for the slot's lifetime.
    pub fn register(&self, object: ObjectRef) -> PersistentHandle {
        self.arena.borrow_mut().register(object)
    }

    pub fn release(&self, handle: PersistentHandle) {
        self.arena.borrow_mut().release(handle);
    }

    pub fn get(&self, handle: PersistentHandle) -> Option<ObjectRef> {
        self.arena.borrow().get(handle)
    }

    pub fn nodes_in_use(&self) -> usize {
        self.arena.borrow().nodes_in_use()
    }

    pub(crate) fn clear_all_used_nodes(&self) {
        self.arena.borrow_mut().clear_all();
    }
}

struct CrossThreadInner {
    strong: SlotArena,
    weak: SlotArena,
}

/// The strong and weak cross-thread regions, both behind the one shared
/// lock of this core. Any mutator thread may register; every mutation and
/// bulk clear happens under a single lock acquisition.
pub struct CrossThreadPersistentRegions {
    inner: Mutex<CrossThreadInner>,
}

impl CrossThreadPersistentRegions {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(CrossThreadInner {
                strong: SlotArena::default(),
                weak: SlotArena::default(),
            }),
        }
    }

    pub fn register(&self, strength: RootStrength, object: ObjectRef) -> PersistentHandle {
        let mut inner = self.inner.lock().unwrap();
        match strength {
            RootStrength::Strong => inner.strong.register(object),
            RootStrength::Weak => inner.weak.register(object),
        }
    }

    pub fn release(&self, strength: RootStrength, handle: PersistentHandle) {
        let mut inner = self.inner.lock().unwrap();
        match strength {
            RootStrength::Strong => inner.strong.release(handle),
            RootStrength::Weak => inner.weak.release(handle),
        }
    }

    pub fn strong_nodes_in_use(&self) -> usize {
        self.inner.lock().unwrap().strong.nodes_in_use()
    }

    pub fn weak_nodes_in_use(&self) -> usize {
        self.inner.lock().unwrap().weak.nodes_in_use()
    }

    /// Live slots across both regions, counted under one lock acquisition.
    pub fn nodes_in_use(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.strong.nodes_in_use() + inner.weak.nodes_in_use()
    }

    /// Clears both regions under one lock acquisition.
    pub(crate) fn clear_all_used_nodes(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.strong.clear_all();
        inner.weak.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn object(id: u64) -> ObjectRef {
        ObjectRef::new(id)
    }

    #[test]
    fn register_and_release() {
        let region = PersistentRegion::new(RootStrength::Strong);

        let a = region.register(object(1));
        let b = region.register(object(2));
        assert_eq!(region.nodes_in_use(), 2);
        assert_eq!(region.get(a), Some(object(1)));

        region.release(a);
        assert_eq!(region.nodes_in_use(), 1);
        assert_eq!(region.get(b), Some(object(2)));

        // The freed slot is reused.
        let c = region.register(object(3));
        assert_eq!(c, a);
        assert_eq!(region.nodes_in_use(), 2);
    }

    #[test]
    #[should_panic(expected = "released a root slot twice")]
    fn double_release_is_fatal() {
        let region = PersistentRegion::new(RootStrength::Weak);

        let handle = region.register(object(1));
        region.release(handle);
        region.release(handle);
    }

    #[test]
    fn clear_all_empties_the_region() {
        let region = PersistentRegion::new(RootStrength::Strong);

        for id in 1..=10 {
            region.register(object(id));
        }
        assert_eq!(region.nodes_in_use(), 10);

        region.clear_all_used_nodes();
        assert_eq!(region.nodes_in_use(), 0);
    }

    #[test]
    fn cross_thread_registration_races() {
        let regions = Arc::new(CrossThreadPersistentRegions::new());
        let mut handles = Vec::new();

        for thread_id in 0..4u64 {
            let regions = regions.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let strength = if i % 2 == 0 {
                        RootStrength::Strong
                    } else {
                        RootStrength::Weak
                    };
                    regions.register(strength, object(thread_id * 1000 + i + 1));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(regions.strong_nodes_in_use(), 200);
        assert_eq!(regions.weak_nodes_in_use(), 200);
        assert_eq!(regions.nodes_in_use(), 400);

        regions.clear_all_used_nodes();
        assert_eq!(regions.nodes_in_use(), 0);
    }
}
