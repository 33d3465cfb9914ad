use super::header::ObjectHeader;
use super::space::{CustomSpace, NormalSpace, RawHeap};

/// A walk over the heap's spaces, pages, and object headers.
///
/// Space callbacks return whether to descend into the space's pages; the
/// header callback returns whether to keep walking at all. Defaults visit
/// everything.
pub trait HeapVisitor {
    fn visit_normal_space(&mut self, _space: &NormalSpace) -> bool {
        true
    }

    fn visit_custom_space(&mut self, _space: &CustomSpace) -> bool {
        true
    }

    fn visit_object_header(&mut self, _header: &ObjectHeader) -> bool {
        true
    }
}

/// Drives a visitor over every space of the heap, normal spaces first.
pub fn traverse<V: HeapVisitor>(heap: &RawHeap, visitor: &mut V) {
    for space in heap.normal_spaces() {
        if !visitor.visit_normal_space(space) {
            continue;
        }
        for page in space.pages() {
            for header in page.object_headers() {
                if !visitor.visit_object_header(header) {
                    return;
                }
            }
        }
    }
    for space in heap.custom_spaces() {
        if !visitor.visit_custom_space(space) {
            continue;
        }
        for page in space.pages() {
            for header in page.object_headers() {
                if !visitor.visit_object_header(header) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PageMemory;
    use crate::config::CustomSpaceConfig;
    use crate::header::ObjectRef;
    use crate::space::Page;

    fn small_heap() -> RawHeap {
        let mut heap = RawHeap::new(&[CustomSpaceConfig {
            supports_compaction: false,
        }]);

        let mut page = Page::new(PageMemory::new(1024));
        page.push_header(ObjectHeader::new(ObjectRef::new(1), 24));
        page.push_header(ObjectHeader::new(ObjectRef::new(2), 24));
        heap.normal_spaces_mut()[0].pages_mut().push(page);

        let mut page = Page::new(PageMemory::new(1024));
        page.push_header(ObjectHeader::new(ObjectRef::new(3), 48));
        heap.custom_spaces_mut()[0].pages_mut().push(page);

        heap
    }

    #[derive(Default)]
    struct CountingVisitor {
        normal_spaces: usize,
        custom_spaces: usize,
        headers: usize,
    }

    impl HeapVisitor for CountingVisitor {
        fn visit_normal_space(&mut self, _space: &NormalSpace) -> bool {
            self.normal_spaces += 1;
            true
        }

        fn visit_custom_space(&mut self, _space: &CustomSpace) -> bool {
            self.custom_spaces += 1;
            true
        }

        fn visit_object_header(&mut self, _header: &ObjectHeader) -> bool {
            self.headers += 1;
            true
        }
    }

    #[test]
    fn traverse_visits_all_spaces_and_headers() {
        let heap = small_heap();
        let mut visitor = CountingVisitor::default();

        traverse(&heap, &mut visitor);

        assert_eq!(visitor.normal_spaces, 4);
        assert_eq!(visitor.custom_spaces, 1);
        assert_eq!(visitor.headers, 3);
    }

    struct SpacesOnly {
        headers: usize,
    }

    impl HeapVisitor for SpacesOnly {
        fn visit_normal_space(&mut self, _space: &NormalSpace) -> bool {
            false
        }

        fn visit_custom_space(&mut self, _space: &CustomSpace) -> bool {
            false
        }

        fn visit_object_header(&mut self, _header: &ObjectHeader) -> bool {
            self.headers += 1;
            true
        }
    }

    #[test]
    fn declining_a_space_skips_its_pages() {
        let heap = small_heap();
        let mut visitor = SpacesOnly { headers: 0 };

        traverse(&heap, &mut visitor);

        assert_eq!(visitor.headers, 0);
    }
}
