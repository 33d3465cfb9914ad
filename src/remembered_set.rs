use std::collections::HashSet;

use super::header::ObjectRef;

const AGE_TABLE_CARDS: usize = 256;

/// Generation of the objects covered by one card of the age table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    Old,
    Young,
    Mixed,
}

/// Card-granular generation map. Reset returns every card to `Old`.
pub struct AgeTable {
    cards: Vec<Age>,
}

impl AgeTable {
    fn new() -> Self {
        Self {
            cards: vec![Age::Old; AGE_TABLE_CARDS],
        }
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn age(&self, card: usize) -> Age {
        self.cards[card]
    }

    pub fn set_age(&mut self, card: usize, age: Age) {
        self.cards[card] = age;
    }

    pub(crate) fn reset(&mut self) {
        self.cards.fill(Age::Old);
    }
}

/// Old-to-young reference records, valid only between major collections.
///
/// Constructed only on generational heaps; resetting it requires every
/// normal space's linear allocation buffer to be empty, a precondition the
/// heap checks by traversal before calling in here.
pub struct RememberedSet {
    old_to_young: HashSet<ObjectRef>,
    age_table: AgeTable,
}

impl RememberedSet {
    pub(crate) fn new() -> Self {
        Self {
            old_to_young: HashSet::new(),
            age_table: AgeTable::new(),
        }
    }

    pub fn record(&mut self, slot: ObjectRef) {
        self.old_to_young.insert(slot);
    }

    pub fn len(&self) -> usize {
        self.old_to_young.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_young.is_empty()
    }

    pub fn age_table(&self) -> &AgeTable {
        &self.age_table
    }

    pub fn age_table_mut(&mut self) -> &mut AgeTable {
        &mut self.age_table
    }

    pub(crate) fn reset(&mut self) {
        self.old_to_young.clear();
        self.age_table.reset();
    }
}
