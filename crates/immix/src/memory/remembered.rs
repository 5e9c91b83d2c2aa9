//! Remembered Set
//!
//! Mature objects known to hold references into the young generation, so a
//! young-only collection can treat them as roots without walking the whole
//! region. Every entry carries the mark generation in which it was last
//! confirmed live.
//!
//! Entries are appended by the write barrier and by `update_pointer` while
//! the collector is idle, and purged by the collector after `collect_finish`.

use crate::object::{Address, ObjectSpace};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct RememberedSet {
    entries: FxHashMap<Address, u32>,
}

impl RememberedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `object`, tagging it with generation `mark`
    ///
    /// Returns true if the object was not remembered before.
    pub fn remember(&mut self, object: Address, mark: u32) -> bool {
        self.entries.insert(object, mark).is_none()
    }

    pub fn contains(&self, object: Address) -> bool {
        self.entries.contains_key(&object)
    }

    /// Generation an entry was last confirmed in
    pub fn tag(&self, object: Address) -> Option<u32> {
        self.entries.get(&object).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Address, u32)> + '_ {
        self.entries.iter().map(|(addr, mark)| (*addr, *mark))
    }

    /// Drop every entry whose object did not survive generation `mark`
    ///
    /// Surviving entries follow forwarding and are re-tagged with `mark`, so
    /// afterwards no entry is older than the generation just completed.
    /// Returns the number of entries removed.
    pub fn unremember_objects(&mut self, mark: u32, objects: &ObjectSpace) -> usize {
        let before = self.entries.len();
        let mut kept = FxHashMap::default();

        for &object in self.entries.keys() {
            let Some(record) = objects.get(object) else {
                continue;
            };

            let current = match record.header.forward() {
                Some(to) => to,
                None => object,
            };

            let live = objects
                .get(current)
                .map(|o| o.header.marked_p(mark))
                .unwrap_or(false);

            if live {
                kept.insert(current, mark);
            }
        }

        self.entries = kept;
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ManagedObject, Zone};

    fn mature(space: &mut ObjectSpace, addr: usize, mark: u32) -> Address {
        let address = Address::new(addr);
        let mut object = ManagedObject::new(Zone::Mature, 16);
        object.header.set_in_region();
        object.header.mark(mark);
        space.insert(address, object);
        address
    }

    #[test]
    fn test_purge_drops_unmarked_and_retags_survivors() {
        let mut space = ObjectSpace::new();
        let live = mature(&mut space, 0x1000, 2);
        let dead = mature(&mut space, 0x1010, 1);

        let mut set = RememberedSet::new();
        set.remember(live, 1);
        set.remember(dead, 1);

        let removed = set.unremember_objects(2, &space);

        assert_eq!(removed, 1);
        assert_eq!(set.tag(live), Some(2));
        assert!(!set.contains(dead));
        assert!(set.iter().all(|(_, mark)| mark == 2));
    }

    #[test]
    fn test_purge_follows_forwarding() {
        let mut space = ObjectSpace::new();
        let to = mature(&mut space, 0x2000, 3);

        let from = Address::new(0x100);
        let mut young = ManagedObject::new(Zone::Young, 16);
        young.header.set_forward(to);
        space.insert(from, young);

        let mut set = RememberedSet::new();
        set.remember(from, 2);
        set.unremember_objects(3, &space);

        assert!(!set.contains(from));
        assert_eq!(set.tag(to), Some(3));
    }

    #[test]
    fn test_purge_drops_vanished_objects() {
        let space = ObjectSpace::new();
        let mut set = RememberedSet::new();
        assert!(set.remember(Address::new(0x3000), 1));
        assert!(!set.remember(Address::new(0x3000), 1));

        assert_eq!(set.unremember_objects(2, &space), 1);
        assert!(set.is_empty());
    }
}
