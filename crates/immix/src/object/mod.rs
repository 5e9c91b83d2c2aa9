//! Object Module - Managed objects as seen by the collector
//!
//! The object layout itself belongs to the runtime. The collector only
//! relies on the header contract (mark, zone, forwarding, region flag,
//! inflated header index), the self-reported size, and the ability to
//! enumerate and rewrite reference fields.

pub mod header;
pub mod weak;

pub use header::{Forwarding, HeaderIndex, ObjectHeader, Zone};
pub use weak::WeakReference;

use rustc_hash::FxHashMap;
use std::fmt;

/// Address of a managed object
///
/// The null address (0) stands for "no object".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(usize);

impl Address {
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }

    /// Byte distance from `base` to this address
    #[inline]
    pub const fn offset_from(self, base: Address) -> usize {
        self.0 - base.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A managed object record: header, self-reported size, reference fields
#[derive(Debug, Clone)]
pub struct ManagedObject {
    pub header: ObjectHeader,
    size: usize,
    fields: Vec<Address>,
}

impl ManagedObject {
    pub fn new(zone: Zone, size: usize) -> Self {
        Self {
            header: ObjectHeader::new(zone),
            size,
            fields: Vec::new(),
        }
    }

    /// Shallow copy: same fields and size, header state carried over
    pub fn copy_of(original: &ManagedObject) -> Self {
        Self {
            header: ObjectHeader::copied_from(&original.header),
            size: original.size,
            fields: original.fields.clone(),
        }
    }

    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[Address] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Vec<Address> {
        &mut self.fields
    }
}

/// ObjectSpace - store of every managed object the collector can see
#[derive(Debug, Default)]
pub struct ObjectSpace {
    objects: FxHashMap<Address, ManagedObject>,
}

impl ObjectSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, object: ManagedObject) {
        self.objects.insert(address, object);
    }

    pub fn get(&self, address: Address) -> Option<&ManagedObject> {
        self.objects.get(&address)
    }

    pub fn get_mut(&mut self, address: Address) -> Option<&mut ManagedObject> {
        self.objects.get_mut(&address)
    }

    pub fn remove(&mut self, address: Address) -> Option<ManagedObject> {
        self.objects.remove(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.objects.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &ManagedObject)> {
        self.objects.iter()
    }

    /// Remove every region-resident object not marked under `mark`
    ///
    /// Returns the removed addresses with their inflated header index.
    pub fn sweep_region(&mut self, mark: u32) -> Vec<(Address, Option<HeaderIndex>)> {
        let mut dead = Vec::new();
        self.objects.retain(|address, object| {
            let header = &object.header;
            if header.in_region_p() && !header.marked_p(mark) {
                dead.push((*address, header.inflated_index()));
                false
            } else {
                true
            }
        });
        dead
    }

    /// Remove young records not marked under `mark`
    ///
    /// Unmarked young objects were unreachable from every root. Forwarded
    /// originals carry the mark of the cycle that moved them, so they stay
    /// resolvable until the following sweep.
    pub fn sweep_young(&mut self, mark: u32) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, object| {
            let header = &object.header;
            !header.young_object_p() || header.marked_p(mark)
        });
        before - self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_arithmetic() {
        let base = Address::new(0x1000);
        assert_eq!(base.offset(0x40), Address::new(0x1040));
        assert_eq!(Address::new(0x1040).offset_from(base), 0x40);
        assert!(Address::null().is_null());
        assert!(!base.is_null());
    }

    #[test]
    fn test_copy_preserves_fields() {
        let mut original = ManagedObject::new(Zone::Young, 48);
        original.fields_mut().push(Address::new(0x2000));
        original.header.mark(3);

        let copy = ManagedObject::copy_of(&original);
        assert_eq!(copy.size_in_bytes(), 48);
        assert_eq!(copy.fields(), &[Address::new(0x2000)]);
        assert!(!copy.header.marked_p(3));
    }

    #[test]
    fn test_sweep_region_keeps_marked_and_young() {
        let mut space = ObjectSpace::new();

        let mut live = ManagedObject::new(Zone::Mature, 16);
        live.header.set_in_region();
        live.header.mark(2);
        space.insert(Address::new(0x1000), live);

        let mut dead = ManagedObject::new(Zone::Mature, 16);
        dead.header.set_in_region();
        dead.header.set_inflated_index(Some(5));
        space.insert(Address::new(0x1010), dead);

        space.insert(Address::new(0x10), ManagedObject::new(Zone::Young, 16));

        let removed = space.sweep_region(2);
        assert_eq!(removed, vec![(Address::new(0x1010), Some(5))]);
        assert!(space.contains(Address::new(0x1000)));
        assert!(space.contains(Address::new(0x10)));
        assert_eq!(space.len(), 2);
    }

    #[test]
    fn test_sweep_young_keeps_only_marked_records() {
        let mut space = ObjectSpace::new();

        let mut reached = ManagedObject::new(Zone::Young, 16);
        reached.header.mark(4);
        space.insert(Address::new(0x10), reached);

        let mut moved_now = ManagedObject::new(Zone::Young, 16);
        moved_now.header.set_forward(Address::new(0x2000));
        moved_now.header.mark(4);
        space.insert(Address::new(0x20), moved_now);

        let mut moved_before = ManagedObject::new(Zone::Young, 16);
        moved_before.header.set_forward(Address::new(0x3000));
        moved_before.header.mark(3);
        space.insert(Address::new(0x30), moved_before);

        space.insert(Address::new(0x40), ManagedObject::new(Zone::Young, 16));

        let mut unmarked_mature = ManagedObject::new(Zone::Mature, 16);
        unmarked_mature.header.set_in_region();
        space.insert(Address::new(0x1000), unmarked_mature);

        assert_eq!(space.sweep_young(4), 2);
        assert!(space.contains(Address::new(0x10)));
        assert!(space.contains(Address::new(0x20)));
        assert!(!space.contains(Address::new(0x30)));
        assert!(!space.contains(Address::new(0x40)));
        assert!(space.contains(Address::new(0x1000)));
    }
}
