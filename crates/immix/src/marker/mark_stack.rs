//! Mark Stack - explicit worklist for tracing
//!
//! Holds marked objects whose outgoing references are still to be traced.
//! Draining it iteratively instead of recursing keeps native stack depth
//! bounded regardless of object graph shape. Empty after every drain.

use crate::object::Address;

#[derive(Debug, Default)]
pub struct MarkStack {
    stack: Vec<Address>,
    /// Deepest the stack has been since creation
    high_water: usize,
}

impl MarkStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, addr: Address) {
        self.stack.push(addr);
        self.high_water = self.high_water.max(self.stack.len());
    }

    #[inline]
    pub fn pop(&mut self) -> Option<Address> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.stack.contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_and_high_water() {
        let mut stack = MarkStack::new();
        stack.push(Address::new(0x10));
        stack.push(Address::new(0x20));
        assert_eq!(stack.pop(), Some(Address::new(0x20)));
        stack.push(Address::new(0x30));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.high_water(), 2);

        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);
    }
}
