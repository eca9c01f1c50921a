use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};

use slab::Slab;

use crate::*;

/// A handle to a view in a [`ViewTree`].
///
/// This has the same guarantees as a slab key: once the view is [destroyed](ViewTree::destroy), the handle can point to an unrelated view that took its slot. [`ViewTree::serial`] tells the two apart.
/// Detaching a view with [`ViewTree::remove_from_superview`] does not free it, so handles stay valid across reparenting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewI(NonZeroU32);

impl ViewI {
    pub(crate) fn from(value: usize) -> Self {
        match NonZeroU32::new(value as u32) {
            Some(i) => ViewI(i),
            None => panic!("Trellis: Internal error: view index zero is reserved for the dummy view"),
        }
    }

    pub fn as_usize(&self) -> usize {
        return self.0.get() as usize;
    }
}

#[derive(Debug)]
pub(crate) struct Views {
    pub(crate) views: Slab<ViewNode>,
    // bumped on every insert, so a reused slot never repeats a serial.
    next_serial: u64,
}

impl Index<ViewI> for Views {
    type Output = ViewNode;
    fn index(&self, i: ViewI) -> &Self::Output {
        return &self.views[i.as_usize()];
    }
}

impl IndexMut<ViewI> for Views {
    fn index_mut(&mut self, i: ViewI) -> &mut Self::Output {
        return &mut self.views[i.as_usize()];
    }
}

impl Views {
    pub(crate) fn new() -> Self {
        let mut views = Slab::with_capacity(64);
        // Insert a dummy view at position zero and never remove it, so that real views can be indexed by NonZeroU32
        views.insert(ViewNode::new(Rect::ZERO, ViewRole::Plain));
        return Views { views, next_serial: 0 };
    }

    pub(crate) fn insert(&mut self, mut node: ViewNode) -> ViewI {
        self.next_serial += 1;
        node.serial = self.next_serial;
        return ViewI::from(self.views.insert(node));
    }

    pub(crate) fn remove(&mut self, i: ViewI) -> ViewNode {
        return self.views.remove(i.as_usize());
    }

    pub(crate) fn contains(&self, i: ViewI) -> bool {
        return self.views.contains(i.as_usize());
    }

    pub(crate) fn get(&self, i: ViewI) -> Option<&ViewNode> {
        return self.views.get(i.as_usize());
    }

    pub(crate) fn get_mut(&mut self, i: ViewI) -> Option<&mut ViewNode> {
        return self.views.get_mut(i.as_usize());
    }

    /// Number of live views, not counting the dummy.
    pub(crate) fn len(&self) -> usize {
        return self.views.len() - 1;
    }
}
