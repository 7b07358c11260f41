//! Quad/oct-tree addressing of cells inside a coarse tree.
//!
//! A cell of a forest mesh is named by the index of its coarse tree plus a
//! [`TreeCell`]: its refinement level and integer coordinates on that level.
//! The address is independent of any rank-local storage order, which is what
//! makes it usable on the wire.

/// Deepest refinement level a tree can address.
pub const MAX_REFINEMENT_LEVEL: u8 = 24;

/// A cell in a quadtree/octree, relative to its coarse tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeCell<const D: usize> {
    /// Refinement level (0 is the tree root).
    pub level: u8,
    /// Integer coordinates at the given level.
    pub coords: [u32; D],
}

impl<const D: usize> TreeCell<D> {
    /// The root of a tree.
    pub const fn root() -> Self {
        Self {
            level: 0,
            coords: [0; D],
        }
    }

    /// Returns the parent cell, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        let mut coords = self.coords;
        for c in &mut coords {
            *c /= 2;
        }
        Some(Self {
            level: self.level - 1,
            coords,
        })
    }

    /// Child `idx` in `0..2^D`; bit `a` of `idx` selects the upper half along axis `a`.
    pub fn child(&self, idx: usize) -> Self {
        let mut coords = [0u32; D];
        for (axis, c) in coords.iter_mut().enumerate() {
            *c = self.coords[axis] * 2 + ((idx >> axis) & 1) as u32;
        }
        Self {
            level: self.level + 1,
            coords,
        }
    }

    /// Returns the `2^D` children of this cell in child-index order.
    pub fn children(&self) -> Vec<Self> {
        (0..1usize << D).map(|i| self.child(i)).collect()
    }

    /// Position of this cell among its siblings.
    pub fn child_index(&self) -> usize {
        self.coords
            .iter()
            .enumerate()
            .fold(0, |acc, (axis, &c)| acc | (((c & 1) as usize) << axis))
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        if other.level <= self.level {
            return false;
        }
        let shift = other.level - self.level;
        self.coords
            .iter()
            .zip(other.coords.iter())
            .all(|(&a, &b)| (b >> shift) == a)
    }

    /// Index of the child of `self` on the path towards the descendant `target`.
    pub fn child_towards(&self, target: &Self) -> Option<usize> {
        if !self.is_ancestor_of(target) {
            return None;
        }
        let shift = target.level - self.level - 1;
        Some(
            target
                .coords
                .iter()
                .enumerate()
                .fold(0, |acc, (axis, &c)| acc | ((((c >> shift) & 1) as usize) << axis)),
        )
    }

    /// Z-order key of the cell's lower corner on the finest addressable grid.
    pub fn morton_key(&self) -> u128 {
        let shift = MAX_REFINEMENT_LEVEL - self.level;
        let mut key = 0u128;
        for bit in 0..MAX_REFINEMENT_LEVEL as usize {
            for axis in 0..D {
                let c = (self.coords[axis] << shift) as u128;
                key |= ((c >> bit) & 1) << (bit * D + axis);
            }
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_child_roundtrip() {
        let c = TreeCell::<2> {
            level: 2,
            coords: [3, 1],
        };
        for (i, ch) in c.children().iter().enumerate() {
            assert_eq!(ch.parent(), Some(c));
            assert_eq!(ch.child_index(), i);
        }
        assert_eq!(TreeCell::<2>::root().parent(), None);
    }

    #[test]
    fn descent_path() {
        let root = TreeCell::<3>::root();
        let target = root.child(5).child(2).child(7);
        assert!(root.is_ancestor_of(&target));
        assert!(!target.is_ancestor_of(&root));
        let mut cur = root;
        let mut path = Vec::new();
        while let Some(i) = cur.child_towards(&target) {
            path.push(i);
            cur = cur.child(i);
        }
        assert_eq!(path, vec![5, 2, 7]);
        assert_eq!(cur, target);
    }

    #[test]
    fn morton_orders_siblings_by_child_index() {
        let root = TreeCell::<2>::root();
        let keys: Vec<_> = root.children().iter().map(|c| c.morton_key()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }
}
