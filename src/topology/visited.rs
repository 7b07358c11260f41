//! Scoped visited sets.
//!
//! Algorithms that must touch every shared entity or every marked cell once
//! allocate one of these for the duration of a single call instead of
//! borrowing flags stored on the mesh.

use crate::topology::triangulation::{CellId, Triangulation};

/// Visited set over the entities of one dimension.
#[derive(Debug, Clone)]
pub struct VisitedSet {
    seen: Vec<bool>,
}

impl VisitedSet {
    pub fn new(n: usize) -> Self {
        Self {
            seen: vec![false; n],
        }
    }

    /// Marks `i`; returns true if it was not marked before.
    pub fn insert(&mut self, i: usize) -> bool {
        !std::mem::replace(&mut self.seen[i], true)
    }

    pub fn contains(&self, i: usize) -> bool {
        self.seen[i]
    }
}

/// Per-level set of marked cells.
#[derive(Debug, Clone)]
pub struct CellMarks {
    levels: Vec<Vec<bool>>,
    count: usize,
}

impl CellMarks {
    pub fn new<const D: usize>(tria: &Triangulation<D>) -> Self {
        Self {
            levels: (0..tria.n_levels()).map(|l| vec![false; tria.n_cells(l)]).collect(),
            count: 0,
        }
    }

    /// All cells satisfying `pred`.
    pub fn from_predicate<const D: usize, F>(tria: &Triangulation<D>, pred: F) -> Self
    where
        F: Fn(CellId) -> bool,
    {
        let mut marks = Self::new(tria);
        for id in tria.all_cell_ids() {
            if pred(id) {
                marks.insert(id);
            }
        }
        marks
    }

    pub fn insert(&mut self, id: CellId) -> bool {
        let was = std::mem::replace(&mut self.levels[id.level][id.index], true);
        if !was {
            self.count += 1;
        }
        !was
    }

    pub fn remove(&mut self, id: CellId) -> bool {
        let was = std::mem::replace(&mut self.levels[id.level][id.index], false);
        if was {
            self.count -= 1;
        }
        was
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.levels[id.level][id.index]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Marked cells in level-then-index order.
    pub fn iter(&self) -> impl Iterator<Item = CellId> + '_ {
        self.levels.iter().enumerate().flat_map(|(level, marks)| {
            marks
                .iter()
                .enumerate()
                .filter(|&(_, &m)| m)
                .map(move |(index, _)| CellId { level, index })
        })
    }
}
