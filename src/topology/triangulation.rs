//! Hierarchical forest-of-trees mesh with shared sub-entities.
//!
//! A [`Triangulation`] is a brick of coarse trees, each refined as a
//! quad/oct-tree. Cells are kept per level in creation order, so a
//! [`CellId`] (`level`, `index`) is stable for the lifetime of the mesh and
//! identical on every rank that builds the same mesh. Vertices, lines and
//! quads are registered once by geometric key and referenced by index from
//! every cell that contains them.

use crate::dof_error::DofError;
use crate::topology::forest::{MAX_REFINEMENT_LEVEL, TreeCell};
use crate::topology::ownership::{Partition, SubdomainId};
use crate::topology::reference::sub_entity_offsets;
use hashbrown::HashMap;

/// Structural address of a cell: its level and its index within that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub level: usize,
    pub index: usize,
}

impl CellId {
    pub const fn new(level: usize, index: usize) -> Self {
        Self { level, index }
    }
}

/// A cell of the hierarchy, active (leaf) or refined.
#[derive(Debug, Clone)]
pub struct Cell<const D: usize> {
    tree: u32,
    quadrant: TreeCell<D>,
    parent: Option<usize>,
    first_child: Option<usize>,
    pub(crate) subdomain_id: SubdomainId,
    pub(crate) true_subdomain_id: SubdomainId,
    pub(crate) level_subdomain_id: SubdomainId,
    /// `entities[d]` lists the shared entities of dimension `d < D`.
    entities: Vec<Vec<usize>>,
}

impl<const D: usize> Cell<D> {
    pub fn tree(&self) -> u32 {
        self.tree
    }
    pub fn quadrant(&self) -> &TreeCell<D> {
        &self.quadrant
    }
    pub fn level(&self) -> usize {
        self.quadrant.level as usize
    }
    pub fn is_active(&self) -> bool {
        self.first_child.is_none()
    }
    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }
    /// Subdomain as seen by this rank; may be the artificial marker.
    pub fn subdomain_id(&self) -> SubdomainId {
        self.subdomain_id
    }
    /// Owner assigned by the partitioner, regardless of artificial marking.
    pub fn true_subdomain_id(&self) -> SubdomainId {
        self.true_subdomain_id
    }
    pub fn level_subdomain_id(&self) -> SubdomainId {
        self.level_subdomain_id
    }
    /// Indices of the sub-entities of dimension `dim` (`dim < D`).
    pub fn entities(&self, dim: usize) -> &[usize] {
        &self.entities[dim]
    }
    pub fn vertices(&self) -> &[usize] {
        &self.entities[0]
    }
}

/// Geometric identity of a shared entity.
///
/// Vertices use their coordinates on the finest addressable grid; objects of
/// higher dimension use their doubled-lattice coordinates on their own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntityKey<const D: usize> {
    level: u8,
    coords: [u64; D],
}

/// Mesh hierarchy over a brick of coarse trees.
#[derive(Debug, Clone)]
pub struct Triangulation<const D: usize> {
    trees_per_axis: [u32; D],
    levels: Vec<Vec<Cell<D>>>,
    entity_keys: Vec<HashMap<EntityKey<D>, usize>>,
    vertex_levels: Vec<(u8, u8)>,
    pub(crate) vertex_used: Vec<bool>,
    pub(crate) partition: Partition,
}

impl<const D: usize> Triangulation<D> {
    /// A brick of `trees_per_axis` unit trees; tree indices run axis 0 fastest.
    pub fn hyper_rectangle(trees_per_axis: [u32; D]) -> Self {
        assert!((1..=3).contains(&D), "only 1, 2 and 3 dimensions are supported");
        let mut tria = Self {
            trees_per_axis,
            levels: Vec::new(),
            entity_keys: (0..D).map(|_| HashMap::new()).collect(),
            vertex_levels: Vec::new(),
            vertex_used: Vec::new(),
            partition: Partition::serial(),
        };
        let n_trees: u32 = trees_per_axis.iter().product();
        if n_trees > 0 {
            tria.levels.push(Vec::with_capacity(n_trees as usize));
            for tree in 0..n_trees {
                tria.push_cell(tree, TreeCell::root(), None);
            }
        }
        tria.refresh_vertex_usage();
        tria
    }

    /// The unit hypercube as a single tree.
    pub fn hyper_cube() -> Self {
        Self::hyper_rectangle([1; D])
    }

    /// A mesh without cells.
    pub fn empty() -> Self {
        Self::hyper_rectangle([0; D])
    }

    pub fn dim(&self) -> usize {
        D
    }

    pub fn n_trees(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn n_cells(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    pub fn n_active_cells(&self) -> usize {
        self.levels
            .iter()
            .flatten()
            .filter(|c| c.is_active())
            .count()
    }

    /// Number of shared entities of dimension `dim < D`.
    pub fn n_entities(&self, dim: usize) -> usize {
        self.entity_keys.get(dim).map_or(0, HashMap::len)
    }

    pub fn n_vertices(&self) -> usize {
        self.n_entities(0)
    }

    /// Coarsest and finest level of the cells a vertex belongs to.
    pub fn vertex_level_range(&self, vertex: usize) -> (usize, usize) {
        let (lo, hi) = self.vertex_levels[vertex];
        (lo as usize, hi as usize)
    }

    /// True if the vertex touches an active cell that is not artificial.
    pub fn is_vertex_used(&self, vertex: usize) -> bool {
        self.vertex_used.get(vertex).copied().unwrap_or(false)
    }

    pub fn cell(&self, id: CellId) -> &Cell<D> {
        &self.levels[id.level][id.index]
    }

    pub fn try_cell(&self, id: CellId) -> Result<&Cell<D>, DofError> {
        self.levels
            .get(id.level)
            .and_then(|l| l.get(id.index))
            .ok_or(DofError::UnknownCell(id))
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> &mut Cell<D> {
        &mut self.levels[id.level][id.index]
    }

    /// All cells of one level in storage order.
    pub fn cell_ids(&self, level: usize) -> impl Iterator<Item = CellId> + '_ {
        (0..self.n_cells(level)).map(move |index| CellId { level, index })
    }

    /// All cells, level by level.
    pub fn all_cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.n_levels()).flat_map(move |l| self.cell_ids(l))
    }

    /// Active cells, ascending level then ascending index.
    pub fn active_cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.all_cell_ids().filter(move |&id| self.cell(id).is_active())
    }

    pub fn coarse_cell(&self, tree: u32) -> Option<CellId> {
        ((tree as usize) < self.n_trees()).then_some(CellId::new(0, tree as usize))
    }

    pub fn parent(&self, id: CellId) -> Option<CellId> {
        self.cell(id)
            .parent
            .map(|index| CellId::new(id.level - 1, index))
    }

    /// Child `i` of a refined cell.
    pub fn child(&self, id: CellId, i: usize) -> Option<CellId> {
        self.cell(id)
            .first_child
            .map(|first| CellId::new(id.level + 1, first + i))
    }

    pub fn children(&self, id: CellId) -> impl Iterator<Item = CellId> + '_ {
        let first = self.cell(id).first_child;
        (0..first.map_or(0, |_| 1usize << D)).filter_map(move |i| self.child(id, i))
    }

    /// Resolve a wire address by descending from the coarse cell of `tree`.
    pub fn locate(&self, tree: u32, target: &TreeCell<D>) -> Option<CellId> {
        let mut cur = self.coarse_cell(tree)?;
        loop {
            let cell = self.cell(cur);
            if cell.quadrant == *target {
                return Some(cur);
            }
            let i = cell.quadrant.child_towards(target)?;
            cur = self.child(cur, i)?;
        }
    }

    /// Integer position of a tree inside the brick.
    pub fn tree_coords(&self, tree: u32) -> [u32; D] {
        let mut out = [0u32; D];
        let mut rest = tree;
        for (axis, c) in out.iter_mut().enumerate() {
            *c = rest % self.trees_per_axis[axis];
            rest /= self.trees_per_axis[axis];
        }
        out
    }

    /// Center of a cell; every tree spans a unit cube.
    pub fn cell_center(&self, id: CellId) -> [f64; D] {
        let cell = self.cell(id);
        let t = self.tree_coords(cell.tree);
        let h = 1.0 / f64::from(1u32 << cell.quadrant.level);
        let mut x = [0.0; D];
        for axis in 0..D {
            x[axis] = f64::from(t[axis]) + (f64::from(cell.quadrant.coords[axis]) + 0.5) * h;
        }
        x
    }

    /// Refine every active cell `times` times.
    pub fn refine_global(&mut self, times: usize) -> Result<(), DofError> {
        for _ in 0..times {
            self.refine_active(|_, _| true)?;
        }
        Ok(())
    }

    /// Refine all active cells selected by `flag`; returns the number refined.
    ///
    /// Refinement drops any partition: cells return to subdomain 0 and the
    /// mesh must be repartitioned before parallel numbering.
    pub fn refine_active<F>(&mut self, mut flag: F) -> Result<usize, DofError>
    where
        F: FnMut(CellId, &Cell<D>) -> bool,
    {
        let selected: Vec<CellId> = self
            .active_cell_ids()
            .filter(|&id| flag(id, self.cell(id)))
            .collect();
        for &id in &selected {
            if self.cell(id).quadrant.level + 1 > MAX_REFINEMENT_LEVEL {
                return Err(DofError::MaxLevelExceeded(MAX_REFINEMENT_LEVEL));
            }
        }
        for &id in &selected {
            let level = id.level + 1;
            if self.levels.len() <= level {
                self.levels.push(Vec::new());
            }
            let first = self.levels[level].len();
            let (tree, quadrant) = {
                let c = self.cell(id);
                (c.tree, c.quadrant)
            };
            for child in quadrant.children() {
                self.push_cell(tree, child, Some(id.index));
            }
            self.cell_mut(id).first_child = Some(first);
        }
        if !selected.is_empty() {
            self.reset_partition();
        }
        Ok(selected.len())
    }

    fn reset_partition(&mut self) {
        self.partition = Partition::serial();
        for cell in self.levels.iter_mut().flatten() {
            cell.subdomain_id = 0;
            cell.true_subdomain_id = 0;
            cell.level_subdomain_id = crate::topology::ownership::INVALID_SUBDOMAIN;
        }
        self.refresh_vertex_usage();
    }

    pub(crate) fn refresh_vertex_usage(&mut self) {
        let mut used = vec![false; self.n_vertices()];
        for level in &self.levels {
            for cell in level.iter().filter(|c| c.is_active()) {
                if cell.subdomain_id == crate::topology::ownership::ARTIFICIAL_SUBDOMAIN {
                    continue;
                }
                for &v in cell.vertices() {
                    used[v] = true;
                }
            }
        }
        self.vertex_used = used;
    }

    fn push_cell(&mut self, tree: u32, quadrant: TreeCell<D>, parent: Option<usize>) {
        let level = quadrant.level;
        let origin = self.tree_coords(tree);
        let mut gcoord = [0u64; D];
        for axis in 0..D {
            gcoord[axis] =
                (u64::from(origin[axis]) << level) + u64::from(quadrant.coords[axis]);
        }
        let mut entities = Vec::with_capacity(D);
        for dim in 0..D {
            let offsets = sub_entity_offsets::<D>(dim);
            let mut list = Vec::with_capacity(offsets.len());
            for o in offsets {
                let key = if dim == 0 {
                    let mut coords = [0u64; D];
                    for axis in 0..D {
                        coords[axis] = (gcoord[axis] + u64::from(o[axis] / 2))
                            << (MAX_REFINEMENT_LEVEL - level);
                    }
                    EntityKey { level: 0, coords }
                } else {
                    let mut coords = [0u64; D];
                    for axis in 0..D {
                        coords[axis] = 2 * gcoord[axis] + u64::from(o[axis]);
                    }
                    EntityKey { level, coords }
                };
                list.push(self.register_entity(dim, key, level));
            }
            entities.push(list);
        }
        self.levels[level as usize].push(Cell {
            tree,
            quadrant,
            parent,
            first_child: None,
            subdomain_id: 0,
            true_subdomain_id: 0,
            level_subdomain_id: crate::topology::ownership::INVALID_SUBDOMAIN,
            entities,
        });
    }

    fn register_entity(&mut self, dim: usize, key: EntityKey<D>, level: u8) -> usize {
        let next = self.entity_keys[dim].len();
        let idx = *self.entity_keys[dim].entry(key).or_insert(next);
        if dim == 0 {
            if idx == self.vertex_levels.len() {
                self.vertex_levels.push((level, level));
            } else {
                let range = &mut self.vertex_levels[idx];
                range.0 = range.0.min(level);
                range.1 = range.1.max(level);
            }
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_square_counts() {
        let mut tria = Triangulation::<2>::hyper_cube();
        tria.refine_global(3).unwrap();
        assert_eq!(tria.n_active_cells(), 64);
        assert_eq!(tria.n_levels(), 4);
        assert_eq!(tria.n_vertices(), 81);
        // lines of level 3 plus all coarser lines
        assert_eq!(tria.n_cells(3), 64);
        assert!(tria.n_entities(1) >= 2 * 8 * 9);
    }

    #[test]
    fn shared_vertices_between_trees() {
        let tria = Triangulation::<2>::hyper_rectangle([2, 1]);
        assert_eq!(tria.n_trees(), 2);
        assert_eq!(tria.n_vertices(), 6);
        assert_eq!(tria.n_entities(1), 7);
    }

    #[test]
    fn locate_by_descent() {
        let mut tria = Triangulation::<3>::hyper_rectangle([1, 2, 1]);
        tria.refine_global(2).unwrap();
        for id in tria.all_cell_ids().collect::<Vec<_>>() {
            let c = tria.cell(id);
            assert_eq!(tria.locate(c.tree(), c.quadrant()), Some(id));
        }
        let deep = TreeCell::<3> {
            level: 5,
            coords: [0; 3],
        };
        assert_eq!(tria.locate(0, &deep), None);
    }

    #[test]
    fn vertex_level_ranges() {
        let mut tria = Triangulation::<1>::hyper_cube();
        tria.refine_global(2).unwrap();
        // left end lives on all levels, the midpoint from level 1 down
        let left = tria.cell(CellId::new(0, 0)).vertices()[0];
        assert_eq!(tria.vertex_level_range(left), (0, 2));
        let mid = tria.cell(CellId::new(1, 0)).vertices()[1];
        assert_eq!(tria.vertex_level_range(mid), (1, 2));
    }

    #[test]
    fn refinement_beyond_max_level_is_rejected() {
        let mut tria = Triangulation::<1>::hyper_cube();
        let leftmost = |_: CellId, c: &Cell<1>| c.quadrant().coords[0] == 0;
        for _ in 0..MAX_REFINEMENT_LEVEL {
            tria.refine_active(leftmost).unwrap();
        }
        assert_eq!(tria.n_levels(), MAX_REFINEMENT_LEVEL as usize + 1);
        let err = tria.refine_active(leftmost);
        assert_eq!(err, Err(DofError::MaxLevelExceeded(MAX_REFINEMENT_LEVEL)));
    }
}
