//! Per-entity storage of global DoF indices.
//!
//! Each shared entity (vertex, line, quad) and each cell interior owns a
//! fixed number of slots given by the finite element. A slot holds a global
//! index or [`INVALID_DOF`]. The active numbering and the multilevel
//! numbering live side by side; a vertex gets one group of multilevel slots
//! for every level it exists on.
//!
//! The store is sized for one triangulation and one element. Refining or
//! repartitioning the mesh makes it stale; it is rebuilt by the next
//! `distribute_dofs`.

use crate::data::fe::FiniteElement;
use crate::data::{DofIndex, INVALID_DOF};
use crate::topology::triangulation::{CellId, Triangulation};

/// Something that carries DoF slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// Shared entity of dimension `dim` below the cell dimension.
    Object { dim: usize, index: usize },
    /// The interior of a cell.
    Interior(CellId),
}

impl Entity {
    pub const fn vertex(index: usize) -> Self {
        Entity::Object { dim: 0, index }
    }
}

/// Which numbering a slot access refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Numbering of the active cells.
    Active,
    /// Per-level numbering; the level comes from the cell being addressed.
    Level,
}

#[derive(Debug, Clone)]
struct MultilevelSlots {
    vertex_coarsest: Vec<usize>,
    vertex_offset: Vec<usize>,
    vertex_n_levels: Vec<usize>,
    vertex_slots: Vec<DofIndex>,
    objects: Vec<Vec<DofIndex>>,
    interiors: Vec<Vec<DofIndex>>,
}

#[derive(Debug, Clone)]
pub struct DofStore {
    dim: usize,
    dofs_per_object: [usize; 4],
    objects: Vec<Vec<DofIndex>>,
    interiors: Vec<Vec<DofIndex>>,
    multilevel: Option<MultilevelSlots>,
}

impl DofStore {
    /// All slots of `tria` for `fe`, every one invalid.
    pub fn new<const D: usize>(tria: &Triangulation<D>, fe: &FiniteElement) -> Self {
        let mut dofs_per_object = [0; 4];
        for (d, n) in dofs_per_object.iter_mut().enumerate().take(D + 1) {
            *n = fe.dofs_per_object(d);
        }
        Self {
            dim: D,
            dofs_per_object,
            objects: (0..D)
                .map(|d| vec![INVALID_DOF; tria.n_entities(d) * dofs_per_object[d]])
                .collect(),
            interiors: (0..tria.n_levels())
                .map(|l| vec![INVALID_DOF; tria.n_cells(l) * dofs_per_object[D]])
                .collect(),
            multilevel: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn dofs_per_object(&self, dim: usize) -> usize {
        self.dofs_per_object[dim]
    }

    fn n_slots(&self, e: Entity) -> usize {
        match e {
            Entity::Object { dim, .. } => self.dofs_per_object[dim],
            Entity::Interior(_) => self.dofs_per_object[self.dim],
        }
    }

    /// Reset the active numbering to all-invalid.
    pub fn clear_active(&mut self) {
        for v in self.objects.iter_mut().chain(self.interiors.iter_mut()) {
            v.fill(INVALID_DOF);
        }
    }

    /// Allocate (or reset) multilevel slots for every level of `tria`.
    pub fn init_multilevel<const D: usize>(&mut self, tria: &Triangulation<D>) {
        let dpv = self.dofs_per_object[0];
        let n_vertices = tria.n_vertices();
        let mut vertex_coarsest = Vec::with_capacity(n_vertices);
        let mut vertex_offset = Vec::with_capacity(n_vertices);
        let mut vertex_n_levels = Vec::with_capacity(n_vertices);
        let mut total = 0;
        for v in 0..n_vertices {
            let (lo, hi) = tria.vertex_level_range(v);
            vertex_coarsest.push(lo);
            vertex_offset.push(total);
            vertex_n_levels.push(hi - lo + 1);
            total += (hi - lo + 1) * dpv;
        }
        let mut objects = vec![Vec::new()];
        objects.extend((1..D).map(|d| vec![INVALID_DOF; tria.n_entities(d) * self.dofs_per_object[d]]));
        self.multilevel = Some(MultilevelSlots {
            vertex_coarsest,
            vertex_offset,
            vertex_n_levels,
            vertex_slots: vec![INVALID_DOF; total],
            objects,
            interiors: (0..tria.n_levels())
                .map(|l| vec![INVALID_DOF; tria.n_cells(l) * self.dofs_per_object[D]])
                .collect(),
        });
    }

    pub fn has_multilevel(&self) -> bool {
        self.multilevel.is_some()
    }

    fn range(&self, layer: Layer, level: usize, e: Entity) -> Option<std::ops::Range<usize>> {
        let n = self.n_slots(e);
        match (layer, e) {
            (Layer::Active, Entity::Object { index, .. }) => Some(index * n..(index + 1) * n),
            (Layer::Active, Entity::Interior(c)) => Some(c.index * n..(c.index + 1) * n),
            (Layer::Level, Entity::Object { dim: 0, index }) => {
                let mg = self.multilevel.as_ref()?;
                let lo = mg.vertex_coarsest[index];
                if level < lo || level >= lo + mg.vertex_n_levels[index] {
                    return None;
                }
                let start = mg.vertex_offset[index] + (level - lo) * n;
                Some(start..start + n)
            }
            (Layer::Level, Entity::Object { index, .. }) => {
                self.multilevel.as_ref()?;
                Some(index * n..(index + 1) * n)
            }
            (Layer::Level, Entity::Interior(c)) => {
                self.multilevel.as_ref()?;
                Some(c.index * n..(c.index + 1) * n)
            }
        }
    }

    /// Slots of `e` in `layer`. Vertices that do not live on `level` have none.
    pub fn slots(&self, layer: Layer, level: usize, e: Entity) -> &[DofIndex] {
        let Some(r) = self.range(layer, level, e) else {
            return &[];
        };
        match (layer, e) {
            (Layer::Active, Entity::Object { dim, .. }) => &self.objects[dim][r],
            (Layer::Active, Entity::Interior(c)) => &self.interiors[c.level][r],
            (Layer::Level, _) => {
                let Some(mg) = self.multilevel.as_ref() else {
                    return &[];
                };
                match e {
                    Entity::Object { dim: 0, .. } => &mg.vertex_slots[r],
                    Entity::Object { dim, .. } => &mg.objects[dim][r],
                    Entity::Interior(c) => &mg.interiors[c.level][r],
                }
            }
        }
    }

    pub fn slots_mut(&mut self, layer: Layer, level: usize, e: Entity) -> &mut [DofIndex] {
        let Some(r) = self.range(layer, level, e) else {
            return &mut [];
        };
        match (layer, e) {
            (Layer::Active, Entity::Object { dim, .. }) => &mut self.objects[dim][r],
            (Layer::Active, Entity::Interior(c)) => &mut self.interiors[c.level][r],
            (Layer::Level, _) => {
                let Some(mg) = self.multilevel.as_mut() else {
                    return &mut [];
                };
                match e {
                    Entity::Object { dim: 0, .. } => &mut mg.vertex_slots[r],
                    Entity::Object { dim, .. } => &mut mg.objects[dim][r],
                    Entity::Interior(c) => &mut mg.interiors[c.level][r],
                }
            }
        }
    }

    /// Active index in slot `slot` of `e`.
    pub fn get(&self, e: Entity, slot: usize) -> DofIndex {
        self.slots(Layer::Active, 0, e)
            .get(slot)
            .copied()
            .unwrap_or(INVALID_DOF)
    }

    pub fn set(&mut self, e: Entity, slot: usize, index: DofIndex) {
        if let Some(s) = self.slots_mut(Layer::Active, 0, e).get_mut(slot) {
            *s = index;
        }
    }

    pub fn get_level(&self, level: usize, e: Entity, slot: usize) -> DofIndex {
        self.slots(Layer::Level, level, e)
            .get(slot)
            .copied()
            .unwrap_or(INVALID_DOF)
    }

    pub fn set_level(&mut self, level: usize, e: Entity, slot: usize, index: DofIndex) {
        if let Some(s) = self.slots_mut(Layer::Level, level, e).get_mut(slot) {
            *s = index;
        }
    }

    /// Flat active slots of all entities of dimension `dim < D`.
    pub(crate) fn object_slots_mut(&mut self, dim: usize) -> &mut [DofIndex] {
        &mut self.objects[dim]
    }

    /// Flat active interior slots of one level.
    pub(crate) fn interior_slots_mut(&mut self, level: usize) -> &mut [DofIndex] {
        match self.interiors.get_mut(level) {
            Some(v) => v,
            None => &mut [],
        }
    }

    /// Flat multilevel interior slots of one level.
    pub(crate) fn level_interior_slots_mut(&mut self, level: usize) -> &mut [DofIndex] {
        match self.multilevel.as_mut().and_then(|mg| mg.interiors.get_mut(level)) {
            Some(v) => v,
            None => &mut [],
        }
    }

    /// Global indices of a cell: vertices, lines, quads, then the interior.
    pub fn cell_indices<const D: usize>(
        &self,
        layer: Layer,
        tria: &Triangulation<D>,
        id: CellId,
        out: &mut Vec<DofIndex>,
    ) {
        out.clear();
        for e in cell_entities(tria, id) {
            out.extend_from_slice(self.slots(layer, id.level, e));
        }
    }

    /// Inverse of [`cell_indices`](Self::cell_indices).
    pub fn set_cell_indices<const D: usize>(
        &mut self,
        layer: Layer,
        tria: &Triangulation<D>,
        id: CellId,
        values: &[DofIndex],
    ) {
        let mut pos = 0;
        for e in cell_entities(tria, id) {
            let slots = self.slots_mut(layer, id.level, e);
            let n = slots.len();
            if let Some(src) = values.get(pos..pos + n) {
                slots.copy_from_slice(src);
            }
            pos += n;
        }
    }
}

/// Entities of a cell in DoF order: vertices, lines, quads, interior.
pub fn cell_entities<const D: usize>(
    tria: &Triangulation<D>,
    id: CellId,
) -> impl Iterator<Item = Entity> + '_ {
    let cell = tria.cell(id);
    (0..D)
        .flat_map(move |dim| {
            cell.entities(dim)
                .iter()
                .map(move |&index| Entity::Object { dim, index })
        })
        .chain(std::iter::once(Entity::Interior(id)))
}
