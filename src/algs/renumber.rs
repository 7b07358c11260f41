//! Apply a permutation to every stored DoF index.
//!
//! A permutation is either *full* (position `i` holds the new value of index
//! `i`) or *restricted* to an [`IndexSet`] (position `k` holds the new value
//! of the `k`-th element of the set). New values may be [`INVALID_DOF`],
//! which is how numbers are revoked. Invalid slots are left untouched.

use crate::data::dof_store::{DofStore, Entity, Layer};
use crate::data::index_set::IndexSet;
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::triangulation::Triangulation;
use crate::topology::visited::VisitedSet;

/// Old-index → new-index lookup.
#[derive(Debug, Clone, Copy)]
pub struct Permutation<'a> {
    new_numbers: &'a [DofIndex],
    restricted_to: Option<&'a IndexSet>,
}

impl<'a> Permutation<'a> {
    pub fn full(new_numbers: &'a [DofIndex]) -> Self {
        Self {
            new_numbers,
            restricted_to: None,
        }
    }

    pub fn restricted(new_numbers: &'a [DofIndex], set: &'a IndexSet) -> Self {
        Self {
            new_numbers,
            restricted_to: Some(set),
        }
    }

    /// New value for `old`.
    ///
    /// # Errors
    /// [`DofError::IndexNotInSet`] for a restricted permutation and an index
    /// outside its set; [`DofError::PermutationIndexOutOfRange`] if the lookup
    /// position is past the end.
    pub fn map(&self, old: DofIndex) -> Result<DofIndex, DofError> {
        let pos = match self.restricted_to {
            None => old,
            Some(set) => set.index_within_set(old).ok_or(DofError::IndexNotInSet(old))?,
        };
        self.new_numbers
            .get(pos as usize)
            .copied()
            .ok_or(DofError::PermutationIndexOutOfRange {
                index: pos,
                len: self.new_numbers.len(),
            })
    }

    fn apply(&self, slots: &mut [DofIndex]) -> Result<(), DofError> {
        for s in slots.iter_mut().filter(|s| **s != INVALID_DOF) {
            *s = self.map(*s)?;
        }
        Ok(())
    }
}

/// Rewrite the active numbering.
///
/// With `check_validity`, an invalid index on a vertex that is in use by a
/// non-artificial cell is an error.
pub fn renumber_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    perm: &Permutation<'_>,
    check_validity: bool,
) -> Result<(), DofError> {
    let dpv = store.dofs_per_object(0);
    if dpv > 0 {
        let vertices = store.object_slots_mut(0);
        for (v, slots) in vertices.chunks_exact_mut(dpv).enumerate() {
            if check_validity && tria.is_vertex_used(v) && slots.contains(&INVALID_DOF) {
                return Err(DofError::InvalidDofOnUsedVertex(v));
            }
            perm.apply(slots)?;
        }
    }
    for dim in 1..D {
        perm.apply(store.object_slots_mut(dim))?;
    }
    for level in 0..tria.n_levels() {
        perm.apply(store.interior_slots_mut(level))?;
    }
    Ok(())
}

/// Rewrite the multilevel numbering of one level.
///
/// Lines and quads shared by several cells of the level are rewritten once,
/// tracked by visited sets that live for this call only.
pub fn renumber_level_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    level: usize,
    perm: &Permutation<'_>,
    check_validity: bool,
) -> Result<(), DofError> {
    if store.dofs_per_object(0) > 0 {
        for v in 0..tria.n_vertices() {
            let (lo, hi) = tria.vertex_level_range(v);
            if level < lo || level > hi {
                continue;
            }
            let slots = store.slots_mut(Layer::Level, level, Entity::vertex(v));
            if check_validity && slots.contains(&INVALID_DOF) {
                return Err(DofError::InvalidDofOnUsedVertex(v));
            }
            perm.apply(slots)?;
        }
    }
    for dim in 1..D {
        if store.dofs_per_object(dim) == 0 {
            continue;
        }
        let mut visited = VisitedSet::new(tria.n_entities(dim));
        for id in tria.cell_ids(level) {
            for &index in tria.cell(id).entities(dim) {
                if visited.insert(index) {
                    perm.apply(store.slots_mut(Layer::Level, level, Entity::Object { dim, index }))?;
                }
            }
        }
    }
    perm.apply(store.level_interior_slots_mut(level))
}
