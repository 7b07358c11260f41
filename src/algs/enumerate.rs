//! First-touch enumeration of DoF slots.
//!
//! Cells are visited in storage order (ascending level, then ascending
//! index). The first cell to reach a shared entity assigns consecutive
//! indices to all of the entity's slots; later cells see a valid first slot
//! and skip it. An entity is therefore either fully assigned or not at all.

use crate::data::dof_store::{DofStore, Entity, Layer, cell_entities};
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::ownership::SubdomainId;
use crate::topology::triangulation::{CellId, Triangulation};

/// Assign fresh indices to every unassigned slot of one cell.
///
/// Returns the next free index.
///
/// # Errors
/// [`DofError::PartiallyAssignedEntity`] if an entity of the cell has some
/// but not all of its slots assigned.
pub fn distribute_dofs_on_cell<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    layer: Layer,
    id: CellId,
    mut next_free: DofIndex,
) -> Result<DofIndex, DofError> {
    for e in cell_entities(tria, id) {
        let slots = store.slots_mut(layer, id.level, e);
        let Some(&first) = slots.first() else {
            continue;
        };
        if first == INVALID_DOF {
            if slots.iter().any(|&s| s != INVALID_DOF) {
                return Err(DofError::PartiallyAssignedEntity(e));
            }
            for s in slots.iter_mut() {
                *s = next_free;
                next_free += 1;
            }
        } else if slots.contains(&INVALID_DOF) {
            return Err(DofError::PartiallyAssignedEntity(e));
        }
    }
    Ok(next_free)
}

/// Number all active cells (or only those of `subdomain`) starting at `offset`.
///
/// Returns the next free index, i.e. `offset` plus the number of indices assigned.
pub fn distribute_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    offset: DofIndex,
    subdomain: Option<SubdomainId>,
) -> Result<DofIndex, DofError> {
    if tria.n_levels() == 0 {
        return Err(DofError::EmptyTriangulation);
    }
    let mut next = offset;
    for id in tria.active_cell_ids() {
        if subdomain.is_some_and(|s| tria.cell(id).subdomain_id() != s) {
            continue;
        }
        next = distribute_dofs_on_cell(tria, store, Layer::Active, id, next)?;
    }
    log::trace!("enumerated {} active DoFs from offset {offset}", next - offset);
    Ok(next)
}

/// Number the cells of one level (or only those level-owned by `level_subdomain`).
///
/// A level beyond the hierarchy holds no cells and assigns nothing.
pub fn distribute_dofs_on_level<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    level: usize,
    offset: DofIndex,
    level_subdomain: Option<SubdomainId>,
) -> Result<DofIndex, DofError> {
    if tria.n_levels() == 0 {
        return Err(DofError::EmptyTriangulation);
    }
    let mut next = offset;
    for id in tria.cell_ids(level) {
        if level_subdomain.is_some_and(|s| tria.cell(id).level_subdomain_id() != s) {
            continue;
        }
        next = distribute_dofs_on_cell(tria, store, Layer::Level, id, next)?;
    }
    log::trace!("enumerated {} DoFs on level {level}", next - offset);
    Ok(next)
}

/// True if no slot of the cell is invalid.
pub fn cell_is_complete<const D: usize>(
    tria: &Triangulation<D>,
    store: &DofStore,
    layer: Layer,
    id: CellId,
) -> bool {
    cell_entities(tria, id).all(|e: Entity| !store.slots(layer, id.level, e).contains(&INVALID_DOF))
}
