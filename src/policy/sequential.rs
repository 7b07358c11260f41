//! Single-process numbering.

use crate::algs::enumerate;
use crate::algs::renumber::{self, Permutation};
use crate::algs::renumbering::check_permutation;
use crate::data::DofIndex;
use crate::data::dof_store::DofStore;
use crate::data::number_cache::NumberCache;
use crate::dof_error::DofError;
use crate::topology::triangulation::Triangulation;

pub fn distribute_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
) -> Result<NumberCache, DofError> {
    store.clear_active();
    let n = enumerate::distribute_dofs(tria, store, 0, None)?;
    log::debug!("sequential numbering: {n} DoFs on {} active cells", tria.n_active_cells());
    Ok(NumberCache::serial(n))
}

/// One independent numbering per level, each starting at zero.
pub fn distribute_multilevel_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
) -> Result<Vec<NumberCache>, DofError> {
    store.init_multilevel(tria);
    (0..tria.n_levels())
        .map(|level| {
            let n = enumerate::distribute_dofs_on_level(tria, store, level, 0, None)?;
            log::debug!("level {level}: {n} DoFs");
            Ok(NumberCache::serial(n))
        })
        .collect()
}

fn check_length(new_numbers: &[DofIndex], n: DofIndex) -> Result<(), DofError> {
    if new_numbers.len() as u64 != n {
        return Err(DofError::Precondition(format!(
            "renumbering has {} entries for {n} DoFs",
            new_numbers.len()
        )));
    }
    check_permutation(new_numbers)
}

pub fn renumber_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    current: &NumberCache,
    new_numbers: &[DofIndex],
) -> Result<NumberCache, DofError> {
    let n = current.n_global_dofs;
    check_length(new_numbers, n)?;
    renumber::renumber_dofs(tria, store, &Permutation::full(new_numbers), true)?;
    Ok(NumberCache::serial(n))
}

pub fn renumber_level_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
    level: usize,
    current: &NumberCache,
    new_numbers: &[DofIndex],
) -> Result<NumberCache, DofError> {
    let n = current.n_global_dofs;
    check_length(new_numbers, n)?;
    renumber::renumber_level_dofs(tria, store, level, &Permutation::full(new_numbers), true)?;
    Ok(NumberCache::serial(n))
}
