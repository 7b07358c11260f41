//! Numbering on a mesh every rank stores in full.
//!
//! All ranks run the same sequential numbering and then sort DoFs by the
//! subdomain that owns them, so the result is identical everywhere and every
//! partition owns a contiguous block. Ownership of a DoF goes to the lowest
//! true subdomain among its adjacent active cells.

use super::{PolicyContext, sequential};
use crate::algs::communicator::{Communicator, allgather_u64, allgather_varlen};
use crate::algs::renumber::{self, Permutation};
use crate::algs::renumbering::{check_permutation, subdomain_association, subdomain_wise};
use crate::data::dof_store::DofStore;
use crate::data::index_set::IndexSet;
use crate::data::number_cache::NumberCache;
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::triangulation::Triangulation;

pub fn distribute_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
) -> Result<NumberCache, DofError> {
    let n = sequential::distribute_dofs(tria, store)?.n_global_dofs;
    let assoc = subdomain_association(tria, store, n);
    let perm = subdomain_wise(&assoc, tria.partition().n_subdomains);
    renumber::renumber_dofs(tria, store, &Permutation::full(&perm), true)?;
    owned_by_association(tria, store, n)
}

/// Level numbering works as in the sequential case, but ownership per level
/// is not defined for shared meshes.
pub fn distribute_multilevel_dofs<const D: usize>(
    tria: &Triangulation<D>,
    store: &mut DofStore,
) -> Result<Vec<NumberCache>, DofError> {
    sequential::distribute_multilevel_dofs(tria, store)?;
    Err(DofError::NotImplemented(
        "level ownership for meshes shared by all ranks",
    ))
}

fn owned_by_association<const D: usize>(
    tria: &Triangulation<D>,
    store: &DofStore,
    n: DofIndex,
) -> Result<NumberCache, DofError> {
    let p = tria.partition();
    let assoc = subdomain_association(tria, store, n);
    let mut per_subdomain: Vec<Vec<DofIndex>> = vec![Vec::new(); p.n_subdomains as usize];
    for (i, &s) in assoc.iter().enumerate() {
        match per_subdomain.get_mut(s as usize) {
            Some(list) => list.push(i as DofIndex),
            None => {
                return Err(DofError::Precondition(format!(
                    "DoF {i} lies on no active cell"
                )));
            }
        }
    }
    let sets = per_subdomain
        .into_iter()
        .map(|list| {
            let mut set = IndexSet::new(n);
            set.add_indices(list);
            set
        })
        .collect();
    NumberCache::from_owned_sets(sets, p.my_subdomain as usize)
}

/// Accepts either a permutation of all DoFs (same on every rank) or one new
/// number per locally owned DoF. The form is agreed on collectively, so all
/// ranks take the same path or fail together.
pub fn renumber_dofs<const D: usize, C: Communicator>(
    ctx: &mut PolicyContext<'_, D, C>,
    current: &NumberCache,
    new_numbers: &[DofIndex],
) -> Result<NumberCache, DofError> {
    let n = current.n_global_dofs;
    let lengths = allgather_u64(ctx.comm, new_numbers.len() as u64);
    let global = if lengths.iter().all(|&l| l == n) {
        new_numbers.to_vec()
    } else if lengths
        .iter()
        .zip(&current.n_locally_owned_dofs_per_processor)
        .all(|(l, owned)| l == owned)
    {
        stitch_owned_parts(ctx.comm, current, new_numbers)?
    } else {
        return Err(DofError::Precondition(format!(
            "renumbering lengths {lengths:?} are neither {n} on every rank nor the owned counts {:?}",
            current.n_locally_owned_dofs_per_processor
        )));
    };
    check_permutation(&global)?;
    renumber::renumber_dofs(ctx.tria, ctx.store, &Permutation::full(&global), true)?;
    owned_by_association(ctx.tria, ctx.store, n)
}

/// Gather every rank's part and place entry `k` of rank `p` at the `k`-th
/// DoF that `p` owns.
fn stitch_owned_parts<C: Communicator>(
    comm: &C,
    current: &NumberCache,
    new_numbers: &[DofIndex],
) -> Result<Vec<DofIndex>, DofError> {
    let bytes: Vec<u8> = new_numbers.iter().flat_map(|v| v.to_le_bytes()).collect();
    let parts = allgather_varlen(comm, &bytes);
    let mut global = vec![INVALID_DOF; current.n_global_dofs as usize];
    for (p, (part, owned)) in parts
        .iter()
        .zip(&current.locally_owned_dofs_per_processor)
        .enumerate()
    {
        for (k, chunk) in part.chunks_exact(8).enumerate() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            let target = owned.nth_index_in_set(k as u64).ok_or_else(|| {
                DofError::InvalidPermutation(format!(
                    "rank {p} sent more entries than it owns DoFs"
                ))
            })?;
            global[target as usize] = u64::from_le_bytes(raw);
        }
    }
    Ok(global)
}
