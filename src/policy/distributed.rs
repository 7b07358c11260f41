//! Numbering on a mesh where each rank only knows its own part.
//!
//! 1. number the locally owned cells from zero;
//! 2. give up every index on an entity that a lower-ranked ghost cell also
//!    touches, since that rank owns it;
//! 3. compact the remaining indices and shift them by the number of DoFs on
//!    lower ranks;
//! 4. fetch the indices that are still missing from their owners.

use super::{PolicyContext, compact};
use crate::algs::communicator::{Communicator, allgather_u64, allgather_varlen};
use crate::algs::enumerate;
use crate::algs::ghost_sync::{synchronize_ghosts, verify_complete};
use crate::algs::renumber::{self, Permutation};
use crate::algs::wire::{decode_index_set, encode_index_set};
use crate::data::dof_store::{DofStore, Layer};
use crate::data::index_set::IndexSet;
use crate::data::number_cache::NumberCache;
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::ownership::SubdomainId;
use crate::topology::triangulation::{CellId, Triangulation};

/// Revoke indices on cells of `layer` owned by a lower subdomain.
fn revoke_lower_owned<const D: usize>(
    tria: &Triangulation<D>,
    store: &DofStore,
    layer: Layer,
    cells: impl Iterator<Item = CellId>,
    renumbering: &mut [DofIndex],
) {
    let me = tria.locally_owned_subdomain();
    let mut buf = Vec::new();
    for id in cells {
        let (ghost, owner): (bool, SubdomainId) = match layer {
            Layer::Active => (tria.is_ghost(id), tria.cell(id).subdomain_id()),
            Layer::Level => (tria.is_level_ghost(id), tria.cell(id).level_subdomain_id()),
        };
        if !ghost || owner >= me {
            continue;
        }
        store.cell_indices(layer, tria, id, &mut buf);
        for &i in buf.iter().filter(|&&i| i != INVALID_DOF) {
            if let Some(r) = renumbering.get_mut(i as usize) {
                *r = INVALID_DOF;
            }
        }
    }
}

/// Compact `renumbering`, agree on counts and shift into this rank's block.
fn shift_into_block<C: Communicator>(
    comm: &C,
    me: SubdomainId,
    renumbering: &mut [DofIndex],
) -> Vec<DofIndex> {
    let n_owned = compact(renumbering);
    let counts = allgather_u64(comm, n_owned);
    let shift: DofIndex = counts.iter().take(me as usize).sum();
    for i in renumbering.iter_mut().filter(|i| **i != INVALID_DOF) {
        *i += shift;
    }
    counts
}

pub fn distribute_dofs<const D: usize, C: Communicator>(
    ctx: &mut PolicyContext<'_, D, C>,
) -> Result<NumberCache, DofError> {
    let tria = ctx.tria;
    let me = tria.locally_owned_subdomain();
    ctx.store.clear_active();
    let n_initial = enumerate::distribute_dofs(tria, ctx.store, 0, Some(me))?;

    let mut renumbering: Vec<DofIndex> = (0..n_initial).collect();
    revoke_lower_owned(tria, ctx.store, Layer::Active, tria.active_cell_ids(), &mut renumbering);
    let counts = shift_into_block(ctx.comm, me, &mut renumbering);
    renumber::renumber_dofs(tria, ctx.store, &Permutation::full(&renumbering), false)?;
    let cache = NumberCache::from_counts(&counts, me as usize);
    log::debug!(
        "subdomain {me}: {} of {n_initial} locally numbered DoFs kept, {} in total",
        cache.n_locally_owned_dofs,
        cache.n_global_dofs
    );

    synchronize_ghosts(tria, ctx.store, ctx.comm, Layer::Active, &ctx.sync)?;
    verify_complete(tria, ctx.store, Layer::Active)?;
    Ok(cache)
}

pub fn distribute_multilevel_dofs<const D: usize, C: Communicator>(
    ctx: &mut PolicyContext<'_, D, C>,
) -> Result<Vec<NumberCache>, DofError> {
    let tria = ctx.tria;
    if !tria.partition().settings.construct_multigrid_hierarchy {
        return Err(DofError::Precondition(
            "multilevel DoFs on a distributed mesh need a multigrid hierarchy".into(),
        ));
    }
    let me = tria.locally_owned_subdomain();
    ctx.store.init_multilevel(tria);
    let mut caches = Vec::with_capacity(tria.n_levels());
    for level in 0..tria.n_levels() {
        let n_initial = enumerate::distribute_dofs_on_level(tria, ctx.store, level, 0, Some(me))?;
        let mut renumbering: Vec<DofIndex> = (0..n_initial).collect();
        revoke_lower_owned(tria, ctx.store, Layer::Level, tria.cell_ids(level), &mut renumbering);
        let counts = shift_into_block(ctx.comm, me, &mut renumbering);
        renumber::renumber_level_dofs(
            tria,
            ctx.store,
            level,
            &Permutation::full(&renumbering),
            false,
        )?;
        caches.push(NumberCache::from_counts(&counts, me as usize));
    }
    synchronize_ghosts(tria, ctx.store, ctx.comm, Layer::Level, &ctx.sync)?;
    verify_complete(tria, ctx.store, Layer::Level)?;
    log::debug!("subdomain {me}: {} levels numbered", caches.len());
    Ok(caches)
}

/// Every rank learns whether any rank failed, so none is left waiting in a
/// later exchange that a failed rank never joins.
fn agree<T, C: Communicator>(
    comm: &C,
    local: Result<T, DofError>,
    peer_failed: impl FnOnce(usize) -> DofError,
) -> Result<T, DofError> {
    let verdicts = allgather_u64(comm, u64::from(local.is_ok()));
    let value = local?;
    match verdicts.iter().position(|&ok| ok == 0) {
        Some(p) => Err(peer_failed(p)),
        None => Ok(value),
    }
}

/// The new owned set, if `new_numbers` has one in-range, distinct entry per
/// locally owned DoF.
fn new_owned_set(current: &NumberCache, new_numbers: &[DofIndex]) -> Result<IndexSet, DofError> {
    if new_numbers.len() as u64 != current.n_locally_owned_dofs {
        return Err(DofError::Precondition(format!(
            "renumbering has {} entries for {} locally owned DoFs",
            new_numbers.len(),
            current.n_locally_owned_dofs
        )));
    }
    let n = current.n_global_dofs;
    if let Some(&bad) = new_numbers.iter().find(|&&i| i >= n) {
        return Err(DofError::InvalidPermutation(format!(
            "new index {bad} is outside [0, {n})"
        )));
    }
    let mut new_owned = IndexSet::new(n);
    new_owned.add_indices(new_numbers.iter().copied());
    if new_owned.n_elements() != new_numbers.len() as u64 {
        return Err(DofError::InvalidPermutation(
            "new locally owned indices contain duplicates".into(),
        ));
    }
    Ok(new_owned)
}

/// `new_numbers[k]` is the new index of the `k`-th locally owned DoF. The
/// union over all ranks must be a permutation of all DoFs.
///
/// Input is checked on every rank before anything is exchanged; if one rank
/// rejects its part, all ranks return an error before any index is touched.
pub fn renumber_dofs<const D: usize, C: Communicator>(
    ctx: &mut PolicyContext<'_, D, C>,
    current: &NumberCache,
    new_numbers: &[DofIndex],
) -> Result<NumberCache, DofError> {
    let tria = ctx.tria;
    let me = tria.locally_owned_subdomain();
    let new_owned = agree(ctx.comm, new_owned_set(current, new_numbers), |p| {
        DofError::Precondition(format!("subdomain {p} rejected its part of the renumbering"))
    })?;

    // forget everything not owned here; owners send the new values
    let old_owned = &current.locally_owned_dofs;
    let mut buf = Vec::new();
    for id in tria.active_cell_ids().filter(|&id| !tria.is_artificial(id)) {
        ctx.store.cell_indices(Layer::Active, tria, id, &mut buf);
        for i in buf.iter_mut().filter(|i| !old_owned.is_element(**i)) {
            *i = INVALID_DOF;
        }
        ctx.store.set_cell_indices(Layer::Active, tria, id, &buf);
    }
    if new_numbers.is_empty() {
        log::warn!("subdomain {me} owns no DoFs; only ghost indices are refreshed");
    } else {
        renumber::renumber_dofs(
            tria,
            ctx.store,
            &Permutation::restricted(new_numbers, old_owned),
            false,
        )?;
    }
    let synced = synchronize_ghosts(tria, ctx.store, ctx.comm, Layer::Active, &ctx.sync)
        .and_then(|()| verify_complete(tria, ctx.store, Layer::Active));
    agree(ctx.comm, synced, |p| DofError::CommError {
        neighbor: p,
        reason: "ghost exchange failed on that subdomain".into(),
    })?;

    let parts = allgather_varlen(ctx.comm, &encode_index_set(&new_owned));
    let sets = parts
        .iter()
        .enumerate()
        .map(|(p, bytes)| {
            decode_index_set(bytes).map_err(|reason| DofError::Wire { neighbor: p, reason })
        })
        .collect::<Result<Vec<_>, _>>()?;
    NumberCache::from_owned_sets(sets, me as usize)
}
