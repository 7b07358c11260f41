//! Permutation helpers and DoF orderings that need no graph.
//!
//! A permutation is a `Vec<DofIndex>` where position `i` holds the new
//! number of the DoF currently numbered `i`.

use crate::data::dof_store::{DofStore, Layer};
use crate::data::{DofIndex, INVALID_DOF};
use crate::dof_error::DofError;
use crate::topology::ownership::SubdomainId;
use crate::topology::triangulation::Triangulation;

pub fn identity(n: DofIndex) -> Vec<DofIndex> {
    (0..n).collect()
}

/// Check that `p` is a bijection on `[0, p.len())`.
pub fn check_permutation(p: &[DofIndex]) -> Result<(), DofError> {
    let mut hit = vec![false; p.len()];
    for (i, &v) in p.iter().enumerate() {
        let Some(slot) = hit.get_mut(v as usize).filter(|_| v != INVALID_DOF) else {
            return Err(DofError::InvalidPermutation(format!(
                "position {i} maps to {v}, outside [0, {})",
                p.len()
            )));
        };
        if std::mem::replace(slot, true) {
            return Err(DofError::InvalidPermutation(format!(
                "value {v} appears more than once"
            )));
        }
    }
    Ok(())
}

pub fn is_permutation(p: &[DofIndex]) -> bool {
    check_permutation(p).is_ok()
}

/// `q` with `q[p[i]] = i`.
pub fn invert(p: &[DofIndex]) -> Result<Vec<DofIndex>, DofError> {
    check_permutation(p)?;
    let mut q = vec![0; p.len()];
    for (i, &v) in p.iter().enumerate() {
        q[v as usize] = i as DofIndex;
    }
    Ok(q)
}

/// Lowest true subdomain among the active cells touching each DoF.
///
/// Uses the partitioner's assignment, so artificial marking does not hide
/// any cell. DoFs on no active cell keep [`INVALID_SUBDOMAIN`](crate::topology::INVALID_SUBDOMAIN).
pub fn subdomain_association<const D: usize>(
    tria: &Triangulation<D>,
    store: &DofStore,
    n_dofs: DofIndex,
) -> Vec<SubdomainId> {
    let mut assoc = vec![crate::topology::INVALID_SUBDOMAIN; n_dofs as usize];
    let mut buf = Vec::new();
    for id in tria.active_cell_ids() {
        let s = tria.cell(id).true_subdomain_id();
        store.cell_indices(Layer::Active, tria, id, &mut buf);
        for &i in buf.iter().filter(|&&i| i != INVALID_DOF) {
            if let Some(a) = assoc.get_mut(i as usize) {
                *a = (*a).min(s);
            }
        }
    }
    assoc
}

/// Order DoFs by subdomain; within one subdomain the old order is kept.
pub fn subdomain_wise(association: &[SubdomainId], n_subdomains: u32) -> Vec<DofIndex> {
    let n_sub = n_subdomains as usize;
    // bucket n_sub collects DoFs without a subdomain, after all others
    let mut counts = vec![0 as DofIndex; n_sub + 1];
    let bucket = |s: SubdomainId| (s as usize).min(n_sub);
    for &s in association {
        counts[bucket(s)] += 1;
    }
    let mut next: Vec<DofIndex> = counts
        .iter()
        .scan(0, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect();
    association
        .iter()
        .map(|&s| {
            let slot = &mut next[bucket(s)];
            let v = *slot;
            *slot += 1;
            v
        })
        .collect()
}

/// Largest index distance between two DoFs that share an active cell.
pub fn bandwidth<const D: usize>(tria: &Triangulation<D>, store: &DofStore) -> DofIndex {
    let mut buf = Vec::new();
    let mut bw = 0;
    for id in tria.active_cell_ids().filter(|&id| !tria.is_artificial(id)) {
        store.cell_indices(Layer::Active, tria, id, &mut buf);
        let valid = buf.iter().copied().filter(|&i| i != INVALID_DOF);
        if let (Some(lo), Some(hi)) = (valid.clone().min(), valid.max()) {
            bw = bw.max(hi - lo);
        }
    }
    bw
}
