#![allow(dead_code)]
use std::collections::BTreeMap;

use mesh_dofs::prelude::*;
use mesh_dofs::topology::{Cell, TreeCell};

/// Unit square refined `n` times.
pub fn square(n: usize) -> Triangulation<2> {
    let mut tria = Triangulation::hyper_cube();
    tria.refine_global(n).unwrap();
    tria
}

/// Unit cube refined `n` times.
pub fn cube(n: usize) -> Triangulation<3> {
    let mut tria = Triangulation::hyper_cube();
    tria.refine_global(n).unwrap();
    tria
}

/// Owner by a vertical cut at x = 1/2 of a single-tree mesh.
pub fn vertical_cut<const D: usize>(_: CellId, c: &Cell<D>) -> u32 {
    let q = c.quadrant();
    (q.level > 0 && q.coords[0] >= 1 << (q.level - 1)) as u32
}

/// Run `f` on `n` ranks, one thread each, and collect the results in rank order.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    run_on(ThreadComm::world(n), f)
}

/// Like [`run_ranks`], on an existing set of communicators.
pub fn run_on<T, F>(comms: Vec<ThreadComm>, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Indices of every non-artificial active cell, keyed by forest address.
pub fn indices_by_address<const D: usize, C: Communicator>(
    dh: &DofHandler<'_, D, C>,
) -> BTreeMap<(u32, TreeCell<D>), Vec<DofIndex>> {
    let tria = dh.triangulation();
    tria.active_cell_ids()
        .filter(|&id| !tria.is_artificial(id))
        .map(|id| {
            let c = tria.cell(id);
            ((c.tree(), *c.quadrant()), dh.cell_dof_indices(id).unwrap())
        })
        .collect()
}

/// Every cell seen by two ranks carries the same indices on both.
pub fn assert_ranks_agree<const D: usize>(
    per_rank: &[BTreeMap<(u32, TreeCell<D>), Vec<DofIndex>>],
) {
    for (a, ma) in per_rank.iter().enumerate() {
        for (b, mb) in per_rank.iter().enumerate().skip(a + 1) {
            for (key, ia) in ma {
                if let Some(ib) = mb.get(key) {
                    assert_eq!(ia, ib, "ranks {a} and {b} disagree on cell {key:?}");
                }
            }
        }
    }
}

/// Every cell of the mesh is seen by at least one rank, and together the
/// ranks use each index in `[0, n)`.
pub fn assert_covers<const D: usize>(
    per_rank: &[BTreeMap<(u32, TreeCell<D>), Vec<DofIndex>>],
    n: DofIndex,
) {
    let mut used = vec![false; n as usize];
    for m in per_rank {
        for indices in m.values() {
            for &i in indices {
                assert!(i < n, "index {i} out of range {n}");
                used[i as usize] = true;
            }
        }
    }
    assert!(used.iter().all(|&u| u), "some index is used by no cell");
}

/// `got` holds exactly the values `0..n`.
pub fn assert_permutation(got: &[DofIndex], n: DofIndex) {
    let mut a = got.to_vec();
    a.sort_unstable();
    assert_eq!(a, (0..n).collect::<Vec<_>>(), "not a permutation of 0..{n}");
}
