mod util;
use util::*;

use mesh_dofs::algs::renumbering::bandwidth;
use mesh_dofs::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

fn current_bandwidth<const D: usize, C: Communicator>(dh: &DofHandler<'_, D, C>) -> DofIndex {
    bandwidth(dh.triangulation(), dh.store().unwrap())
}

#[test]
fn cuthill_mckee_undoes_a_shuffle() {
    let tria = square(4);
    let mut dh = DofHandler::new(&tria);
    dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
        .unwrap();
    let n = dh.n_dofs();
    assert_eq!(n, 289);
    let mut shuffle: Vec<DofIndex> = (0..n).collect();
    shuffle.shuffle(&mut SmallRng::seed_from_u64(42));
    dh.renumber_dofs(&shuffle).unwrap();
    let shuffled = current_bandwidth(&dh);

    let perm = cuthill_mckee(&dh, false).unwrap();
    assert!(is_permutation(&perm));
    dh.renumber_dofs(&perm).unwrap();
    let ordered = current_bandwidth(&dh);
    // two neighbouring shells of at most 33 vertices each
    assert!(ordered <= 66, "bandwidth {ordered}");
    assert!(ordered < shuffled);
}

#[test]
fn reversal_keeps_the_bandwidth() {
    let tria = square(3);
    let fe = FiniteElement::lagrange(2, 2).unwrap();
    let mut dh = DofHandler::new(&tria);
    dh.distribute_dofs(&fe).unwrap();
    let forward = cuthill_mckee(&dh, false).unwrap();
    dh.renumber_dofs(&forward).unwrap();
    let bw_forward = current_bandwidth(&dh);

    dh.distribute_dofs(&fe).unwrap();
    let reversed = cuthill_mckee(&dh, true).unwrap();
    dh.renumber_dofs(&reversed).unwrap();
    assert_eq!(current_bandwidth(&dh), bw_forward);
}

#[test]
fn shared_ranks_compute_the_same_order() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        tria.partition_shared(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let perm = cuthill_mckee(&dh, true).unwrap();
        dh.renumber_dofs(&perm).unwrap();
        (perm, indices_by_address(&dh))
    });
    assert_eq!(results[0].0, results[1].0);
    assert_eq!(results[0].1, results[1].1);
}

#[test]
fn distributed_meshes_need_the_local_variant() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(2);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let global = cuthill_mckee(&dh, false).map(|_| ());
        let local = cuthill_mckee_locally_owned(&dh, false).unwrap();
        let owned = dh.locally_owned_dofs().clone();
        (global, local, owned)
    });
    for (global, local, owned) in results {
        assert!(matches!(global, Err(DofError::Precondition(_))));
        assert_eq!(local.len() as u64, owned.n_elements());
        let mut sorted = local.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, owned.iter().collect::<Vec<_>>());
    }
}

#[test]
fn needs_a_numbering() {
    let tria = square(1);
    let dh = DofHandler::new(&tria);
    assert_eq!(cuthill_mckee(&dh, false), Err(DofError::NotDistributed));
}
