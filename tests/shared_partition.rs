mod util;
use util::*;

use mesh_dofs::prelude::*;

#[test]
fn vertical_cut_gives_contiguous_blocks() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        tria.partition_shared(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        assert_eq!(dh.policy(), DofPolicy::ParallelShared);
        (dh.number_cache().clone(), indices_by_address(&dh))
    });
    let (c0, m0) = &results[0];
    let (c1, m1) = &results[1];
    assert_eq!(c0.n_global_dofs, 81);
    // the cut line goes to the lower rank
    assert_eq!(c0.n_locally_owned_dofs_per_processor, vec![45, 36]);
    assert_eq!(c0.locally_owned_dofs.ranges(), &[0..45]);
    assert_eq!(c1.locally_owned_dofs.ranges(), &[45..81]);
    assert_eq!(c0.locally_owned_dofs_per_processor, c1.locally_owned_dofs_per_processor);
    // every rank holds the whole, identical numbering
    assert_eq!(m0, m1);
    assert_eq!(m0.len(), 64);
}

#[test]
fn artificial_cells_keep_their_numbers() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        let settings = PartitionSettings {
            with_artificial_cells: true,
            ..Default::default()
        };
        tria.partition_shared(2, rank, settings, vertical_cut).unwrap();
        let n_artificial = tria
            .active_cell_ids()
            .filter(|&id| tria.is_artificial(id))
            .count();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 2).unwrap())
            .unwrap();
        (n_artificial, dh.number_cache().clone())
    });
    // the three columns away from the cut are artificial on the other rank
    assert_eq!(results[0].0, 24);
    assert_eq!(results[1].0, 24);
    assert_eq!(results[0].1.n_global_dofs, 289);
    assert_eq!(
        results[0].1.locally_owned_dofs_per_processor,
        results[1].1.locally_owned_dofs_per_processor
    );
}

#[test]
fn locally_owned_renumbering_is_stitched() {
    let results = run_ranks(3, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        let owners = tria.z_order_owners(3);
        tria.partition_shared(3, rank, PartitionSettings::default(), |id, _| owners[&id])
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let before = indices_by_address(&dh);
        // reverse the owned block in place
        let owned = dh.locally_owned_dofs().clone();
        let n = owned.n_elements();
        let new: Vec<DofIndex> = (0..n)
            .map(|k| owned.nth_index_in_set(n - 1 - k).unwrap())
            .collect();
        dh.renumber_dofs(&new).unwrap();
        let after = indices_by_address(&dh);
        (owned, before, after, dh.locally_owned_dofs().clone())
    });
    for (owned, before, after, owned_after) in &results {
        assert_eq!(owned, owned_after);
        let lo = owned.nth_index_in_set(0).unwrap();
        let hi = owned.nth_index_in_set(owned.n_elements() - 1).unwrap();
        for (key, old) in before {
            for (&o, &a) in old.iter().zip(&after[key]) {
                if owned.is_element(o) {
                    assert_eq!(a, lo + hi - o);
                }
            }
        }
    }
    assert_eq!(results[0].2, results[1].2);
    assert_eq!(results[1].2, results[2].2);
}

#[test]
fn global_renumbering_on_every_rank() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(2);
        let rank = comm.rank() as u32;
        tria.partition_shared(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let reversed: Vec<DofIndex> = (0..dh.n_dofs()).rev().collect();
        dh.renumber_dofs(&reversed).unwrap();
        dh.number_cache().clone()
    });
    // ownership follows the DoFs, so rank 0 now holds the upper block
    let c = &results[0];
    assert_eq!(c.n_global_dofs, 25);
    assert_eq!(c.n_locally_owned_dofs_per_processor, vec![15, 10]);
    assert_eq!(c.locally_owned_dofs.ranges(), &[10..25]);
    assert_eq!(results[1].locally_owned_dofs.ranges(), &[0..10]);
}

#[test]
fn multilevel_is_not_implemented() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(2);
        let rank = comm.rank() as u32;
        tria.partition_shared(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let err = dh.distribute_multilevel_dofs().unwrap_err();
        (err.is_not_implemented(), dh.has_dofs())
    });
    assert!(results.iter().all(|&(ni, has)| ni && !has));
}

#[test]
fn mismatched_communicator_is_a_precondition_error() {
    let mut tria = square(1);
    tria.partition_shared(2, 1, PartitionSettings::default(), vertical_cut)
        .unwrap();
    let mut dh = DofHandler::new(&tria);
    let err = dh
        .distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
        .unwrap_err();
    assert!(matches!(err, DofError::CommunicatorMismatch { .. }));
    assert_eq!(err.class(), ErrorClass::Precondition);
}
