mod util;
use util::*;

use std::time::Duration;

use mesh_dofs::prelude::*;

#[test]
fn vertical_cut_on_two_ranks() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        assert_eq!(dh.policy(), DofPolicy::ParallelDistributed);
        (dh.number_cache().clone(), indices_by_address(&dh))
    });
    let caches: Vec<_> = results.iter().map(|(c, _)| c.clone()).collect();
    let maps: Vec<_> = results.into_iter().map(|(_, m)| m).collect();
    assert_eq!(caches[0].n_global_dofs, 81);
    assert_eq!(caches[1].n_global_dofs, 81);
    assert_eq!(caches[0].n_locally_owned_dofs_per_processor, vec![45, 36]);
    assert_eq!(caches[0].locally_owned_dofs.ranges(), &[0..45]);
    assert_eq!(caches[1].locally_owned_dofs.ranges(), &[45..81]);
    // owned columns plus the neighbouring ghost column
    assert_eq!(maps[0].len(), 40);
    assert_eq!(maps[1].len(), 40);
    assert_ranks_agree(&maps);
    assert_covers(&maps, 81);
}

#[test]
fn cut_vertices_belong_to_the_lower_rank() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        // vertex 1 of every owned cell in the column left of the cut lies on it
        let on_cut: Vec<DofIndex> = tria
            .active_cell_ids()
            .filter(|&id| tria.cell_center(id)[0] > 0.375 && tria.cell_center(id)[0] < 0.5)
            .map(|id| dh.cell_dof_indices(id).unwrap()[1])
            .collect();
        (on_cut, dh.locally_owned_dofs().clone())
    });
    let (on_cut, owned0) = &results[0];
    assert_eq!(on_cut.len(), 8);
    assert!(on_cut.iter().all(|&i| owned0.is_element(i)));
    assert!(on_cut.iter().all(|&i| !results[1].1.is_element(i)));
}

#[test]
fn z_order_partitions_agree() {
    for n_ranks in [3, 4] {
        let results = run_ranks(n_ranks, |comm| {
            let mut tria = square(3);
            let owners = tria.z_order_owners(n_ranks as u32);
            let rank = comm.rank() as u32;
            tria.partition_distributed(n_ranks as u32, rank, PartitionSettings::default(), |id, _| {
                owners[&id]
            })
            .unwrap();
            let mut dh = DofHandler::with_comm(&tria, comm);
            dh.distribute_dofs(&FiniteElement::lagrange(2, 2).unwrap())
                .unwrap();
            (dh.number_cache().clone(), indices_by_address(&dh))
        });
        let maps: Vec<_> = results.iter().map(|(_, m)| m.clone()).collect();
        for (c, _) in &results {
            assert_eq!(c.n_global_dofs, 289);
            c.validate_partition().unwrap();
            assert_eq!(c.n_locally_owned_dofs_per_processor.iter().sum::<u64>(), 289);
        }
        assert_ranks_agree(&maps);
        assert_covers(&maps, 289);
    }
}

#[test]
fn three_dimensional_split() {
    let results = run_ranks(2, |comm| {
        let mut tria = cube(2);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(3, 2).unwrap())
            .unwrap();
        (dh.number_cache().clone(), indices_by_address(&dh))
    });
    let maps: Vec<_> = results.iter().map(|(_, m)| m.clone()).collect();
    // Q2 on 4x4x4 cells: 9 planes of 81 points, the middle plane goes to rank 0
    assert_eq!(results[0].0.n_locally_owned_dofs_per_processor, vec![5 * 81, 4 * 81]);
    assert_ranks_agree(&maps);
    assert_covers(&maps, 729);
}

#[test]
fn locally_relevant_dofs_include_ghosts() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(3);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        dh.locally_relevant_dofs().unwrap()
    });
    // rank 0 sees one more vertex column through its ghosts; rank 1 sees the
    // cut line and the column left of it
    assert_eq!(results[0].n_elements(), 45 + 9);
    assert_eq!(results[1].n_elements(), 36 + 18);
}

#[test]
fn restricted_renumbering_keeps_ranks_consistent() {
    let results = run_ranks(3, |comm| {
        let mut tria = square(3);
        let owners = tria.z_order_owners(3);
        let rank = comm.rank() as u32;
        tria.partition_distributed(3, rank, PartitionSettings::default(), |id, _| owners[&id])
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 2).unwrap())
            .unwrap();
        let owned = dh.locally_owned_dofs().clone();
        let n = owned.n_elements();
        let reversed: Vec<DofIndex> = (0..n)
            .map(|k| owned.nth_index_in_set(n - 1 - k).unwrap())
            .collect();
        dh.renumber_dofs(&reversed).unwrap();
        let after_reverse = indices_by_address(&dh);
        let cm = cuthill_mckee_locally_owned(&dh, true).unwrap();
        dh.renumber_dofs(&cm).unwrap();
        (after_reverse, indices_by_address(&dh), dh.number_cache().clone())
    });
    let reversed: Vec<_> = results.iter().map(|r| r.0.clone()).collect();
    let reordered: Vec<_> = results.iter().map(|r| r.1.clone()).collect();
    assert_ranks_agree(&reversed);
    assert_ranks_agree(&reordered);
    assert_covers(&reordered, 289);
    for (_, _, c) in &results {
        c.validate_partition().unwrap();
    }
}

#[test]
fn duplicate_owned_indices_are_rejected() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(2);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let n = dh.n_locally_owned_dofs() as usize;
        dh.renumber_dofs(&vec![0; n])
    });
    for r in results {
        assert!(matches!(r, Err(DofError::InvalidPermutation(_))));
    }
}

/// Renumber a Q1 vertical cut, letting `spoil` damage one rank's part first.
fn renumber_with_one_bad_part(
    spoil: fn(&mut Vec<DofIndex>),
) -> Vec<(Result<(), DofError>, bool)> {
    let comms = ThreadComm::world_with_timeout(2, Duration::from_millis(200));
    run_on(comms, |comm| {
        let mut tria = square(2);
        let rank = comm.rank() as u32;
        tria.partition_distributed(2, rank, PartitionSettings::default(), vertical_cut)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
            .unwrap();
        let mut part: Vec<DofIndex> = dh.locally_owned_dofs().iter().collect();
        if rank == 0 {
            spoil(&mut part);
        }
        let r = dh.renumber_dofs(&part);
        (r, dh.has_dofs())
    })
}

#[test]
fn out_of_range_index_fails_on_every_rank() {
    let results = renumber_with_one_bad_part(|p| p[0] = INVALID_DOF);
    assert!(matches!(results[0].0, Err(DofError::InvalidPermutation(_))));
    assert!(matches!(results[1].0, Err(DofError::Precondition(_))));
    for (r, has_dofs) in &results {
        assert_eq!(r.as_ref().unwrap_err().class(), ErrorClass::Precondition);
        assert!(!has_dofs);
    }
}

#[test]
fn short_part_on_one_rank_fails_on_every_rank() {
    let results = renumber_with_one_bad_part(|p| {
        p.pop();
    });
    for (r, has_dofs) in &results {
        assert!(matches!(r, Err(DofError::Precondition(_))));
        assert!(!has_dofs);
    }
}

#[test]
fn wrong_communicator_size() {
    let results = run_ranks(2, |comm| {
        let mut tria = square(2);
        tria.partition_distributed(3, comm.rank() as u32, PartitionSettings::default(), |_, _| 0)
            .unwrap();
        let mut dh = DofHandler::with_comm(&tria, comm);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).unwrap())
    });
    for r in results {
        assert!(matches!(r, Err(DofError::CommunicatorMismatch { size: 2, n_subdomains: 3, .. })));
    }
}
