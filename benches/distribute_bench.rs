use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use mesh_dofs::prelude::*;

fn square(n: usize) -> Triangulation<2> {
    let mut tria = Triangulation::hyper_cube();
    tria.refine_global(n).expect("refinement within the addressable depth");
    tria
}

fn bench_distribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("distribute");

    for &refinements in &[5usize, 7] {
        let tria = square(refinements);
        for degree in [1usize, 2] {
            let fe = FiniteElement::lagrange(2, degree).expect("valid element");
            group.bench_with_input(
                BenchmarkId::new(format!("q{degree}"), refinements),
                &refinements,
                |b, _| {
                    let mut dh = DofHandler::new(&tria);
                    b.iter(|| {
                        dh.distribute_dofs(&fe).expect("distribute");
                        black_box(dh.n_dofs());
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_cuthill_mckee(c: &mut Criterion) {
    let mut group = c.benchmark_group("cuthill_mckee");

    for &refinements in &[5usize, 6] {
        let tria = square(refinements);
        let mut dh = DofHandler::new(&tria);
        dh.distribute_dofs(&FiniteElement::lagrange(2, 1).expect("valid element"))
            .expect("distribute");

        group.bench_with_input(
            BenchmarkId::new("order", refinements),
            &refinements,
            |b, _| {
                b.iter(|| {
                    let perm = cuthill_mckee(&dh, true).expect("sequential numbering");
                    black_box(perm);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_distribute, bench_cuthill_mckee);
criterion_main!(benches);
