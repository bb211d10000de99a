use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ferrous_poa::core::compute::host::HostBatchFactory;
use ferrous_poa::core::compute::ScoringParams;
use ferrous_poa::core::types::Group;
use ferrous_poa::pipelines::batched::{
    CapacityPlanner, CollectingSink, PlanOptions, RunCoordinator, RunOptions,
};

/// Windows with lengths spread across every size bin, like long-read data
fn generate_windows(n: usize, seed: u64) -> Vec<Group> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let len = rng.gen_range(50..5000);
            let depth = rng.gen_range(2..12);
            let seqs: Vec<Vec<u8>> = (0..depth)
                .map(|_| (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect())
                .collect();
            Group::from_strs(&seqs)
        })
        .collect()
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("capacity_planning");
    let options = PlanOptions::default();

    for n_windows in [100usize, 1_000, 10_000] {
        let windows = generate_windows(n_windows, 42);
        group.throughput(Throughput::Elements(n_windows as u64));
        group.bench_with_input(
            BenchmarkId::new("BinnedEstimator", n_windows),
            &windows,
            |b, w| b.iter(|| CapacityPlanner::new().plan(black_box(w), &options)),
        );
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_dispatch");
    let windows = generate_windows(200, 7);
    let options = PlanOptions {
        memory_budget: 64 << 20,
        ..PlanOptions::default()
    };
    let plan = match CapacityPlanner::new().plan(&windows, &options) {
        Ok(plan) => plan,
        Err(e) => panic!("planning failed: {}", e),
    };
    let factory = HostBatchFactory::new(1 << 30);

    group.throughput(Throughput::Elements(windows.len() as u64));
    group.bench_function("host_sequential", |b| {
        b.iter(|| {
            let coordinator =
                RunCoordinator::new(&factory, ScoringParams::default(), RunOptions::default());
            let mut sink = CollectingSink::new();
            coordinator.run(black_box(&windows), &plan, &mut sink)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_planning, bench_dispatch);
criterion_main!(benches);
