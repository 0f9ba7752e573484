use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use golmesh_core::{World, assemble, compute_slice, plan_partitions, step};
use rand::{SeedableRng, rngs::SmallRng};
use std::time::Duration;

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");
    let size: usize = std::env::var("GOLMESH_BENCH_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(512);
    group.sample_size(30);
    group.measurement_time(Duration::from_secs(5));

    let mut rng = SmallRng::seed_from_u64(0xBEEF);
    let world = World::random(size, size, 0.3, &mut rng).expect("world");

    group.bench_function(format!("step_{size}"), |b| b.iter(|| step(&world)));

    for workers in [2_usize, 4, 8, 16] {
        let plan = plan_partitions(size, workers).expect("plan");
        group.bench_function(format!("partitioned_{size}_workers{workers}"), |b| {
            b.iter_batched(
                || plan.clone(),
                |plan| {
                    let slices = plan
                        .into_iter()
                        .map(|range| compute_slice(&world, range).expect("slice"))
                        .collect();
                    assemble(size, size, slices).expect("assemble")
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_generation);
criterion_main!(benches);
