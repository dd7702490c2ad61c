use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::SmallRng};
use swarmsim_core::{Swarm, SwarmConfig};

fn bench_swarm_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("swarm_step");
    let agents_list: Vec<usize> = std::env::var("SWARMSIM_BENCH_AGENTS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![5_usize, 20, 50]);

    for &agents in &agents_list {
        group.bench_function(format!("agents{agents}_tick"), |b| {
            b.iter_batched(
                || {
                    let config = SwarmConfig {
                        rng_seed: Some(0xBEEF),
                        ..SwarmConfig::with_agents(agents)
                    };
                    let mut swarm = Swarm::with_config(config).expect("swarm");
                    let mut rng = SmallRng::seed_from_u64(7);
                    let snapshot = swarm.reset(&mut rng, None, None).expect("reset");
                    (swarm, snapshot.targets)
                },
                |(mut swarm, targets)| {
                    swarm.step(&targets.rows()).expect("step");
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_swarm_steps);
criterion_main!(benches);
