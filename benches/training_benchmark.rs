//! Throughput of the pieces that run on every training step: joint replay
//! push/sample, one agent update and one parallel environment step.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use maddpg::config::Device;
use maddpg::env::{EnvPool, MultiAgentEnv, SpreadEnv};
use maddpg::metrics::NullSink;
use maddpg::replay_buffer::{ReplayBuffer, Transition};
use maddpg::trainer::MaddpgBuilder;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_AGENTS: usize = 3;

fn random_transition(obs_dim: usize, rng: &mut StdRng) -> Transition {
    let mut block = |cols: usize| Array2::from_shape_fn((1, cols), |_| rng.gen_range(-1.0..1.0));
    Transition {
        observations: (0..N_AGENTS).map(|_| block(obs_dim)).collect(),
        actions: (0..N_AGENTS).map(|_| block(2)).collect(),
        rewards: (0..N_AGENTS).map(|_| Array1::from_elem(1, -1.0)).collect(),
        next_observations: (0..N_AGENTS).map(|_| block(obs_dim)).collect(),
        dones: (0..N_AGENTS).map(|_| Array1::from_elem(1, false)).collect(),
    }
}

fn filled_buffer(obs_dim: usize, entries: usize) -> ReplayBuffer {
    let mut rng = StdRng::seed_from_u64(0);
    let mut buffer = ReplayBuffer::new(entries, &[obs_dim; N_AGENTS], &[2; N_AGENTS]).unwrap();
    for _ in 0..entries {
        buffer.push(&random_transition(obs_dim, &mut rng)).unwrap();
    }
    buffer
}

fn bench_replay_buffer(c: &mut Criterion) {
    let obs_dim = SpreadEnv::new(N_AGENTS, false).descriptor().agents[0].observation_dim;
    let mut buffer = filled_buffer(obs_dim, 10_000);
    let mut rng = StdRng::seed_from_u64(1);
    let transition = random_transition(obs_dim, &mut rng);

    c.bench_function("replay_push", |b| b.iter(|| buffer.push(black_box(&transition)).unwrap()));
    c.bench_function("replay_sample_1024", |b| {
        b.iter(|| black_box(buffer.sample(1024, true, &mut rng).unwrap()))
    });
}

fn bench_update(c: &mut Criterion) {
    let descriptor = SpreadEnv::new(N_AGENTS, false).descriptor();
    let obs_dim = descriptor.agents[0].observation_dim;
    let buffer = filled_buffer(obs_dim, 4096);
    let mut rng = StdRng::seed_from_u64(2);
    let batch = buffer.sample(1024, true, &mut rng).unwrap();
    let mut maddpg = MaddpgBuilder::new(descriptor).build().unwrap();
    maddpg.prep_training(Device::Cpu);

    c.bench_function("maddpg_update_agent0_1024", |b| {
        b.iter(|| black_box(maddpg.update(&batch, 0, &mut NullSink).unwrap()))
    });
}

fn bench_env_pool(c: &mut Criterion) {
    let envs = (0..8).map(|_| SpreadEnv::new(N_AGENTS, false)).collect();
    let mut pool = EnvPool::new(envs, 1).unwrap();
    pool.reset().unwrap();
    c.bench_function("env_pool_step_8_workers", |b| {
        b.iter_batched(
            || vec![Array2::zeros((8, 2)); N_AGENTS],
            |actions| black_box(pool.step(&actions).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_replay_buffer, bench_update, bench_env_pool);
criterion_main!(benches);
