use maddpg::{
    config::{CriticVariant, Device, TrainingConfig},
    env::{EnvPool, MultiAgentEnv, SpreadEnv},
    metrics::NullSink,
    replay_buffer::{ReplayBuffer, Transition},
    rollout::RolloutLoop,
    target::TargetNetwork,
    trainer::{Maddpg, MaddpgBuilder},
    MaddpgError,
};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn small_config(model_root: &std::path::Path, n_rollout_threads: usize) -> TrainingConfig {
    TrainingConfig {
        model_root: model_root.to_path_buf(),
        n_rollout_threads,
        n_episodes: 4,
        episode_length: 10,
        steps_per_update: 5,
        batch_size: 8,
        buffer_length: 200,
        save_interval: 2,
        n_exploration_eps: 2,
        hidden_dim: 16,
        ..TrainingConfig::default()
    }
}

#[test]
fn test_end_to_end_two_agents() {
    let env = SpreadEnv::new(2, false);
    let descriptor = env.descriptor();
    let obs_dim = descriptor.agents[0].observation_dim;

    let mut buffer = ReplayBuffer::new(100, &descriptor.observation_dims(), &descriptor.action_dims()).unwrap();
    for step in 0..10 {
        let value = step as f32 * 0.1;
        let transition = Transition {
            observations: vec![Array2::from_elem((1, obs_dim), value); 2],
            actions: vec![Array2::from_elem((1, 2), value - 0.5); 2],
            rewards: vec![Array1::from_elem(1, -value); 2],
            next_observations: vec![Array2::from_elem((1, obs_dim), value + 0.1); 2],
            dones: vec![Array1::from_elem(1, false); 2],
        };
        buffer.push(&transition).unwrap();
    }
    assert_eq!(buffer.len(), 10);

    let mut rng = StdRng::seed_from_u64(3);
    let batch = buffer.sample(10, true, &mut rng).unwrap();
    assert_eq!(batch.len(), 10);
    assert!(matches!(
        buffer.sample(11, true, &mut rng),
        Err(MaddpgError::InsufficientSamples { requested: 11, available: 10 })
    ));

    let mut maddpg = MaddpgBuilder::new(descriptor)
        .hidden_dim(16)
        .tau(1.0)
        .build()
        .unwrap();
    maddpg.prep_training(Device::Cpu);
    let stats = maddpg.update(&batch, 0, &mut NullSink).unwrap();
    assert!(stats.critic_loss.is_finite());
    maddpg.update_all_targets().unwrap();
    maddpg.prep_rollouts(Device::Cpu);

    let inputs = Array2::from_elem((3, obs_dim), 0.2);
    let agent = &maddpg.agents()[0];
    assert_eq!(
        agent.policy_action(inputs.view()).unwrap(),
        agent.target_action(inputs.view()).unwrap()
    );
    assert_eq!(
        agent.target_critic.parameters(),
        TargetNetwork::from_network(&agent.critic).parameters()
    );
}

#[test]
fn test_rollout_loop_writes_run_directory() {
    let root = tempdir().unwrap();
    let config = small_config(root.path(), 2);
    let pool = EnvPool::new(vec![SpreadEnv::new(2, false), SpreadEnv::new(2, false)], config.seed).unwrap();
    let mut rollout = RolloutLoop::new(config, pool).unwrap();
    let summary = rollout.run().unwrap();

    assert!(!summary.stopped_early);
    assert_eq!(summary.episodes_completed, 4);
    assert_eq!(summary.total_steps, 40);
    assert!(summary.updates > 0);
    assert_eq!(summary.final_mean_rewards.len(), 2);
    assert_eq!(rollout.buffer().len(), 40);

    let run = summary.run_dir;
    assert!(run.ends_with("spread/maddpg/run1"));
    assert!(run.join("config.json").exists());
    assert!(run.join("model.bin").exists());
    assert!(run.join("incremental/model_ep1.bin").exists());
    assert!(run.join("incremental/model_ep3.bin").exists());
    assert!(run.join("logs/scalars.csv").exists());
    assert!(run.join("logs/summary.json").exists());

    let restored = Maddpg::load(run.join("model.bin")).unwrap();
    assert_eq!(restored.niter(), summary.updates);
    assert_eq!(restored.descriptor(), rollout.trainer().descriptor());

    let saved = TrainingConfig::from_json_file(run.join("config.json")).unwrap();
    assert_eq!(saved.batch_size, 8);
}

#[test]
fn test_second_run_gets_next_number() {
    let root = tempdir().unwrap();
    for expected in 1..=2 {
        let config = small_config(root.path(), 1);
        let pool = EnvPool::new(vec![SpreadEnv::new(2, true)], config.seed).unwrap();
        let rollout = RolloutLoop::new(config, pool).unwrap();
        assert_eq!(rollout.run_dir().run_number(), expected);
    }
}

#[test]
fn test_stop_handle_ends_run_early() {
    let root = tempdir().unwrap();
    let config = small_config(root.path(), 1);
    let pool = EnvPool::new(vec![SpreadEnv::new(2, false)], config.seed).unwrap();
    let mut rollout = RolloutLoop::new(config, pool).unwrap();
    rollout.stop_handle().request_stop();
    let summary = rollout.run().unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.episodes_completed, 0);
    assert_eq!(summary.total_steps, 0);
    assert!(summary.run_dir.join("model.bin").exists());
}

#[test]
fn test_sharing_rollout_pushes_rotations() {
    let root = tempdir().unwrap();
    let config = TrainingConfig {
        parameter_sharing: true,
        discrete_action: true,
        agent_alg: CriticVariant::Ddpg,
        n_episodes: 1,
        ..small_config(root.path(), 1)
    };
    let pool = EnvPool::new(vec![SpreadEnv::new(3, true)], config.seed).unwrap();
    let mut rollout = RolloutLoop::new(config, pool).unwrap();
    rollout.run().unwrap();
    // one original plus two rotations per step
    assert_eq!(rollout.buffer().len(), 30);
}

#[test]
fn test_pool_size_must_match_config() {
    let root = tempdir().unwrap();
    let config = small_config(root.path(), 2);
    let pool = EnvPool::new(vec![SpreadEnv::new(2, false)], config.seed).unwrap();
    assert!(matches!(RolloutLoop::new(config, pool), Err(MaddpgError::Config(_))));
}

#[test]
fn test_resume_rejects_foreign_trainer() {
    let root = tempdir().unwrap();
    let config = small_config(root.path(), 1);
    let pool = EnvPool::new(vec![SpreadEnv::new(2, false)], config.seed).unwrap();
    let rollout = RolloutLoop::new(config, pool).unwrap();
    let other = Maddpg::init_from_env(
        &SpreadEnv::new(3, false).descriptor(),
        CriticVariant::Maddpg,
        CriticVariant::Maddpg,
        0.01,
        0.01,
        16,
    )
    .unwrap();
    assert!(matches!(rollout.with_trainer(other), Err(MaddpgError::Config(_))));
}
