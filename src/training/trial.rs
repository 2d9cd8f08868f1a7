use std::fs;
use std::sync::Arc;

use tracing::{info, info_span};

use crate::aggregate::TrialResult;
use crate::descriptor::RunDescriptor;
use crate::error::{CheckpointError, TrialError};
use crate::evaluation::EvaluationSelector;
use crate::placement::{EnvironmentParams, LearnSchedule, LearnerSetup, PlacementBackend};
use crate::seeding::{RunSeeds, Subsystem};
use crate::training::desc_log::write_desc_log;
use crate::training::monitor::TrainingMonitor;
use crate::training::Hyperparameters;

/// Executes one complete trial for a run descriptor.
pub trait TrialRunner: Send + Sync {
    fn run(&self, descriptor: &RunDescriptor) -> Result<TrialResult, TrialError>;
}

/// Builds the run's collaborators from a backend and drives
/// exploration, learning and periodic evaluation to completion.
pub struct TrialExecutor {
    backend: Arc<dyn PlacementBackend>,
}

impl TrialExecutor {
    pub fn new(backend: Arc<dyn PlacementBackend>) -> Self {
        TrialExecutor { backend }
    }
}

impl TrialRunner for TrialExecutor {
    fn run(&self, descriptor: &RunDescriptor) -> Result<TrialResult, TrialError> {
        let span = info_span!("trial", run = descriptor.run_index, seed = descriptor.seed);
        let _enter = span.enter();

        let seeds = RunSeeds::new(descriptor.seed);
        let log_dir = descriptor.log_dir();
        fs::create_dir_all(&log_dir).map_err(|e| CheckpointError::CreateDir {
            path: log_dir.clone(),
            source: e,
        })?;

        let hp = Hyperparameters::load_or_default(descriptor.paths.hyperparameters.as_deref())?;

        let env_settings = &descriptor.environment;
        let env_params = EnvironmentParams {
            board: descriptor.paths.training_board.clone(),
            seed: seeds.derive(Subsystem::Environment),
            expl_noise: hp.expl_noise,
            deterministic: false,
            max_steps: env_settings.max_steps,
            w: env_settings.w,
            hpwl: env_settings.hpwl,
            o: env_settings.o,
            shuffle_idxs: env_settings.shuffle_training_idxs,
            log_dir: log_dir.clone(),
        };
        let mut env = self.backend.build_environment(&env_params)?;
        env.reset()?;

        let setup = LearnerSetup {
            kind: descriptor.policy,
            hyperparameters: hp.clone(),
            device: descriptor.device,
            early_stopping: descriptor.budgets.early_stopping_patience(),
            seed: seeds.derive(Subsystem::Learner),
            deterministic: true,
        };
        let mut learner = self.backend.build_learner(setup, env)?;

        let selector = EvaluationSelector::new(self.backend.clone(), descriptor, hp.expl_noise)?;
        let mut monitor = TrainingMonitor::new(selector, descriptor)?;

        write_desc_log(
            &descriptor.desc_log_path(),
            descriptor,
            &hp,
            &learner.architecture(),
            &self.backend.build_info(),
        )?;

        let budgets = &descriptor.budgets;
        info!(
            policy = %descriptor.policy,
            max_timesteps = budgets.max_timesteps,
            log_dir = %log_dir.display(),
            "starting trial"
        );

        learner.explore_for_expert_targets(budgets.target_exploration_steps)?;
        let schedule = LearnSchedule {
            max_timesteps: budgets.max_timesteps,
            start_timesteps: budgets.start_timesteps,
            replay_growth: descriptor.replay_growth,
        };
        learner.learn(&schedule, &mut monitor)?;

        monitor.finish()
    }
}
