use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::MetricPair;
use crate::checkpoint::ModelCheckpoints;
use crate::descriptor::RunDescriptor;
use crate::error::{BackendError, CheckpointError, TrialError};
use crate::evaluation::{BandRecord, BestLayoutBands, BestRewardRecord, EvaluationLog};
use crate::placement::{
    mean_reward, AgentStep, EnvironmentParams, PlacementBackend, PlacementEnv, Policy,
};

/// Seed of every evaluation environment unless configured otherwise.
pub const DEFAULT_EVALUATION_SEED: u64 = 3142;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Episodes rolled out per evaluation call.
    pub episodes: usize,
    pub seed: u64,
    /// Track the per-band best layouts and write their artifacts.
    pub save_best_layouts: bool,
    /// Export the committed optimal board after each evaluation call.
    pub write_board_file: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        EvaluationSettings {
            episodes: 16,
            seed: DEFAULT_EVALUATION_SEED,
            save_best_layouts: true,
            write_board_file: false,
        }
    }
}

/// Outcome of one evaluation call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub timestep: u64,
    /// Total reward of each episode, in rollout order.
    pub episode_rewards: Vec<f64>,
    /// `None` when no episode was rolled out.
    pub mean_reward: Option<f64>,
    pub band_updates: Vec<BandRecord>,
    /// The mean beat every earlier call and `policy_best` was overwritten.
    pub new_best: bool,
}

fn artifact(path: PathBuf) -> impl FnOnce(BackendError) -> CheckpointError {
    move |source| CheckpointError::ArtifactWrite { path, source }
}

fn create_dir(path: &Path) -> Result<(), CheckpointError> {
    fs::create_dir_all(path).map_err(|e| CheckpointError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Periodically rolls out a policy snapshot on the evaluation board and
/// decides which models and layouts are kept as best.
///
/// Best-reward state lives here, one selector per run, so sequential runs in
/// one process never share it.
pub struct EvaluationSelector {
    backend: Arc<dyn PlacementBackend>,
    settings: EvaluationSettings,
    params: EnvironmentParams,
    eval_dir: PathBuf,
    snapshot_dir: PathBuf,
    board_dir: PathBuf,
    models: ModelCheckpoints,
    best_mean: BestRewardRecord,
    best_episode: BestRewardRecord,
}

impl EvaluationSelector {
    pub fn new(
        backend: Arc<dyn PlacementBackend>,
        descriptor: &RunDescriptor,
        expl_noise: f64,
    ) -> Result<Self, TrialError> {
        let eval_dir = descriptor.evaluation_dir();
        let snapshot_dir = eval_dir.join("snapshots");
        let board_dir = descriptor.board_dir();
        for dir in [&eval_dir, &snapshot_dir, &board_dir] {
            create_dir(dir)?;
        }

        let env = &descriptor.environment;
        let params = EnvironmentParams {
            board: descriptor.paths.evaluation_board.clone(),
            seed: descriptor.evaluation.seed,
            expl_noise,
            deterministic: true,
            max_steps: env.max_steps,
            w: env.w,
            hpwl: env.hpwl,
            o: env.o,
            shuffle_idxs: env.shuffle_evaluation_idxs,
            log_dir: eval_dir.clone(),
        };

        Ok(EvaluationSelector {
            backend,
            settings: descriptor.evaluation.clone(),
            params,
            models: ModelCheckpoints::new(&descriptor.model_dir(), descriptor.policy)?,
            eval_dir,
            snapshot_dir,
            board_dir,
            best_mean: BestRewardRecord::new(),
            best_episode: BestRewardRecord::new(),
        })
    }

    /// Best single evaluation-episode reward and its timestep.
    pub fn best_metrics(&self) -> Option<MetricPair> {
        self.best_episode.metric()
    }

    /// Best evaluation-batch mean reward and its timestep.
    pub fn best_mean_metrics(&self) -> Option<MetricPair> {
        self.best_mean.metric()
    }

    /// Roll out the configured number of episodes from `policy`. Band
    /// records span the whole call, not a single episode.
    pub fn evaluate(
        &mut self,
        policy: &dyn Policy,
        timestep: u64,
    ) -> Result<EvaluationReport, TrialError> {
        let episodes = self.settings.episodes;
        if episodes == 0 {
            debug!(timestep, "zero evaluation episodes, skipping evaluation");
            return Ok(EvaluationReport {
                timestep,
                episode_rewards: Vec::new(),
                mean_reward: None,
                band_updates: Vec::new(),
                new_best: false,
            });
        }

        let k = timestep / 1000;
        let last = episodes - 1;
        let mut env = self.backend.build_environment(&self.params)?;
        let mut log = EvaluationLog::create(
            &self.eval_dir.join("evaluation.log"),
            &self.params.entries(),
        )?;
        let mut bands = BestLayoutBands::new();
        let mut band_updates = Vec::new();
        let mut episode_rewards = Vec::with_capacity(episodes);

        for episode in 0..episodes {
            env.reset()?;
            let mut total = 0.0;
            let mut steps = 0u64;
            loop {
                steps += 1;
                let agents = env.step(policy, false)?;
                if agents.is_empty() {
                    return Err(BackendError::Message(format!(
                        "evaluation step {steps} of episode {episode} reported no agents"
                    ))
                    .into());
                }

                if self.settings.save_best_layouts {
                    let overlaps: Vec<f64> = agents.iter().map(AgentStep::overlap).collect();
                    let score = overlaps.iter().copied().fold(0.0, f64::max);
                    for record in bands.observe(env.calc_hpwl(), score) {
                        self.persist_band(env.as_mut(), &record, k, episode, last, steps)?;
                        log.band_improved(episode, last, steps, &record, &overlaps)?;
                        info!(
                            episode,
                            step = steps,
                            band = record.band.label,
                            hpwl = record.hpwl,
                            "new best layout"
                        );
                        band_updates.push(record);
                    }
                }

                total += mean_reward(&agents);
                if agents.iter().any(|a| a.done) {
                    break;
                }
            }

            log.episode_finished(episode, steps)?;
            debug!(episode, steps, reward = total, "evaluation episode finished");
            self.record_episode(env.as_mut(), episode)?;
            self.best_episode.offer(total, timestep);
            episode_rewards.push(total);
        }
        log.finish()?;

        let mean = episode_rewards.iter().sum::<f64>() / episodes as f64;
        self.models.save_periodic(policy, timestep, Some(mean))?;
        let new_best = self.best_mean.offer(mean, timestep);
        if new_best {
            info!(timestep, mean_reward = mean, "new best evaluation mean reward");
            self.models.save_best(policy, timestep, mean)?;
        }

        if self.settings.write_board_file {
            env.commit_optimal_positions();
            let filename = format!("{k}k.pcb");
            env.write_board(&self.board_dir, &filename)
                .map_err(artifact(self.board_dir.join(&filename)))?;
        }

        Ok(EvaluationReport {
            timestep,
            episode_rewards,
            mean_reward: Some(mean),
            band_updates,
            new_best,
        })
    }

    /// Board file tagged with band, episode and step, plus a snapshot pair.
    fn persist_band(
        &self,
        env: &mut dyn PlacementEnv,
        record: &BandRecord,
        k: u64,
        episode: usize,
        last: usize,
        step: u64,
    ) -> Result<(), CheckpointError> {
        let tag = format!("{episode}.{last}.{step}");

        let board_file = format!("{}_{k}k_{tag}.pcb", record.band.file_prefix);
        env.write_current_board(&self.board_dir, &board_file)
            .map_err(artifact(self.board_dir.join(&board_file)))?;

        let snapshot = self.snapshot_dir.join(format!("{tag}.png"));
        env.tracker()
            .capture_snapshot(&snapshot)
            .map_err(artifact(snapshot.clone()))?;

        let snapshot_board = format!("{tag}.pcb");
        env.write_current_board(&self.snapshot_dir, &snapshot_board)
            .map_err(artifact(self.snapshot_dir.join(&snapshot_board)))
    }

    fn record_episode(
        &self,
        env: &mut dyn PlacementEnv,
        episode: usize,
    ) -> Result<(), CheckpointError> {
        let board = env.board_representation();
        let video = self.eval_dir.join(format!("{episode}.mp4"));
        let run_log = format!("{episode}.log");

        let tracker = env.tracker();
        tracker.create_video(&video).map_err(artifact(video.clone()))?;
        tracker
            .log_run_to_file(&self.eval_dir, &run_log, &board)
            .map_err(artifact(self.eval_dir.join(&run_log)))?;
        tracker.reset();
        Ok(())
    }
}
