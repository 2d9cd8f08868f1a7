//! Immutable per-run configuration handed from the parent to a worker.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::evaluation::EvaluationSettings;
use crate::placement::EnvironmentSettings;

/// Actor-critic algorithm trained by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "TD3")]
    Td3,
    #[serde(rename = "SAC")]
    Sac,
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Td3 => "TD3",
            PolicyKind::Sac => "SAC",
        }
    }

    /// File extension used for saved models of this kind.
    pub fn model_extension(&self) -> &'static str {
        match self {
            PolicyKind::Td3 => "td3",
            PolicyKind::Sac => "sac",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute device requested for a run. Selected per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cuda => f.write_str("cuda"),
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// How the replay buffer grows while learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayBufferGrowth {
    Double,
    Triple,
    Quadruple,
}

impl ReplayBufferGrowth {
    pub fn factor(&self) -> usize {
        match self {
            ReplayBufferGrowth::Double => 2,
            ReplayBufferGrowth::Triple => 3,
            ReplayBufferGrowth::Quadruple => 4,
        }
    }
}

/// Input files and the root under which each run gets its own log directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunPaths {
    pub training_board: Option<PathBuf>,
    pub evaluation_board: Option<PathBuf>,
    pub hyperparameters: Option<PathBuf>,
    pub output_root: PathBuf,
}

impl Default for RunPaths {
    fn default() -> Self {
        RunPaths {
            training_board: None,
            evaluation_board: None,
            hyperparameters: None,
            output_root: PathBuf::from("./tensorboard"),
        }
    }
}

/// Timestep budgets of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    pub max_timesteps: u64,
    /// Timesteps driven by a random policy before learning starts.
    pub start_timesteps: u64,
    pub target_exploration_steps: u64,
    pub evaluate_every: u64,
    /// Timesteps without mean-reward improvement before stopping.
    /// `None` means the run is never stopped early.
    pub early_stopping: Option<u64>,
}

impl Default for Budgets {
    fn default() -> Self {
        Budgets {
            max_timesteps: 1_000_000,
            start_timesteps: 25_000,
            target_exploration_steps: 10_000,
            evaluate_every: 250_000,
            early_stopping: None,
        }
    }
}

impl Budgets {
    pub fn early_stopping_patience(&self) -> u64 {
        self.early_stopping.unwrap_or(self.max_timesteps)
    }
}

/// Everything one worker needs to execute one trial.
///
/// Built in the parent before dispatch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_index: usize,
    pub run_name: String,
    pub experiment: Option<String>,
    pub seed: u32,
    pub policy: PolicyKind,
    pub paths: RunPaths,
    pub budgets: Budgets,
    pub environment: EnvironmentSettings,
    pub evaluation: EvaluationSettings,
    pub device: Device,
    pub verbosity: u8,
    pub replay_growth: Option<ReplayBufferGrowth>,
}

impl RunDescriptor {
    /// `<output_root>/<run_name>_<run_index>_<policy>`; unique per run in a batch.
    pub fn log_dir(&self) -> PathBuf {
        self.paths.output_root.join(format!(
            "{}_{}_{}",
            self.run_name, self.run_index, self.policy
        ))
    }

    pub fn desc_log_path(&self) -> PathBuf {
        self.log_dir().join(format!("{}_desc.log", self.run_name))
    }

    /// Evaluation logs, videos and snapshots.
    pub fn evaluation_dir(&self) -> PathBuf {
        self.log_dir().join("evaluation")
    }

    /// Best-layout and exported board files.
    pub fn board_dir(&self) -> PathBuf {
        self.log_dir().join("boards")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.log_dir().join("models")
    }

    /// Flat `key -> value` view of the run settings for the description log.
    pub fn settings_entries(&self) -> Vec<(String, String)> {
        fn path_or_none(p: &Option<PathBuf>) -> String {
            p.as_deref()
                .map(Path::display)
                .map(|d| d.to_string())
                .unwrap_or_else(|| "None".to_string())
        }

        let b = &self.budgets;
        let e = &self.environment;
        let v = &self.evaluation;
        vec![
            ("run".into(), self.run_index.to_string()),
            ("run_name".into(), self.run_name.clone()),
            (
                "experiment".into(),
                self.experiment.clone().unwrap_or_else(|| "None".into()),
            ),
            ("seed".into(), self.seed.to_string()),
            ("policy".into(), self.policy.to_string()),
            ("device".into(), self.device.to_string()),
            ("verbose".into(), self.verbosity.to_string()),
            (
                "incremental_replay_buffer".into(),
                self.replay_growth
                    .map(|g| format!("{g:?}").to_lowercase())
                    .unwrap_or_else(|| "None".into()),
            ),
            ("training_pcb".into(), path_or_none(&self.paths.training_board)),
            (
                "evaluation_pcb".into(),
                path_or_none(&self.paths.evaluation_board),
            ),
            (
                "hyperparameters".into(),
                path_or_none(&self.paths.hyperparameters),
            ),
            (
                "tensorboard_dir".into(),
                self.paths.output_root.display().to_string(),
            ),
            ("log_dir".into(), self.log_dir().display().to_string()),
            ("max_timesteps".into(), b.max_timesteps.to_string()),
            ("start_timesteps".into(), b.start_timesteps.to_string()),
            (
                "target_exploration_steps".into(),
                b.target_exploration_steps.to_string(),
            ),
            ("evaluate_every".into(), b.evaluate_every.to_string()),
            (
                "early_stopping".into(),
                b.early_stopping_patience().to_string(),
            ),
            ("w".into(), e.w.to_string()),
            ("hpwl".into(), e.hpwl.to_string()),
            ("o".into(), e.o.to_string()),
            ("max_steps".into(), e.max_steps.to_string()),
            (
                "shuffle_training_idxs".into(),
                e.shuffle_training_idxs.to_string(),
            ),
            (
                "shuffle_evaluation_idxs".into(),
                e.shuffle_evaluation_idxs.to_string(),
            ),
            ("eval_episodes".into(), v.episodes.to_string()),
            ("eval_seed".into(), v.seed.to_string()),
        ]
    }
}
